use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use echosight::config::{load_config, AppConfig};
use echosight::engine::state::ResolutionRequest;
use echosight::errors::{EchoSightError, EchoSightResult};
use echosight::perception::types::Frame;
use echosight::speech::output::run_output_loop;
use echosight::speech::TtsSink;

/// Stand-in TTS collaborator: prints the narration a real synthesizer
/// would speak. Completion of the print is "playback finished".
struct ConsoleTts;

#[async_trait::async_trait]
impl TtsSink for ConsoleTts {
    async fn speak(&self, text: &str) -> EchoSightResult<()> {
        println!("\n[speaks] {text}");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config; running with local analysis only");
            AppConfig::default()
        }
    };
    let images_dir = config.speech.images_dir.clone();

    let (engine, queue) = match echosight::build_engine(&config) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "engine construction failed");
            std::process::exit(1);
        }
    };

    let output = tokio::spawn(run_output_loop(queue.clone(), Arc::new(ConsoleTts)));

    println!("EchoSight interactive shell (type 'exit' to quit)");
    println!("Usage:");
    println!("  - Load a screen: image:filename.png");
    println!("  - Then speak commands: what's on screen / list options / click <name>");
    println!("  - Type 'clear' to drop the cached analyses");
    println!("{}", "-".repeat(70));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current_frame: Option<Frame> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }
        match input.to_lowercase().as_str() {
            "exit" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "clear" => {
                engine.invalidate_cache();
                println!("\n[Analysis cache cleared]");
                continue;
            }
            _ => {}
        }

        // `image:<name> <utterance>` loads a screenshot before resolving,
        // the way a hotkey press captures one.
        let utterance = match split_image_directive(&input) {
            Some((filename, rest)) => {
                match load_frame(&images_dir, &filename) {
                    Ok(frame) => {
                        println!("[Loaded screen: {filename}]");
                        current_frame = Some(frame);
                    }
                    Err(e) => {
                        println!("[Error: could not load '{filename}': {e}]");
                        println!("[Tip: place screenshots in the '{images_dir}' folder]");
                        continue;
                    }
                }
                rest
            }
            None => input,
        };
        if utterance.is_empty() {
            continue;
        }

        let frame = current_frame.clone().unwrap_or_else(Frame::empty);
        let request = ResolutionRequest::new(frame, utterance);
        // Requests run concurrently; ordering of what the user hears is the
        // response queue's job, not the spawn order's.
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.resolve(request).await;
        });
    }

    queue.close();
    let _ = output.await;
}

/// Splits `image:<filename> <rest>` into the filename and the remaining
/// utterance.
fn split_image_directive(input: &str) -> Option<(String, String)> {
    let rest = input.strip_prefix("image:")?.trim_start();
    match rest.split_once(char::is_whitespace) {
        Some((filename, utterance)) => {
            Some((filename.to_string(), utterance.trim().to_string()))
        }
        None => Some((rest.to_string(), String::new())),
    }
}

/// Finds a screenshot by name: exact match in the images folder first,
/// common extensions appended next, then the name taken as a full path.
fn find_image(images_dir: &str, filename: &str) -> Option<PathBuf> {
    let dir = Path::new(images_dir);
    let candidate = dir.join(filename);
    if candidate.exists() {
        return Some(candidate);
    }
    if Path::new(filename).extension().is_none() {
        for ext in ["png", "jpg", "jpeg", "bmp", "webp"] {
            let candidate = dir.join(format!("{filename}.{ext}"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    let direct = PathBuf::from(filename);
    direct.exists().then_some(direct)
}

fn load_frame(images_dir: &str, filename: &str) -> EchoSightResult<Frame> {
    let path = find_image(images_dir, filename).ok_or_else(|| {
        EchoSightError::Perception(format!("image '{filename}' not found"))
    })?;
    let decoded = image::open(&path)
        .map_err(|e| EchoSightError::Perception(format!("decode failed: {e}")))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Ok(Frame::new(decoded.into_raw(), width, height))
}
