use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{EchoSightError, EchoSightResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            cache: CacheConfig::default(),
            ranker: RankerConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Backend ids tried in order until one succeeds. The local heuristic
    /// analyzer is always appended as the last resort and needs no entry.
    #[serde(default)]
    pub fallback_order: Vec<String>,
    #[serde(default)]
    pub backends: HashMap<String, BackendEntry>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            fallback_order: Vec::new(),
            backends: HashMap::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEntry {
    pub display_name: String,
    pub api_base: String,
    pub model: String,
    /// Optional API key stored in config.toml (falls back to env var
    /// ECHOSIGHT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_calls_per_minute")]
    pub max_calls_per_minute: u32,
    /// Calls allowed to wait for a rate-limit token before new calls fail
    /// fast with RateLimited.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Minimum lead over the runner-up before a single candidate wins
    /// outright. Anything closer is ambiguous and goes back to the user.
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f32,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            ambiguity_margin: default_ambiguity_margin(),
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_tts_rate")]
    pub tts_rate: u32,
    #[serde(default = "default_tts_volume")]
    pub tts_volume: f32,
    /// Directory the interactive shell searches for `image:<name>` frames.
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_rate: default_tts_rate(),
            tts_volume: default_tts_volume(),
            images_dir: default_images_dir(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    8
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_calls_per_minute() -> u32 {
    20
}

fn default_queue_depth() -> usize {
    4
}

fn default_cache_capacity() -> usize {
    64
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_ambiguity_margin() -> f32 {
    0.25
}

fn default_fuzzy_threshold() -> f64 {
    0.75
}

fn default_tts_rate() -> u32 {
    200
}

fn default_tts_volume() -> f32 {
    0.9
}

fn default_images_dir() -> String {
    "images".to_string()
}

fn resolve_config_path() -> EchoSightResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(EchoSightError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> EchoSightResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        backends = config.providers.fallback_order.len(),
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> EchoSightResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.providers.timeout_secs, 8);
        assert_eq!(cfg.providers.max_retries, 2);
        assert_eq!(cfg.providers.backoff_base_ms, 250);
        assert_eq!(cfg.cache.capacity, 64);
        assert!((cfg.ranker.ambiguity_margin - 0.25).abs() < f32::EPSILON);
        assert!((cfg.ranker.fuzzy_threshold - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_minimal_provider_table() {
        let toml_src = r#"
            [providers]
            fallback_order = ["primary"]

            [providers.backends.primary]
            display_name = "Primary Vision"
            api_base = "https://api.example.com/v1/chat/completions"
            model = "vision-large"
        "#;
        let cfg: AppConfig = toml::from_str(toml_src).expect("config should parse");
        let entry = &cfg.providers.backends["primary"];
        assert_eq!(entry.max_calls_per_minute, 20);
        assert_eq!(entry.queue_depth, 4);
        assert_eq!(cfg.providers.fallback_order, vec!["primary"]);
    }
}
