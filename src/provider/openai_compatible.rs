use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::perception::types::{Bounds, ElementKind, Frame, UIElement};
use crate::provider::{RawAnalysis, VisionBackend};

/// System prompt for the vision model. Narration is read aloud to a blind
/// player mid-game, so brevity is part of the contract.
const SYSTEM_PROMPT: &str = "\
You are the vision analyzer of a screen reader for blind gamers. \
Given a game screenshot, respond with a single JSON object and nothing else:
{
  \"description\": \"one or two short sentences describing the screen\",
  \"game_state\": \"optional short tag like main_menu or in_combat\",
  \"confidence\": 0.0-1.0,
  \"elements\": [
    {\"kind\": \"button|menu|text|input|other\",
     \"label\": \"visible text if any\",
     \"x\": 0, \"y\": 0, \"width\": 0, \"height\": 0,
     \"interactive\": true, \"confidence\": 0.0-1.0}
  ]
}
Coordinates are pixels in the screenshot. Keep the description extremely short.";

/// Vision backend speaking the OpenAI-compatible chat completions protocol.
pub struct OpenAiCompatibleBackend {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    fence: regex::Regex,
}

impl OpenAiCompatibleBackend {
    pub fn new(id: String, api_base: String, api_key: String, model: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            model,
            client: reqwest::Client::new(),
            // Models wrap JSON in markdown fences despite instructions.
            fence: regex::Regex::new(r"```(?:json)?\s*([\s\S]*?)```")
                .expect("static fence pattern is valid"),
        }
    }

    fn encode_frame(&self, frame: &Frame) -> Result<String, ProviderError> {
        let Some(buffer) =
            image::RgbaImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        else {
            return Err(ProviderError::new(
                ProviderErrorKind::MalformedResponse,
                &self.id,
                "frame buffer does not match its stated dimensions",
            ));
        };
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(buffer)
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| {
                ProviderError::new(
                    ProviderErrorKind::MalformedResponse,
                    &self.id,
                    format!("png encode failed: {e}"),
                )
            })?;
        Ok(base64::engine::general_purpose::STANDARD.encode(png.into_inner()))
    }

    fn extract_json<'a>(&self, content: &'a str) -> &'a str {
        if let Some(caps) = self.fence.captures(content) {
            if let Some(m) = caps.get(1) {
                return m.as_str().trim();
            }
        }
        content.trim()
    }
}

#[async_trait]
impl VisionBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.id
    }

    async fn analyze(
        &self,
        frame: &Frame,
        hint: Option<&str>,
    ) -> Result<RawAnalysis, ProviderError> {
        let image_b64 = self.encode_frame(frame)?;

        let user_text = match hint {
            Some(h) if !h.is_empty() => format!("Analyze this game screen. Context: {h}"),
            _ => "Analyze this game screen.".to_string(),
        };

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": [
                    { "type": "text", "text": user_text },
                    { "type": "image_url", "image_url": {
                        "url": format!("data:image/png;base64,{image_b64}"),
                        "detail": "high",
                    }},
                ]},
            ],
        });

        tracing::debug!(
            backend = %self.id,
            model = %self.model,
            image_bytes = image_b64.len(),
            "sending vision request"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    ProviderErrorKind::Timeout
                } else {
                    ProviderErrorKind::Unavailable
                };
                ProviderError::new(kind, &self.id, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let kind = match status.as_u16() {
                401 | 403 => ProviderErrorKind::Unauthorized,
                408 => ProviderErrorKind::Timeout,
                429 => ProviderErrorKind::RateLimited,
                _ => ProviderErrorKind::Unavailable,
            };
            let err_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                kind,
                &self.id,
                format!("{status}: {err_body}"),
            ));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::new(ProviderErrorKind::MalformedResponse, &self.id, e.to_string())
        })?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::new(
                    ProviderErrorKind::MalformedResponse,
                    &self.id,
                    "response carries no message content",
                )
            })?;

        parse_model_reply(&self.id, self.extract_json(content))
    }
}

#[derive(Debug, Deserialize)]
struct WireAnalysis {
    #[serde(default)]
    description: String,
    #[serde(default)]
    game_state: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    elements: Vec<WireElement>,
}

#[derive(Debug, Deserialize)]
struct WireElement {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    x: u32,
    #[serde(default)]
    y: u32,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    interactive: bool,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

/// Models occasionally invent kinds outside the contract; anything
/// unrecognized degrades to `Other` rather than failing the reply.
fn kind_from_wire(kind: &str) -> ElementKind {
    match kind {
        "button" => ElementKind::Button,
        "menu" => ElementKind::Menu,
        "text" => ElementKind::Text,
        "input" => ElementKind::Input,
        _ => ElementKind::Other,
    }
}

/// Parses the model's JSON reply into a `RawAnalysis`. A reply that is not
/// the agreed contract is `MalformedResponse` and is never retried.
fn parse_model_reply(backend: &str, content: &str) -> Result<RawAnalysis, ProviderError> {
    let wire: WireAnalysis = serde_json::from_str(content).map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::MalformedResponse,
            backend,
            format!("reply is not the agreed JSON contract: {e}"),
        )
    })?;

    let ui_elements = wire
        .elements
        .into_iter()
        .map(|e| UIElement {
            kind: kind_from_wire(&e.kind),
            bounds: Bounds {
                x: e.x,
                y: e.y,
                width: e.width,
                height: e.height,
            },
            label: e.label.filter(|l| !l.trim().is_empty()),
            is_interactive: e.interactive,
            detection_confidence: e.confidence.clamp(0.0, 1.0),
        })
        .collect();

    Ok(RawAnalysis {
        description: wire.description,
        ui_elements,
        game_state: wire.game_state,
        confidence: wire.confidence.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{
        "description": "Main menu with two buttons.",
        "game_state": "main_menu",
        "confidence": 0.92,
        "elements": [
            {"kind": "button", "label": "Start Game",
             "x": 100, "y": 300, "width": 200, "height": 48,
             "interactive": true, "confidence": 0.9},
            {"kind": "text", "label": "v1.0.3",
             "x": 10, "y": 1050, "width": 80, "height": 20,
             "interactive": false}
        ]
    }"#;

    #[test]
    fn parses_contract_reply() {
        let raw = parse_model_reply("primary", REPLY).expect("reply should parse");
        assert_eq!(raw.description, "Main menu with two buttons.");
        assert_eq!(raw.game_state.as_deref(), Some("main_menu"));
        assert_eq!(raw.ui_elements.len(), 2);
        assert!(raw.ui_elements[0].is_interactive);
        assert_eq!(raw.ui_elements[0].label.as_deref(), Some("Start Game"));
    }

    #[test]
    fn unknown_kind_maps_to_other() {
        let reply = r#"{"description": "x", "elements": [
            {"kind": "hologram", "x": 0, "y": 0, "width": 10, "height": 10}
        ]}"#;
        let raw = parse_model_reply("primary", reply).expect("reply should parse");
        assert_eq!(raw.ui_elements[0].kind, ElementKind::Other);
    }

    #[test]
    fn non_contract_reply_is_malformed() {
        let err = parse_model_reply("primary", "Sure! The screen shows a menu.")
            .expect_err("prose is not the contract");
        assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let backend = OpenAiCompatibleBackend::new(
            "p".into(),
            "http://localhost".into(),
            String::new(),
            "m".into(),
        );
        let fenced = format!("```json\n{REPLY}\n```");
        let inner = backend.extract_json(&fenced);
        assert!(parse_model_reply("p", inner).is_ok());
    }
}
