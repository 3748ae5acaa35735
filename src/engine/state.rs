use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ProviderErrorKind, ResolutionError};
use crate::perception::types::{Frame, UIElement};

/// Phases of one resolution request. Purely observational: transitions are
/// traced so a stuck request can be localized from logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    Capturing,
    Analyzing,
    Parsing,
    Ranking,
    Deciding,
    Responding,
    Done,
    Errored,
}

/// Why a resolution ended with an error action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    Resolution { kind: ResolutionError },
    Provider { kind: ProviderErrorKind },
}

/// The UI decision the engine hands to whoever drives input. The engine
/// decides; it never executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionAction {
    None,
    Click { element: UIElement },
    TypeText { text: String },
    Navigate { element: UIElement },
    Error { cause: FailureCause },
}

/// Output of one end-to-end resolution. Handed to the response queue and
/// discarded after delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub action: ResolutionAction,
    pub spoken_text: String,
    pub confidence: f32,
    pub used_cache: bool,
}

/// One hotkey activation: the captured frame plus the transcribed
/// utterance.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub request_id: Uuid,
    pub frame: Frame,
    pub utterance: String,
}

impl ResolutionRequest {
    pub fn new(frame: Frame, utterance: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            frame,
            utterance: utterance.into(),
        }
    }
}
