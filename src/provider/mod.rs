pub mod heuristic;
pub mod limiter;
pub mod openai_compatible;
pub mod orchestrator;

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::perception::types::{Frame, UIElement};

/// What a backend actually produces. The orchestrator turns this into a
/// full `ScreenAnalysis` by stamping the fingerprint, timestamp, and frame
/// dimensions, and by enforcing the bounds invariant.
#[derive(Debug, Clone)]
pub struct RawAnalysis {
    pub description: String,
    pub ui_elements: Vec<UIElement>,
    pub game_state: Option<String>,
    pub confidence: f32,
}

/// Uniform boundary for AI screen-analysis backends. The orchestrator is
/// agnostic to what sits behind it: an HTTP vision API, an SDK, or the
/// local heuristic analyzer.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Identifier used in config, logs, and error attribution.
    fn name(&self) -> &str;

    async fn analyze(&self, frame: &Frame, hint: Option<&str>)
        -> Result<RawAnalysis, ProviderError>;
}
