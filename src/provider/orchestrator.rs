use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::perception::fingerprint::fingerprint;
use crate::perception::types::{Frame, ScreenAnalysis};
use crate::provider::limiter::RateGate;
use crate::provider::{RawAnalysis, VisionBackend};

const BACKOFF_FACTOR: u32 = 2;
const BACKOFF_JITTER: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
        }
    }
}

struct ChainLink {
    backend: Arc<dyn VisionBackend>,
    gate: RateGate,
}

/// Runs the backend fallback chain with per-call timeout, bounded retry,
/// and per-backend rate limiting.
///
/// Stateless with respect to caching: the caller owns cache population so
/// the retry logic here stays independently testable.
pub struct ProviderOrchestrator {
    chain: Vec<ChainLink>,
    config: OrchestratorConfig,
}

impl ProviderOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            chain: Vec::new(),
            config,
        }
    }

    pub fn push_backend(&mut self, backend: Arc<dyn VisionBackend>, gate: RateGate) {
        self.chain.push(ChainLink { backend, gate });
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.chain.iter().map(|l| l.backend.name()).collect()
    }

    /// Tries each backend in order until one produces an analysis.
    /// Exhausting the whole chain surfaces `Unavailable`.
    pub async fn analyze(
        &self,
        frame: &Frame,
        hint: Option<&str>,
    ) -> Result<ScreenAnalysis, ProviderError> {
        let mut last_error: Option<ProviderError> = None;

        for link in &self.chain {
            match self.call_backend(link, frame, hint).await {
                Ok(raw) => return Ok(assemble(frame, raw)),
                Err(e) => {
                    tracing::warn!(
                        backend = %e.backend,
                        kind = %e.kind,
                        error = %e.message,
                        "backend failed, falling through"
                    );
                    last_error = Some(e);
                }
            }
        }

        let detail = last_error
            .map(|e| format!("last failure: {e}"))
            .unwrap_or_else(|| "no backends configured".to_string());
        Err(ProviderError::new(
            ProviderErrorKind::Unavailable,
            "fallback_chain",
            format!("all backends exhausted; {detail}"),
        ))
    }

    /// One backend with the retry policy applied: at most `max_retries`
    /// extra attempts, exponential backoff with jitter, and retry only on
    /// transient kinds.
    async fn call_backend(
        &self,
        link: &ChainLink,
        frame: &Frame,
        hint: Option<&str>,
    ) -> Result<RawAnalysis, ProviderError> {
        let name = link.backend.name();
        let mut attempt: u32 = 0;

        loop {
            if let Err(kind) = link.gate.admit().await {
                return Err(ProviderError::new(
                    kind,
                    name,
                    "rate limit admission queue is full",
                ));
            }

            let outcome =
                tokio::time::timeout(self.config.timeout, link.backend.analyze(frame, hint)).await;

            let error = match outcome {
                Ok(Ok(raw)) => {
                    tracing::debug!(backend = name, attempt, "backend call succeeded");
                    return Ok(raw);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::new(
                    ProviderErrorKind::Timeout,
                    name,
                    format!("no response within {:?}", self.config.timeout),
                ),
            };

            if !error.kind.is_retryable() || attempt >= self.config.max_retries {
                return Err(error);
            }

            let delay = self.backoff_delay(attempt);
            tracing::debug!(
                backend = name,
                attempt,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "transient backend failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.backoff_base.as_millis() as f64
            * f64::from(BACKOFF_FACTOR.pow(attempt));
        let jitter = rand::thread_rng().gen_range(1.0 - BACKOFF_JITTER..=1.0 + BACKOFF_JITTER);
        Duration::from_millis((base_ms * jitter) as u64)
    }
}

/// Stamps identity onto a raw backend result and enforces the bounds
/// invariant: elements outside the frame are detector noise and are
/// dropped rather than handed to the ranker.
fn assemble(frame: &Frame, raw: RawAnalysis) -> ScreenAnalysis {
    let mut ui_elements = raw.ui_elements;
    let before = ui_elements.len();
    ui_elements.retain(|e| e.bounds.fits_within(frame.width, frame.height));
    if ui_elements.len() < before {
        tracing::warn!(
            dropped = before - ui_elements.len(),
            "dropped elements with out-of-frame bounds"
        );
    }

    ScreenAnalysis {
        fingerprint: fingerprint(frame),
        description: raw.description,
        ui_elements,
        game_state: raw.game_state,
        confidence: raw.confidence,
        captured_at: chrono::Utc::now(),
        frame_width: frame.width,
        frame_height: frame.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use crate::perception::types::{Bounds, ElementKind, UIElement};

    /// Scripted backend: fails with the given kinds in order, then
    /// succeeds forever.
    struct ScriptedBackend {
        name: String,
        failures: Vec<ProviderErrorKind>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(name: &str, failures: Vec<ProviderErrorKind>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                failures,
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VisionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn analyze(
            &self,
            _frame: &Frame,
            _hint: Option<&str>,
        ) -> Result<RawAnalysis, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(n) {
                Some(kind) => Err(ProviderError::new(*kind, &self.name, "scripted failure")),
                None => Ok(RawAnalysis {
                    description: format!("analysis from {}", self.name),
                    ui_elements: vec![UIElement {
                        kind: ElementKind::Button,
                        bounds: Bounds { x: 10, y: 10, width: 50, height: 20 },
                        label: Some("Start Game".into()),
                        is_interactive: true,
                        detection_confidence: 0.9,
                    }],
                    game_state: None,
                    confidence: 0.9,
                }),
            }
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 64 * 64 * 4], 64, 64)
    }

    fn orchestrator_with(backends: Vec<Arc<dyn VisionBackend>>) -> ProviderOrchestrator {
        let mut orch = ProviderOrchestrator::new(OrchestratorConfig::default());
        for b in backends {
            orch.push_backend(b, RateGate::new(600, 8));
        }
        orch
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_twice_then_success_observes_two_backoff_delays() {
        let backend = ScriptedBackend::new(
            "primary",
            vec![ProviderErrorKind::Timeout, ProviderErrorKind::Timeout],
        );
        let orch = orchestrator_with(vec![backend.clone()]);

        let started = tokio::time::Instant::now();
        let analysis = orch.analyze(&frame(), None).await.expect("third attempt succeeds");
        let elapsed = started.elapsed();

        assert_eq!(backend.call_count(), 3);
        assert_eq!(analysis.description, "analysis from primary");
        // Two delays: 250ms and 500ms, each jittered by +-20%.
        assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(900), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_never_retried_and_falls_through() {
        let primary = ScriptedBackend::new("primary", vec![ProviderErrorKind::Unauthorized]);
        let secondary = ScriptedBackend::new("secondary", vec![]);
        let orch = orchestrator_with(vec![primary.clone(), secondary.clone()]);

        let analysis = orch.analyze(&frame(), None).await.expect("secondary succeeds");

        assert_eq!(primary.call_count(), 1, "bad credentials must not be retried");
        assert_eq!(secondary.call_count(), 1);
        assert_eq!(analysis.description, "analysis from secondary");
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_response_is_never_retried() {
        let primary = ScriptedBackend::new("primary", vec![ProviderErrorKind::MalformedResponse]);
        let secondary = ScriptedBackend::new("secondary", vec![]);
        let orch = orchestrator_with(vec![primary.clone(), secondary]);

        orch.analyze(&frame(), None).await.expect("secondary succeeds");
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_chain_surfaces_unavailable() {
        let a = ScriptedBackend::new("a", vec![ProviderErrorKind::Timeout; 3]);
        let b = ScriptedBackend::new("b", vec![ProviderErrorKind::Timeout; 3]);
        let orch = orchestrator_with(vec![a.clone(), b.clone()]);

        let err = orch.analyze(&frame(), None).await.expect_err("everything is down");
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
        // 1 initial + 2 retries on each backend.
        assert_eq!(a.call_count(), 3);
        assert_eq!(b.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_frame_elements_are_dropped_on_assembly() {
        struct NoisyBackend;

        #[async_trait]
        impl VisionBackend for NoisyBackend {
            fn name(&self) -> &str {
                "noisy"
            }
            async fn analyze(
                &self,
                _frame: &Frame,
                _hint: Option<&str>,
            ) -> Result<RawAnalysis, ProviderError> {
                Ok(RawAnalysis {
                    description: "noisy".into(),
                    ui_elements: vec![
                        UIElement {
                            kind: ElementKind::Button,
                            bounds: Bounds { x: 0, y: 0, width: 32, height: 32 },
                            label: Some("ok".into()),
                            is_interactive: true,
                            detection_confidence: 0.9,
                        },
                        UIElement {
                            kind: ElementKind::Button,
                            bounds: Bounds { x: 60, y: 60, width: 32, height: 32 },
                            label: Some("overflows".into()),
                            is_interactive: true,
                            detection_confidence: 0.9,
                        },
                    ],
                    game_state: None,
                    confidence: 0.9,
                })
            }
        }

        let orch = orchestrator_with(vec![Arc::new(NoisyBackend)]);
        let analysis = orch.analyze(&frame(), None).await.expect("backend succeeds");
        assert_eq!(analysis.ui_elements.len(), 1);
        assert_eq!(analysis.ui_elements[0].label.as_deref(), Some("ok"));
    }
}
