use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::engine::history::{HistoryEntry, SessionHistory};
use crate::engine::state::{
    FailureCause, ResolutionAction, ResolutionPhase, ResolutionRequest, ResolutionResult,
};
use crate::errors::{ProviderError, ResolutionError};
use crate::intent::{Intent, IntentParser, IntentVerb};
use crate::perception::cache::AnalysisCache;
use crate::perception::fingerprint::fingerprint;
use crate::perception::types::{ElementKind, ScreenAnalysis, UIElement};
use crate::provider::orchestrator::ProviderOrchestrator;
use crate::ranking::ranker::sort_reading_order;
use crate::ranking::{CandidateRanker, RankedOutcome};
use crate::speech::queue::{QueuedResponse, ResponsePriority, ResponseQueue};

/// The end-to-end pipeline: frame + utterance in, exactly one queued
/// spoken response (and a UI action decision) out.
///
/// Engines are cheap to share: every request walks the phases
/// independently, and the cache, orchestrator, and queue are the only
/// shared state. A new request never cancels an in-flight provider call;
/// staleness is handled by queue preemption instead, so a paid API call is
/// never wasted.
pub struct ResolutionEngine {
    cache: Arc<AnalysisCache>,
    orchestrator: Arc<ProviderOrchestrator>,
    parser: IntentParser,
    ranker: CandidateRanker,
    queue: Arc<ResponseQueue>,
    cache_ttl: Duration,
    /// Shared by every request of this engine session; scopes queue
    /// preemption.
    lineage: Uuid,
    history: Mutex<SessionHistory>,
}

impl ResolutionEngine {
    pub fn new(
        cache: Arc<AnalysisCache>,
        orchestrator: Arc<ProviderOrchestrator>,
        queue: Arc<ResponseQueue>,
        ranker: CandidateRanker,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            orchestrator,
            parser: IntentParser::new(),
            ranker,
            queue,
            cache_ttl,
            lineage: Uuid::new_v4(),
            history: Mutex::new(SessionHistory::new()),
        }
    }

    pub fn lineage(&self) -> Uuid {
        self.lineage
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub async fn resolve(&self, request: ResolutionRequest) -> ResolutionResult {
        let request_id = request.request_id;
        self.transition(request_id, ResolutionPhase::Capturing, ResolutionPhase::Analyzing);

        // ── Analyzing: cache first, orchestrator on miss ─────────────────
        let key = fingerprint(&request.frame);
        let (analysis, used_cache) = match self.cache.get(&key) {
            Some(hit) => {
                tracing::debug!(request_id = %request_id, key = %key.as_str(), "analysis cache hit");
                (hit, true)
            }
            None => {
                match self.orchestrator.analyze(&request.frame, None).await {
                    Ok(fresh) => {
                        let fresh = Arc::new(fresh);
                        // A provider failure above left the cache untouched;
                        // only a real analysis is admitted.
                        self.cache.put(key.clone(), fresh.clone(), self.cache_ttl);
                        (fresh, false)
                    }
                    Err(e) => {
                        self.transition(request_id, ResolutionPhase::Analyzing, ResolutionPhase::Errored);
                        return self.errored(&request, e);
                    }
                }
            }
        };

        // ── Parsing ──────────────────────────────────────────────────────
        self.transition(request_id, ResolutionPhase::Analyzing, ResolutionPhase::Parsing);
        let intent = self.parser.parse(&request.utterance);
        tracing::info!(
            request_id = %request_id,
            verb = ?intent.verb,
            target = %intent.target_phrase,
            "utterance parsed"
        );

        // ── Ranking + Deciding ───────────────────────────────────────────
        self.transition(request_id, ResolutionPhase::Parsing, ResolutionPhase::Ranking);
        let (action, spoken_text, confidence, priority, supersedes) =
            self.decide(&intent, &analysis);
        self.transition(request_id, ResolutionPhase::Ranking, ResolutionPhase::Deciding);

        // ── Responding: exactly one queued response per terminal ─────────
        self.transition(request_id, ResolutionPhase::Deciding, ResolutionPhase::Responding);
        let result = ResolutionResult {
            action,
            spoken_text,
            confidence,
            used_cache,
        };
        self.respond(&request, &intent, &result, priority, supersedes);
        self.transition(request_id, ResolutionPhase::Responding, ResolutionPhase::Done);
        result
    }

    fn decide(
        &self,
        intent: &Intent,
        analysis: &ScreenAnalysis,
    ) -> (ResolutionAction, String, f32, ResponsePriority, bool) {
        match intent.verb {
            IntentVerb::Describe => {
                // Fresh narration supersedes anything stale still waiting
                // to be spoken for an older screen.
                (
                    ResolutionAction::None,
                    describe_text(analysis),
                    analysis.confidence,
                    ResponsePriority::Urgent,
                    true,
                )
            }
            IntentVerb::List => (
                ResolutionAction::None,
                list_text(analysis),
                analysis.confidence,
                ResponsePriority::Informational,
                false,
            ),
            IntentVerb::Unknown => (
                ResolutionAction::Error {
                    cause: FailureCause::Resolution {
                        kind: ResolutionError::InvalidIntent,
                    },
                },
                "I didn't catch a command. Try saying describe, list options, \
                 or click followed by a button name."
                    .to_string(),
                0.0,
                ResponsePriority::Normal,
                false,
            ),
            IntentVerb::Select | IntentVerb::Press | IntentVerb::Type | IntentVerb::Scroll => {
                match self.ranker.rank(intent, analysis) {
                    RankedOutcome::Unique(element) => self.decide_unique(intent, analysis, element),
                    RankedOutcome::Ambiguous(options) => {
                        let spoken = ambiguous_text(&options);
                        (
                            ResolutionAction::None,
                            spoken,
                            analysis.confidence,
                            ResponsePriority::Normal,
                            false,
                        )
                    }
                    RankedOutcome::NoMatch => (
                        ResolutionAction::Error {
                            cause: FailureCause::Resolution {
                                kind: ResolutionError::NoMatch,
                            },
                        },
                        format!(
                            "I couldn't find {} on this screen. \
                             Try saying list options to hear what's available.",
                            quoted_or_anything(&intent.target_phrase),
                        ),
                        0.0,
                        ResponsePriority::Normal,
                        false,
                    ),
                }
            }
        }
    }

    fn decide_unique(
        &self,
        intent: &Intent,
        analysis: &ScreenAnalysis,
        element: UIElement,
    ) -> (ResolutionAction, String, f32, ResponsePriority, bool) {
        let name = element_name(&element);
        let confidence = (element.detection_confidence * analysis.confidence).clamp(0.0, 1.0);
        let (action, spoken) = match intent.verb {
            IntentVerb::Type => (
                ResolutionAction::TypeText {
                    text: intent.target_phrase.clone(),
                },
                format!("Typing {} into {name}.", intent.target_phrase),
            ),
            IntentVerb::Scroll => (
                ResolutionAction::Navigate {
                    element: element.clone(),
                },
                format!("Moving to {name}."),
            ),
            _ => (
                ResolutionAction::Click {
                    element: element.clone(),
                },
                format!("Selecting {name}."),
            ),
        };
        (action, spoken, confidence, ResponsePriority::Normal, false)
    }

    /// Every errored terminal still produces a spoken response. Silent
    /// failure is the one outcome a blind user cannot recover from.
    fn errored(&self, request: &ResolutionRequest, error: ProviderError) -> ResolutionResult {
        tracing::error!(
            request_id = %request.request_id,
            kind = %error.kind,
            error = %error.message,
            "resolution errored"
        );
        let result = ResolutionResult {
            action: ResolutionAction::Error {
                cause: FailureCause::Provider { kind: error.kind },
            },
            spoken_text: "I couldn't analyze the screen just now. \
                          Nothing was clicked. Please try again in a moment."
                .to_string(),
            confidence: 0.0,
            used_cache: false,
        };
        let intent = self.parser.parse(&request.utterance);
        self.respond(request, &intent, &result, ResponsePriority::Urgent, true);
        result
    }

    fn respond(
        &self,
        request: &ResolutionRequest,
        intent: &Intent,
        result: &ResolutionResult,
        priority: ResponsePriority,
        supersedes_previous: bool,
    ) {
        self.queue.enqueue(QueuedResponse {
            text: result.spoken_text.clone(),
            priority,
            source_request_id: request.request_id,
            lineage: self.lineage,
            supersedes_previous,
        });
        self.record(request, intent, result);
    }

    fn record(&self, request: &ResolutionRequest, intent: &Intent, result: &ResolutionResult) {
        let Ok(mut history) = self.history.lock() else {
            return;
        };
        history.push(HistoryEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            utterance: request.utterance.clone(),
            verb: format!("{:?}", intent.verb),
            action: action_tag(&result.action).to_string(),
            spoken_text: result.spoken_text.clone(),
            used_cache: result.used_cache,
        });
        if let Err(e) = history.flush() {
            tracing::warn!(error = %e, "failed to flush session history");
        }
    }

    fn transition(&self, request_id: Uuid, from: ResolutionPhase, to: ResolutionPhase) {
        tracing::debug!(request_id = %request_id, from = ?from, to = ?to, "phase transition");
    }
}

fn action_tag(action: &ResolutionAction) -> &'static str {
    match action {
        ResolutionAction::None => "none",
        ResolutionAction::Click { .. } => "click",
        ResolutionAction::TypeText { .. } => "type_text",
        ResolutionAction::Navigate { .. } => "navigate",
        ResolutionAction::Error { .. } => "error",
    }
}

fn element_name(element: &UIElement) -> String {
    match &element.label {
        Some(label) => label.clone(),
        None => match element.kind {
            ElementKind::Button => "the button".to_string(),
            ElementKind::Menu => "the menu".to_string(),
            ElementKind::Input => "the input field".to_string(),
            ElementKind::Text => "the text".to_string(),
            ElementKind::Other => "the element".to_string(),
        },
    }
}

fn quoted_or_anything(target: &str) -> String {
    if target.is_empty() {
        "a matching element".to_string()
    } else {
        format!("'{target}'")
    }
}

fn describe_text(analysis: &ScreenAnalysis) -> String {
    let mut text = analysis.description.trim().to_string();
    if text.is_empty() {
        text = "The screen could not be described.".to_string();
    }
    if !text.ends_with('.') && !text.ends_with('!') && !text.ends_with('?') {
        text.push('.');
    }

    let mut interactive: Vec<UIElement> =
        analysis.interactive_elements().cloned().collect();
    if !interactive.is_empty() {
        sort_reading_order(&mut interactive);
        let names: Vec<String> = interactive.iter().map(element_name).collect();
        text.push_str(&format!(" Controls: {}.", names.join(", ")));
    }
    text
}

fn list_text(analysis: &ScreenAnalysis) -> String {
    let mut interactive: Vec<UIElement> =
        analysis.interactive_elements().cloned().collect();
    if interactive.is_empty() {
        return "No interactive options detected on this screen.".to_string();
    }
    sort_reading_order(&mut interactive);
    let names: Vec<String> = interactive.iter().map(element_name).collect();
    format!(
        "{} option{}: {}.",
        names.len(),
        if names.len() == 1 { "" } else { "s" },
        names.join(", ")
    )
}

fn ambiguous_text(options: &[UIElement]) -> String {
    let names: Vec<String> = options.iter().map(element_name).collect();
    format!(
        "I found {} matching options: {}. Which one do you mean?",
        names.len(),
        names.join(", ")
    )
}
