pub mod config;
pub mod engine;
pub mod errors;
pub mod intent;
pub mod perception;
pub mod provider;
pub mod ranking;
pub mod speech;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::engine::ResolutionEngine;
use crate::errors::{EchoSightError, EchoSightResult};
use crate::perception::cache::AnalysisCache;
use crate::provider::heuristic::HeuristicAnalyzer;
use crate::provider::limiter::RateGate;
use crate::provider::openai_compatible::OpenAiCompatibleBackend;
use crate::provider::orchestrator::{OrchestratorConfig, ProviderOrchestrator};
use crate::ranking::CandidateRanker;
use crate::speech::queue::ResponseQueue;

/// Builds a ready-to-use engine and its response queue from config.
///
/// The backend chain follows `providers.fallback_order`, with the local
/// heuristic analyzer always appended last so the chain can never be
/// empty. API keys come from `ECHOSIGHT_<ID>_API_KEY`, falling back to the
/// key stored in config.toml.
pub fn build_engine(
    config: &AppConfig,
) -> EchoSightResult<(Arc<ResolutionEngine>, Arc<ResponseQueue>)> {
    let orch_config = OrchestratorConfig {
        timeout: Duration::from_secs(config.providers.timeout_secs),
        max_retries: config.providers.max_retries,
        backoff_base: Duration::from_millis(config.providers.backoff_base_ms),
    };
    let mut orchestrator = ProviderOrchestrator::new(orch_config);

    for id in &config.providers.fallback_order {
        let entry = config.providers.backends.get(id).ok_or_else(|| {
            EchoSightError::Config(format!(
                "fallback_order references unknown backend '{id}'"
            ))
        })?;
        let api_key = std::env::var(format!("ECHOSIGHT_{}_API_KEY", id.to_uppercase()))
            .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
        let backend = OpenAiCompatibleBackend::new(
            id.clone(),
            entry.api_base.clone(),
            api_key,
            entry.model.clone(),
        );
        orchestrator.push_backend(
            Arc::new(backend),
            RateGate::new(entry.max_calls_per_minute, entry.queue_depth),
        );
    }

    // Last resort: never leaves the user in silence.
    orchestrator.push_backend(
        Arc::new(HeuristicAnalyzer::new()),
        RateGate::new(600, 16),
    );

    tracing::info!(
        chain = ?orchestrator.backend_names(),
        cache_capacity = config.cache.capacity,
        "engine assembled"
    );

    let queue = Arc::new(ResponseQueue::new());
    let engine = ResolutionEngine::new(
        Arc::new(AnalysisCache::new(config.cache.capacity)),
        Arc::new(orchestrator),
        queue.clone(),
        CandidateRanker::new(config.ranker),
        config.cache.ttl(),
    );

    Ok((Arc::new(engine), queue))
}
