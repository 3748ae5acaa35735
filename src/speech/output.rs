use std::sync::Arc;

use crate::speech::queue::ResponseQueue;
use crate::speech::TtsSink;

/// The single consumer of the response queue.
///
/// Exactly one of these runs per engine session; together with the queue's
/// ordering rules it guarantees that responses are spoken one at a time, in
/// priority order, with no overlap. A sink failure drops that one response
/// and keeps the loop alive: a dead narrator is worse than a skipped line.
pub async fn run_output_loop(queue: Arc<ResponseQueue>, sink: Arc<dyn TtsSink>) {
    tracing::info!("speech output loop started");
    while let Some(item) = queue.dequeue_next().await {
        tracing::info!(
            request_id = %item.source_request_id,
            priority = ?item.priority,
            chars = item.text.len(),
            "speaking response"
        );
        if let Err(e) = sink.speak(&item.text).await {
            tracing::error!(error = %e, "tts sink failed; response dropped");
        }
    }
    tracing::info!("speech output loop ended");
}
