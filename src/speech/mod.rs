pub mod output;
pub mod queue;

use async_trait::async_trait;

use crate::errors::EchoSightResult;

/// Text-to-speech collaborator boundary. `speak` returns only once
/// playback has finished, which is what lets the output loop guarantee a
/// single utterance at a time.
#[async_trait]
pub trait TtsSink: Send + Sync {
    async fn speak(&self, text: &str) -> EchoSightResult<()>;
}
