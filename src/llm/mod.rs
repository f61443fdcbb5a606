//! Generation: the capability contract, the HTTP-backed client, and the three
//! generation-driven pipeline steps (rewrite, expansion, synthesis).

pub mod client;
pub mod embeddings;
pub mod prompt;
pub mod query_expand;
pub mod rewrite;
pub mod synthesize;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::PipelineError;
use crate::models::ChatMessage;

/// Produces text for a chat-shaped prompt (system, history..., user).
///
/// Implementations report failures as [`PipelineError::Generation`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, PipelineError>;
}

/// Call `generator` under `timeout`. Blank output counts as a failure.
pub async fn generate_within(
    generator: &dyn Generator,
    messages: &[ChatMessage],
    timeout: Duration,
) -> Result<String, PipelineError> {
    let text = tokio::time::timeout(timeout, generator.generate(messages))
        .await
        .map_err(|_| {
            PipelineError::Generation(format!("timed out after {}s", timeout.as_secs_f32()))
        })??;

    let text = text.trim();
    if text.is_empty() {
        return Err(PipelineError::Generation("empty response".to_string()));
    }
    Ok(text.to_string())
}
