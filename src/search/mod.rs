//! Retrieval: the capability contract, the bundled vector-backed retriever,
//! and multi-query fan-out with merge.

pub mod multi_query;
pub mod retriever;
pub mod vector;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::Passage;

/// Returns the passages most relevant to a query, best first.
///
/// An empty corpus yields an empty vec, not an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, PipelineError>;
}
