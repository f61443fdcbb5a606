use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::llm::embeddings::embed_query;
use crate::models::Passage;
use crate::search::vector::VectorStore;
use crate::search::Retriever;

/// Embeds the query and searches the in-memory corpus.
pub struct VectorRetriever {
    store: Arc<VectorStore>,
    http_client: reqwest::Client,
    config: LlmConfig,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(
        store: Arc<VectorStore>,
        http_client: reqwest::Client,
        config: LlmConfig,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            http_client,
            config,
            top_k,
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, PipelineError> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = embed_query(&self.http_client, &self.config, query)
            .await
            .map_err(|e| PipelineError::retrieval(format!("{e:#}")))?;

        let mut passages = self.store.search(&embedding, self.top_k);
        for passage in &mut passages {
            passage.query_origin = query.to_string();
        }
        Ok(passages)
    }
}
