use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{Passage, PassageMetadata};

/// One embedded passage as written by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub text: String,
    pub metadata: PassageMetadata,
    pub embedding: Vec<f32>,
}

/// In-memory vector store with cosine similarity search.
///
/// The store is read-only from the pipeline's point of view: it is loaded
/// once from the corpus file and searched per query.
#[derive(Default)]
pub struct VectorStore {
    entries: RwLock<Vec<CorpusEntry>>,
}

impl VectorStore {
    /// Load the corpus at `path`. A missing file is an empty corpus.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read corpus {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse corpus {}", path.display()))?
        } else {
            tracing::warn!("Corpus {} not found, starting empty", path.display());
            Vec::new()
        };

        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<CorpusEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn insert(&self, text: &str, metadata: PassageMetadata, embedding: Vec<f32>) {
        self.entries.write().push(CorpusEntry {
            text: text.to_string(),
            metadata,
            embedding,
        });
    }

    /// Search by cosine similarity against a query embedding.
    pub fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<Passage> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &CorpusEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| Passage {
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                score,
                query_origin: String::new(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
