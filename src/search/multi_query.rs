use futures_util::stream::{self, StreamExt};
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::query_expand::expand_query;
use crate::llm::Generator;
use crate::models::{Passage, PassageSet};
use crate::search::Retriever;

/// Fan-out parameters for [`expand_and_retrieve`].
#[derive(Debug, Clone)]
pub struct MultiQuerySettings {
    /// Alternative phrasings requested on top of the original query.
    pub fanout: usize,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
    pub max_concurrent_retrievals: usize,
}

impl From<&PipelineConfig> for MultiQuerySettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            fanout: config.fanout,
            retrieval_timeout: config.retrieval_timeout(),
            generation_timeout: config.generation_timeout(),
            max_concurrent_retrievals: config.max_concurrent_retrievals.max(1),
        }
    }
}

/// Outcome of retrieving for one issued query.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Position in the issued list; the original query is 0.
    pub index: usize,
    pub query: String,
    pub result: Result<Vec<Passage>, PipelineError>,
}

/// Expand `query` into alternative phrasings, retrieve for all of them
/// concurrently, and merge the results.
///
/// Pipeline:
/// 1. The original query is always issued first; generated alternatives
///    follow, skipping blanks and duplicates. A failed expansion degrades to
///    the original query alone.
/// 2. Each issued query is retrieved under its own timeout.
/// 3. Results are merged in issued order, independent of completion order.
pub async fn expand_and_retrieve(
    query: &str,
    retriever: &dyn Retriever,
    generator: &dyn Generator,
    settings: &MultiQuerySettings,
) -> Result<PassageSet, PipelineError> {
    let alternatives = match expand_query(
        generator,
        query,
        settings.fanout,
        settings.generation_timeout,
    )
    .await
    {
        Ok(alternatives) => alternatives,
        Err(e) => {
            tracing::warn!("Query expansion failed, using original query only: {e}");
            Vec::new()
        }
    };

    let issued = issued_queries(query, alternatives, settings.fanout);
    tracing::info!("Issuing {} queries: {:?}", issued.len(), issued);

    let mut outcomes: Vec<QueryOutcome> = stream::iter(issued.into_iter().enumerate())
        .map(|(index, q)| async move {
            let retrieval = retriever.retrieve(&q);
            let result = match tokio::time::timeout(settings.retrieval_timeout, retrieval).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Retrieval(format!(
                    "timed out after {}s",
                    settings.retrieval_timeout.as_secs_f32()
                ))),
            };
            QueryOutcome {
                index,
                query: q,
                result,
            }
        })
        .buffer_unordered(settings.max_concurrent_retrievals.max(1))
        .collect()
        .await;

    outcomes.sort_by_key(|o| o.index);
    merge_outcomes(outcomes)
}

/// Original query first, then up to `fanout` distinct non-blank alternatives.
fn issued_queries(original: &str, alternatives: Vec<String>, fanout: usize) -> Vec<String> {
    let original = original.trim().to_string();
    let mut seen = vec![original.to_lowercase()];
    let mut issued = vec![original];

    for alt in alternatives {
        if issued.len() > fanout {
            break;
        }
        let alt = alt.trim();
        let key = alt.to_lowercase();
        if alt.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        issued.push(alt.to_string());
    }

    issued
}

/// Merge per-query outcomes, in the order given, into one passage set.
///
/// Failed queries are logged and skipped. Only when every query failed is
/// the merge itself a failure.
pub fn merge_outcomes(outcomes: Vec<QueryOutcome>) -> Result<PassageSet, PipelineError> {
    let total = outcomes.len();
    let mut succeeded = 0usize;
    let mut last_error = None;
    let mut merged = PassageSet::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(passages) => {
                succeeded += 1;
                for mut passage in passages {
                    passage.query_origin = outcome.query.clone();
                    merged.insert(passage);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Retrieval failed for query #{} '{}': {e}",
                    outcome.index,
                    outcome.query
                );
                last_error = Some(e);
            }
        }
    }

    if succeeded == 0 {
        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no queries issued".to_string());
        return Err(PipelineError::Retrieval(format!(
            "all {total} retrieval calls failed (last: {detail})"
        )));
    }

    Ok(merged)
}
