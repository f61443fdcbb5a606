use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{TurnError, TurnStage};
use crate::llm::rewrite::rewrite;
use crate::llm::synthesize::synthesize;
use crate::llm::Generator;
use crate::models::{LlmResponse, Mode};
use crate::search::multi_query::{expand_and_retrieve, MultiQuerySettings};
use crate::search::Retriever;
use crate::session::{history_window, Session, TurnSnapshot};

/// Drives one user turn through rewrite, multi-query retrieval and
/// synthesis, then commits the result to the session.
///
/// Capabilities are injected once and shared by every session.
pub struct TurnOrchestrator {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
}

impl TurnOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a full turn against `session` and commit it.
    ///
    /// On any failure the session's histories are left exactly as they were.
    pub async fn handle_turn(
        &self,
        session: &mut Session,
        mode: Mode,
        utterance: &str,
    ) -> Result<LlmResponse, TurnError> {
        let snapshot = session.begin_turn();
        let response = match self.run(&snapshot, mode, utterance).await {
            Ok(response) => response,
            Err(e) => {
                session.mark_failed(&snapshot.ticket);
                return Err(e);
            }
        };

        if let Err(e) = session.commit(&snapshot.ticket, mode, &response) {
            tracing::error!(stage = %TurnStage::Failed, "Commit refused: {e}");
            session.mark_failed(&snapshot.ticket);
            return Err(e);
        }
        tracing::debug!(stage = %TurnStage::Committed, "Turn committed");
        Ok(response)
    }

    /// Run the pipeline stages for a turn without touching any session.
    ///
    /// The rewritten query is used for retrieval only; synthesis sees the
    /// original utterance and the original display history.
    pub async fn run(
        &self,
        snapshot: &TurnSnapshot,
        mode: Mode,
        utterance: &str,
    ) -> Result<LlmResponse, TurnError> {
        tracing::info!(mode = %mode, "User message: {utterance}");
        let generator = self.generator.as_ref();

        // ── Stage 1: history-aware rewrite ───────────────────
        tracing::debug!(stage = %TurnStage::AwaitingRewrite, "Rewriting query");
        let query = rewrite(
            generator,
            &snapshot.raw_history,
            utterance,
            self.config.generation_timeout(),
        )
        .await
        .map_err(|e| fail(TurnError::Rewrite(e)))?;
        tracing::debug!("Rewritten query: {query}");

        // ── Stage 2: multi-query retrieval ───────────────────
        tracing::debug!(stage = %TurnStage::AwaitingRetrieval, "Retrieving passages");
        let settings = MultiQuerySettings::from(&self.config);
        let passages = expand_and_retrieve(&query, self.retriever.as_ref(), generator, &settings)
            .await
            .map_err(|e| fail(TurnError::Retrieval(e)))?;

        if passages.is_empty() {
            tracing::warn!(mode = %mode, "No documents were retrieved");
        } else {
            tracing::info!(
                mode = %mode,
                "Retrieved {} documents from: {:?}",
                passages.len(),
                passages.source_names()
            );
        }

        // ── Stage 3: grounded synthesis ──────────────────────
        tracing::debug!(stage = %TurnStage::AwaitingSynthesis, "Synthesizing answer");
        let history = history_window(&snapshot.turns, self.config.max_history_turns);
        let response = synthesize(
            generator,
            mode,
            utterance,
            history,
            passages,
            self.config.generation_timeout(),
        )
        .await
        .map_err(|e| fail(TurnError::Synthesis(e)))?;

        tracing::info!(mode = %mode, "Answer: {}", response.answer);
        Ok(response)
    }
}

fn fail(err: TurnError) -> TurnError {
    tracing::error!(stage = %err.stage(), "Turn failed: {err}");
    err
}
