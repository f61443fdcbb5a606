use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Appended to every user-facing error message.
pub const COMMON_ERROR_MESSAGE: &str =
    "If the problem persists, please contact the administrator.";

/// Failures reported by the pipeline's capabilities and components.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// The generation capability failed, timed out or returned nothing usable.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Every retrieval call of a turn failed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// Conversation history broke its pairing invariant.
    #[error("state inconsistency: {0}")]
    StateInconsistency(String),
}

impl PipelineError {
    pub fn generation<E: fmt::Display>(err: E) -> Self {
        PipelineError::Generation(err.to_string())
    }

    pub fn retrieval<E: fmt::Display>(err: E) -> Self {
        PipelineError::Retrieval(err.to_string())
    }
}

/// Orchestrator stage a turn was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Idle,
    AwaitingRewrite,
    AwaitingRetrieval,
    AwaitingSynthesis,
    Committed,
    Failed,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnStage::Idle => "idle",
            TurnStage::AwaitingRewrite => "awaiting_rewrite",
            TurnStage::AwaitingRetrieval => "awaiting_retrieval",
            TurnStage::AwaitingSynthesis => "awaiting_synthesis",
            TurnStage::Committed => "committed",
            TurnStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a turn did not commit. Conversation state is untouched in every case.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TurnError {
    #[error("query rewrite failed: {0}")]
    Rewrite(#[source] PipelineError),

    #[error("document retrieval failed: {0}")]
    Retrieval(#[source] PipelineError),

    #[error("answer synthesis failed: {0}")]
    Synthesis(#[source] PipelineError),

    /// A newer turn started on the same session before this one committed.
    #[error("turn superseded by a newer turn")]
    Superseded,

    #[error("conversation state is inconsistent: {0}")]
    State(#[source] PipelineError),
}

impl TurnError {
    /// The stage the turn failed in.
    pub fn stage(&self) -> TurnStage {
        match self {
            TurnError::Rewrite(_) => TurnStage::AwaitingRewrite,
            TurnError::Retrieval(_) => TurnStage::AwaitingRetrieval,
            TurnError::Synthesis(_) => TurnStage::AwaitingSynthesis,
            TurnError::Superseded | TurnError::State(_) => TurnStage::Committed,
        }
    }

    /// Message safe to show to end users. Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        let message = match self {
            TurnError::Rewrite(_) => "Could not understand the question.",
            TurnError::Retrieval(_) => "Could not retrieve documents.",
            TurnError::Synthesis(_) => "Could not generate an answer.",
            TurnError::Superseded => "The request was replaced by a newer message.",
            TurnError::State(_) => "The conversation could not be updated.",
        };
        build_error_message(message)
    }
}

/// Join a user-facing message with the common contact line.
pub fn build_error_message(message: &str) -> String {
    [message, COMMON_ERROR_MESSAGE].join("\n")
}
