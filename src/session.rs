use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{PipelineError, TurnError, TurnStage};
use crate::models::{LlmResponse, Mode, RawHistoryEntry, RawRole, Role, Turn};

/// Identifies the turn a result belongs to. Only the newest ticket of a
/// session may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TurnTicket {
    epoch: u64,
}

/// Everything a turn reads from the session, captured when the turn starts.
#[derive(Debug, Clone)]
pub struct TurnSnapshot {
    pub ticket: TurnTicket,
    pub turns: Vec<Turn>,
    pub raw_history: Vec<RawHistoryEntry>,
}

/// One conversation: the displayed transcript plus the rewriter's history.
///
/// Both sequences only change in [`Session::commit`], which appends a whole
/// user/assistant pair or nothing.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// Mode of the most recently committed turn.
    pub last_mode: Option<Mode>,
    stage: TurnStage,
    turns: Vec<Turn>,
    #[serde(skip)]
    raw_history: Vec<RawHistoryEntry>,
    #[serde(skip)]
    epoch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_active_at: now,
            last_mode: None,
            stage: TurnStage::Idle,
            turns: Vec::new(),
            raw_history: Vec::new(),
            epoch: 0,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn raw_history(&self) -> &[RawHistoryEntry] {
        &self.raw_history
    }

    /// Where the newest turn stands: `Idle` before the first turn, then the
    /// outcome of the latest one.
    pub fn stage(&self) -> TurnStage {
        self.stage
    }

    /// Completed user/assistant exchanges.
    pub fn exchange_count(&self) -> usize {
        self.turns.len() / 2
    }

    /// Start a new turn. Any turn started earlier can no longer commit, and
    /// each ticket commits at most once.
    pub fn begin_turn(&mut self) -> TurnSnapshot {
        self.epoch += 1;
        self.stage = TurnStage::AwaitingRewrite;
        TurnSnapshot {
            ticket: TurnTicket { epoch: self.epoch },
            turns: self.turns.clone(),
            raw_history: self.raw_history.clone(),
        }
    }

    /// Whether `ticket` is still the session's newest turn.
    pub fn is_current(&self, ticket: &TurnTicket) -> bool {
        ticket.epoch == self.epoch
    }

    /// Append the user utterance and the answer to both histories.
    ///
    /// Fails without touching the session if the ticket is stale or the
    /// histories are already out of step.
    pub fn commit(
        &mut self,
        ticket: &TurnTicket,
        mode: Mode,
        response: &LlmResponse,
    ) -> Result<(), TurnError> {
        if !self.is_current(ticket) {
            return Err(TurnError::Superseded);
        }
        self.check_invariants().map_err(TurnError::State)?;

        self.turns.push(Turn::user(response.input.clone()));
        self.turns.push(Turn::assistant(response.answer.clone()));
        self.raw_history
            .push(RawHistoryEntry::human(response.input.clone()));
        self.raw_history
            .push(RawHistoryEntry::ai(response.answer.clone()));
        self.last_mode = Some(mode);
        self.stage = TurnStage::Committed;
        self.last_active_at = Utc::now();
        self.epoch += 1;
        Ok(())
    }

    /// Record that the turn holding `ticket` stopped without committing.
    /// Histories are not touched, and a stale ticket changes nothing.
    pub fn mark_failed(&mut self, ticket: &TurnTicket) {
        if self.is_current(ticket) {
            self.stage = TurnStage::Failed;
        }
    }

    /// Check that the display turns and raw history are paired and in step.
    pub fn check_invariants(&self) -> Result<(), PipelineError> {
        if self.turns.len() % 2 != 0 {
            return Err(PipelineError::StateInconsistency(format!(
                "odd number of display turns: {}",
                self.turns.len()
            )));
        }
        if self.raw_history.len() != self.turns.len() {
            return Err(PipelineError::StateInconsistency(format!(
                "raw history has {} entries for {} display turns",
                self.raw_history.len(),
                self.turns.len()
            )));
        }
        for (i, (turn, raw)) in self.turns.iter().zip(&self.raw_history).enumerate() {
            let expected = if i % 2 == 0 {
                (Role::User, RawRole::Human)
            } else {
                (Role::Assistant, RawRole::Ai)
            };
            if (turn.role, raw.role) != expected || turn.content != raw.content {
                return Err(PipelineError::StateInconsistency(format!(
                    "history entry {i} is out of step"
                )));
            }
        }
        Ok(())
    }
}

/// The most recent `max_turns` display turns, rounded down to whole
/// user/assistant pairs but never below one pair. Zero means all of them.
pub fn history_window(turns: &[Turn], max_turns: usize) -> &[Turn] {
    let keep = (max_turns - max_turns % 2).max(2);
    if max_turns == 0 || turns.len() <= keep {
        return turns;
    }
    &turns[turns.len() - keep..]
}
