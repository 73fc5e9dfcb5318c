//! Dialogue progression state machine.
//!
//! ## States
//!
//! ```text
//!                 score < threshold
//!                 ┌──────────────┐
//!                 ▼              │
//! new() ──► AwaitingResponse ────┘
//!                 │  score ≥ threshold, index + 1 < len  → Advanced
//!                 │  score ≥ threshold, index + 1 == len → Completed
//!                 ▼
//!             Completed  (absorbing; submit → TerminalState)
//! ```
//!
//! `supersede()` forces `Completed` without advancing the index; it is used
//! when a new script starts in the same room.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Exchange, Script};
use crate::error::{ParleyError, Result};
use crate::scoring::{align, score, AlignThresholds, Alignment};

/// Tunables for the progression machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionConfig {
    /// Minimum score (0..=100) that advances to the next exchange. Default: 70.
    pub acceptance_threshold: u8,
    /// Word-grading cut-offs for the alignment feedback.
    pub align: AlignThresholds,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 70,
            align: AlignThresholds::default(),
        }
    }
}

/// Why a session became terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    /// Every exchange was answered; `index == script.len()`.
    Finished,
    /// Closed because a newer script started in the same room.
    Superseded,
}

impl Completion {
    pub fn as_str(self) -> &'static str {
        match self {
            Completion::Finished => "finished",
            Completion::Superseded => "superseded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "finished" => Some(Completion::Finished),
            "superseded" => Some(Completion::Superseded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingResponse,
    Completed,
}

/// Per-submission result. Not persisted as its own entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub candidate: String,
    pub expected: String,
    pub score: u8,
    pub alignment: Alignment,
}

/// What `submit` decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    /// Accepted; `next` is the exchange to serve now.
    Advanced { turn: TurnResult, next: Exchange },
    /// Below threshold; the same exchange must be served again.
    Retry { turn: TurnResult, prompt: Exchange },
    /// Accepted and that was the last exchange.
    Completed { turn: TurnResult },
}

impl Outcome {
    pub fn turn(&self) -> &TurnResult {
        match self {
            Outcome::Advanced { turn, .. }
            | Outcome::Retry { turn, .. }
            | Outcome::Completed { turn } => turn,
        }
    }

    /// The prompt the learner sees next, if any.
    pub fn next_prompt(&self) -> Option<&Exchange> {
        match self {
            Outcome::Advanced { next, .. } => Some(next),
            Outcome::Retry { prompt, .. } => Some(prompt),
            Outcome::Completed { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Advanced { .. } => "advanced",
            Outcome::Retry { .. } => "retry",
            Outcome::Completed { .. } => "completed",
        }
    }
}

/// Mutable cursor over one immutable [`Script`].
#[derive(Debug, Clone)]
pub struct Session {
    script: Arc<Script>,
    config: ProgressionConfig,
    index: usize,
    completion: Option<Completion>,
}

impl Session {
    /// Fresh session positioned at the first exchange.
    pub fn new(script: Arc<Script>, config: ProgressionConfig) -> Self {
        Self {
            script,
            config,
            index: 0,
            completion: None,
        }
    }

    /// Rebuild a session from persisted fields.
    ///
    /// # Errors
    /// `InvariantViolation` if the stored index is out of bounds or disagrees
    /// with the stored completion.
    pub fn resume(
        script: Arc<Script>,
        config: ProgressionConfig,
        index: usize,
        completion: Option<Completion>,
    ) -> Result<Self> {
        let len = script.len();
        let consistent = match completion {
            None => index < len,
            Some(Completion::Finished) => index == len,
            Some(Completion::Superseded) => index <= len,
        };
        if !consistent {
            return Err(ParleyError::InvariantViolation(format!(
                "session index {index} with completion {completion:?} over a {len}-exchange script"
            )));
        }
        Ok(Self {
            script,
            config,
            index,
            completion,
        })
    }

    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn is_completed(&self) -> bool {
        self.completion.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_completed() {
            SessionState::Completed
        } else {
            SessionState::AwaitingResponse
        }
    }

    /// Exchange at the cursor, or `None` once completed. Never mutates.
    pub fn current_prompt(&self) -> Option<&Exchange> {
        if self.is_completed() {
            return None;
        }
        self.script.get(self.index)
    }

    /// Score `candidate` against the current expected response and move the
    /// cursor accordingly.
    ///
    /// # Errors
    /// - `TerminalState` once completed (nothing is mutated).
    /// - `EmptyInput` when the candidate is blank (nothing is mutated).
    pub fn submit(&mut self, candidate: &str) -> Result<Outcome> {
        if self.is_completed() {
            return Err(ParleyError::TerminalState);
        }
        let exchange = self.script.get(self.index).cloned().ok_or_else(|| {
            ParleyError::InvariantViolation(format!(
                "open session index {} outside script of {}",
                self.index,
                self.script.len()
            ))
        })?;

        let score = score(candidate, &exchange.expected_response).ok_or(ParleyError::EmptyInput)?;
        let alignment = align(candidate, &exchange.expected_response, &self.config.align);
        let turn = TurnResult {
            candidate: candidate.trim().to_string(),
            expected: exchange.expected_response.clone(),
            score,
            alignment,
        };

        if score < self.config.acceptance_threshold {
            debug!(index = self.index, score, "response below threshold, retrying");
            return Ok(Outcome::Retry {
                turn,
                prompt: exchange,
            });
        }

        self.index += 1;
        match self.script.get(self.index) {
            Some(next) => {
                debug!(index = self.index, score, "advanced to next exchange");
                Ok(Outcome::Advanced {
                    turn,
                    next: next.clone(),
                })
            }
            None => {
                self.completion = Some(Completion::Finished);
                debug!(index = self.index, score, "script completed");
                Ok(Outcome::Completed { turn })
            }
        }
    }

    /// Force the session terminal because a newer script replaced it.
    /// No-op when already completed.
    pub fn supersede(&mut self) {
        if self.completion.is_none() {
            self.completion = Some(Completion::Superseded);
        }
    }
}
