//! Scripted dialogues and the per-room progression cursor.

pub mod progression;

pub use progression::{Completion, Outcome, ProgressionConfig, Session, SessionState, TurnResult};

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};
use crate::leveling::Tier;

/// One prompt/expected-response pair in a [`Script`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    /// What the tutor says.
    pub prompt: String,
    /// What the learner should say back.
    pub expected_response: String,
}

impl Exchange {
    pub fn new(prompt: impl Into<String>, expected_response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            expected_response: expected_response.into(),
        }
    }
}

/// The full ordered dialogue generated for one topic and tier.
///
/// Immutable once built: fields are private and only read through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    topic: String,
    tier: Tier,
    exchanges: Vec<Exchange>,
}

impl Script {
    /// Build a script, rejecting an empty dialogue or an exchange whose
    /// expected response is blank (it could never be scored).
    pub fn new(topic: impl Into<String>, tier: Tier, exchanges: Vec<Exchange>) -> Result<Self> {
        if exchanges.is_empty() {
            return Err(ParleyError::InvalidScript("script has no exchanges".into()));
        }
        if let Some(pos) = exchanges
            .iter()
            .position(|e| e.expected_response.trim().is_empty())
        {
            return Err(ParleyError::InvalidScript(format!(
                "exchange {} has an empty expected response",
                pos + 1
            )));
        }
        Ok(Self {
            topic: topic.into(),
            tier,
            exchanges,
        })
    }

    /// Build from text already known to satisfy the `new` checks (the
    /// built-in dialogue library).
    pub(crate) fn from_trusted(topic: impl Into<String>, tier: Tier, exchanges: Vec<Exchange>) -> Self {
        debug_assert!(!exchanges.is_empty());
        debug_assert!(exchanges.iter().all(|e| !e.expected_response.trim().is_empty()));
        Self {
            topic: topic.into(),
            tier,
            exchanges,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn get(&self, index: usize) -> Option<&Exchange> {
        self.exchanges.get(index)
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}
