//! Difficulty tiers and the unlock policy.
//!
//! Tiers unlock by completed-conversation count. The stored tier is a
//! ratchet: it only ever moves up.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Easy,
    Medium,
    Hard,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Easy, Tier::Medium, Tier::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Easy => "easy",
            Tier::Medium => "medium",
            Tier::Hard => "hard",
        }
    }

    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Easy => Some(Tier::Medium),
            Tier::Medium => Some(Tier::Hard),
            Tier::Hard => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Tier::Easy),
            "medium" => Ok(Tier::Medium),
            "hard" => Ok(Tier::Hard),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Unlock thresholds and per-tier dialogue length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelingPolicy {
    /// Completed conversations needed to unlock `Medium`. Default: 5.
    pub medium_unlock: u32,
    /// Completed conversations needed to unlock `Hard`. Default: 10.
    pub hard_unlock: u32,
    pub easy_exchanges: usize,
    pub medium_exchanges: usize,
    pub hard_exchanges: usize,
}

impl Default for LevelingPolicy {
    fn default() -> Self {
        Self {
            medium_unlock: 5,
            hard_unlock: 10,
            easy_exchanges: 5,
            medium_exchanges: 7,
            hard_exchanges: 10,
        }
    }
}

impl LevelingPolicy {
    /// Policy with custom unlock thresholds and default exchange counts.
    pub fn with_thresholds(medium_unlock: u32, hard_unlock: u32) -> Self {
        Self {
            medium_unlock,
            hard_unlock,
            ..Self::default()
        }
    }

    pub fn highest_unlocked(&self, completed_count: u32) -> Tier {
        if completed_count >= self.hard_unlock {
            Tier::Hard
        } else if completed_count >= self.medium_unlock {
            Tier::Medium
        } else {
            Tier::Easy
        }
    }

    pub fn available_tiers(&self, completed_count: u32) -> BTreeSet<Tier> {
        let top = self.highest_unlocked(completed_count);
        Tier::ALL.into_iter().filter(|t| *t <= top).collect()
    }

    pub fn next_exchange_count(&self, tier: Tier) -> usize {
        match tier {
            Tier::Easy => self.easy_exchanges,
            Tier::Medium => self.medium_exchanges,
            Tier::Hard => self.hard_exchanges,
        }
    }

    /// Conversations left before the next tier unlocks, `None` at the top.
    pub fn conversations_until_next_tier(&self, completed_count: u32) -> Option<u32> {
        match self.highest_unlocked(completed_count) {
            Tier::Easy => Some(self.medium_unlock.saturating_sub(completed_count)),
            Tier::Medium => Some(self.hard_unlock.saturating_sub(completed_count)),
            Tier::Hard => None,
        }
    }
}

/// Per-user counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelingState {
    pub completed_count: u32,
    pub tier: Tier,
}

impl Default for LevelingState {
    fn default() -> Self {
        Self {
            completed_count: 0,
            tier: Tier::Easy,
        }
    }
}

impl LevelingState {
    /// Count one finished script and ratchet the tier.
    /// Returns the new tier when it moved.
    pub fn record_completion(&mut self, policy: &LevelingPolicy) -> Option<Tier> {
        self.completed_count = self.completed_count.saturating_add(1);
        let unlocked = policy.highest_unlocked(self.completed_count);
        if unlocked > self.tier {
            self.tier = unlocked;
            Some(unlocked)
        } else {
            None
        }
    }

    /// Tiers the user may request: everything up to the stored tier or the
    /// policy-derived one, whichever is higher.
    pub fn available_tiers(&self, policy: &LevelingPolicy) -> BTreeSet<Tier> {
        let top = self.tier.max(policy.highest_unlocked(self.completed_count));
        Tier::ALL.into_iter().filter(|t| *t <= top).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_unlock_at_thresholds() {
        let policy = LevelingPolicy::with_thresholds(2, 5);
        assert_eq!(policy.available_tiers(1), BTreeSet::from([Tier::Easy]));
        assert_eq!(
            policy.available_tiers(2),
            BTreeSet::from([Tier::Easy, Tier::Medium])
        );
        assert_eq!(policy.available_tiers(4).len(), 2);
        assert_eq!(policy.available_tiers(5), BTreeSet::from(Tier::ALL));
        assert_eq!(policy.available_tiers(500), BTreeSet::from(Tier::ALL));
    }

    #[test]
    fn exchange_count_lookup() {
        let policy = LevelingPolicy::default();
        assert_eq!(policy.next_exchange_count(Tier::Easy), 5);
        assert_eq!(policy.next_exchange_count(Tier::Medium), 7);
        assert_eq!(policy.next_exchange_count(Tier::Hard), 10);
    }

    #[test]
    fn record_completion_ratchets_once_per_threshold() {
        let policy = LevelingPolicy::with_thresholds(2, 3);
        let mut state = LevelingState::default();
        assert_eq!(state.record_completion(&policy), None);
        assert_eq!(state.record_completion(&policy), Some(Tier::Medium));
        assert_eq!(state.record_completion(&policy), Some(Tier::Hard));
        assert_eq!(state.record_completion(&policy), None);
        assert_eq!(state.completed_count, 4);
        assert_eq!(state.tier, Tier::Hard);
    }

    #[test]
    fn stored_tier_never_regresses_under_stricter_policy() {
        let mut state = LevelingState {
            completed_count: 6,
            tier: Tier::Hard,
        };
        let strict = LevelingPolicy::with_thresholds(10, 20);
        assert_eq!(state.record_completion(&strict), None);
        assert_eq!(state.tier, Tier::Hard);
        assert_eq!(state.available_tiers(&strict).len(), 3);
    }

    #[test]
    fn countdown_to_next_tier() {
        let policy = LevelingPolicy::default();
        assert_eq!(policy.conversations_until_next_tier(3), Some(2));
        assert_eq!(policy.conversations_until_next_tier(7), Some(3));
        assert_eq!(policy.conversations_until_next_tier(10), None);
    }

    #[test]
    fn tier_parses_and_orders() {
        assert_eq!("Medium".parse::<Tier>(), Ok(Tier::Medium));
        assert!("expert".parse::<Tier>().is_err());
        assert!(Tier::Easy < Tier::Medium && Tier::Medium < Tier::Hard);
        assert_eq!(Tier::Hard.next(), None);
    }
}
