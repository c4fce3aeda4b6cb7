use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod evaluator;
pub mod matcher;
pub mod scheduler;

pub use evaluator::{evaluate, resolve_wager, EvalError, LegOutcome, WagerSettlement};
pub use matcher::{match_leg, LegMatch};
pub use scheduler::SettlementEngine;

/// Which upstream endpoint class is authoritative for a leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegTiming {
    Pregame,
    Ingame,
}

/// Terminal and non-terminal wager states. `Pending` is the only
/// non-terminal state; a wager leaves it at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Void,
    PartiallyVoid,
}

impl WagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Pending => "pending",
            WagerStatus::Won => "won",
            WagerStatus::Lost => "lost",
            WagerStatus::Void => "void",
            WagerStatus::PartiallyVoid => "partially_void",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WagerStatus::Pending),
            "won" => Some(WagerStatus::Won),
            "lost" => Some(WagerStatus::Lost),
            "void" => Some(WagerStatus::Void),
            "partially_void" => Some(WagerStatus::PartiallyVoid),
            _ => None,
        }
    }
}

/// One selection within a wager. Single wagers have exactly one leg;
/// combination wagers preserve leg order from placement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Leg {
    pub match_id: String,
    /// Free-text match name, used only as a matching fallback.
    pub match_name: String,
    pub sport_key: String,
    pub market_key: String,
    pub selection: String,
    /// Placement-time odds for this leg; needed for partial-void payouts.
    pub odds: f64,
    pub timing: LegTiming,
}

/// A placed wager. The placement snapshot (stake, odds, selections) is
/// immutable; the engine only ever writes `status`, exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wager {
    pub id: Uuid,
    pub user_id: Uuid,
    pub legs: Vec<Leg>,
    pub status: WagerStatus,
    pub stake: f64,
    pub total_odds: f64,
    pub potential_return: f64,
    pub created_at: DateTime<Utc>,
}

/// Operator overrides suppressing settlement for (event, market) pairs.
/// Owned and mutated by operator tooling; read-only to the engine.
#[derive(Clone, Debug, Default)]
pub struct DisabledEvents {
    keys: HashSet<(String, String)>,
}

impl DisabledEvents {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            keys: pairs.into_iter().collect(),
        }
    }

    pub fn contains(&self, event_id: &str, market_key: &str) -> bool {
        self.keys
            .contains(&(event_id.to_string(), market_key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_events_keyed_on_event_and_market() {
        let disabled = DisabledEvents::from_pairs([
            ("100".to_string(), "match_result".to_string()),
            ("100".to_string(), "total".to_string()),
        ]);
        assert_eq!(disabled.len(), 2);
        assert!(!disabled.is_empty());
        assert!(disabled.contains("100", "match_result"));
        assert!(!disabled.contains("100", "handicap"));
        assert!(!disabled.contains("200", "match_result"));
        assert!(DisabledEvents::default().is_empty());
    }
}
