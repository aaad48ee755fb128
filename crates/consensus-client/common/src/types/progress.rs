use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use super::ids::MessageIndex;

/// Free-form sync diagnostics reported by the consensus node.
///
/// Meant for display only, nothing should branch on its contents.
pub type SyncProgressSnapshot = BTreeMap<String, serde_json::Value>;

/// The three message counts tracked across the boundary.
///
/// Ordered by dominance: finalized never exceeds safe and safe never exceeds the sync target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressCounter {
    Finalized,
    Safe,
    SyncTarget,
}

impl ProgressCounter {
    /// All counters, lowest first.
    pub const ALL: [Self; 3] = [Self::Finalized, Self::Safe, Self::SyncTarget];

    /// Position in [`Self::ALL`].
    pub const fn rank(self) -> usize {
        match self {
            Self::Finalized => 0,
            Self::Safe => 1,
            Self::SyncTarget => 2,
        }
    }

    /// Counters this one must be greater than or equal to.
    pub const fn dominated(self) -> &'static [Self] {
        match self {
            Self::Finalized => &[],
            Self::Safe => &[Self::Finalized],
            Self::SyncTarget => &[Self::Finalized, Self::Safe],
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finalized => "finalized",
            Self::Safe => "safe",
            Self::SyncTarget => "sync_target",
        }
    }
}

impl fmt::Display for ProgressCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A consistent triple of message counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageCounts {
    pub finalized: MessageIndex,
    pub safe: MessageIndex,
    pub target: MessageIndex,
}

impl MessageCounts {
    pub fn get(&self, counter: ProgressCounter) -> MessageIndex {
        match counter {
            ProgressCounter::Finalized => self.finalized,
            ProgressCounter::Safe => self.safe,
            ProgressCounter::SyncTarget => self.target,
        }
    }

    pub fn set(&mut self, counter: ProgressCounter, value: MessageIndex) {
        match counter {
            ProgressCounter::Finalized => self.finalized = value,
            ProgressCounter::Safe => self.safe = value,
            ProgressCounter::SyncTarget => self.target = value,
        }
    }

    /// Whether `finalized <= safe <= target` holds.
    pub fn is_ordered(&self) -> bool {
        self.finalized <= self.safe && self.safe <= self.target
    }
}
