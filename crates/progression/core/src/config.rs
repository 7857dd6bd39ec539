//! Tunable progression parameters.

use std::collections::BTreeMap;
use std::time::Duration;

/// Engagement metric recorded when a user sends a chat message.
pub const METRIC_MESSAGE: &str = "message";
/// Engagement metric recorded when a user runs a command.
pub const METRIC_COMMAND: &str = "command";
/// Engagement metric recorded when a user crafts an item.
pub const METRIC_ITEM_CRAFTED: &str = "item_crafted";

/// Progression configuration.
///
/// Every field has a default, so a TOML file only needs the values it
/// overrides.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProgressionConfig {
    /// Maximum number of options offered in one voting session.
    pub max_voting_options: usize,
    /// Lifetime of cached modifier values, in seconds.
    pub modifier_cache_ttl_secs: u64,
    /// Cap on contributions carried into the next cycle after an unlock.
    /// `None` carries the whole surplus.
    pub max_rollover: Option<u64>,
    /// Engagement awarded to a user for casting a vote.
    pub vote_weight: u64,
    /// Engagement awarded per vote when a session ends.
    pub participation_weight: u64,
    /// Multiplier per engagement metric. Unknown metrics weigh 1.0.
    pub engagement_weights: BTreeMap<String, f64>,
    /// Capacity of each broadcast channel on the in-memory event bus.
    pub event_buffer_size: usize,
}

impl ProgressionConfig {
    pub fn modifier_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.modifier_cache_ttl_secs)
    }

    pub fn engagement_weight(&self, metric: &str) -> f64 {
        self.engagement_weights.get(metric).copied().unwrap_or(1.0)
    }

    /// Applies the rollover cap to an unlock surplus.
    pub fn cap_rollover(&self, surplus: u64) -> u64 {
        match self.max_rollover {
            Some(cap) => surplus.min(cap),
            None => surplus,
        }
    }
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        let engagement_weights = [
            (METRIC_MESSAGE, 1.0),
            (METRIC_COMMAND, 2.0),
            (METRIC_ITEM_CRAFTED, 3.0),
        ]
        .into_iter()
        .map(|(metric, weight)| (metric.to_owned(), weight))
        .collect();

        Self {
            max_voting_options: 4,
            modifier_cache_ttl_secs: 30 * 60,
            max_rollover: None,
            vote_weight: 1,
            participation_weight: 1,
            engagement_weights,
            event_buffer_size: 100,
        }
    }
}
