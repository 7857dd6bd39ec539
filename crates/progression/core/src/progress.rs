//! Contribution ledger records.

use chrono::{DateTime, Utc};

use crate::ids::{NodeId, ProgressId, SessionId, UserId};

/// Contributions accumulated toward the current unlock target.
///
/// At most one record is active (not completed) at a time. A record may exist
/// without a target while voting is still open; contributions accrue either way
/// and carry over once a target is chosen.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnlockProgress {
    pub id: ProgressId,
    pub node_id: Option<NodeId>,
    pub target_level: Option<u32>,
    /// Session that chose the target. Must reference an existing session.
    pub voting_session_id: Option<SessionId>,
    pub contributions_accumulated: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UnlockProgress {
    pub fn new(id: ProgressId, initial_contributions: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            node_id: None,
            target_level: None,
            voting_session_id: None,
            contributions_accumulated: initial_contributions,
            started_at,
            completed_at: None,
        }
    }

    /// Target node and level, when one has been chosen.
    pub fn target(&self) -> Option<(NodeId, u32)> {
        Some((self.node_id?, self.target_level?))
    }

    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// Aggregate engagement for one participant.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserEngagement {
    pub user_id: UserId,
    pub score: u64,
}

/// Audit record of a tree reset.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressionReset {
    pub reset_by: String,
    pub reason: String,
    /// Unlock records removed by the reset.
    pub nodes_reset: usize,
    /// Sum of every participant's engagement just before the reset.
    pub engagement_score_at_reset: u64,
    pub reset_at: DateTime<Utc>,
}
