//! Progression event definitions.

use progression_core::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Event kinds, named by their wire identifiers.
#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, Display, AsRefStr, EnumString, EnumIter,
)]
pub enum EventKind {
    #[strum(serialize = "progression.node_unlocked")]
    #[serde(rename = "progression.node_unlocked")]
    NodeUnlocked,

    #[strum(serialize = "progression.node_relocked")]
    #[serde(rename = "progression.node_relocked")]
    NodeRelocked,

    #[strum(serialize = "progression.target_set")]
    #[serde(rename = "progression.target_set")]
    TargetSet,

    #[strum(serialize = "progression.voting_started")]
    #[serde(rename = "progression.voting_started")]
    VotingStarted,

    #[strum(serialize = "progression.all_unlocked")]
    #[serde(rename = "progression.all_unlocked")]
    AllUnlocked,

    #[strum(serialize = "progression.tree_reset")]
    #[serde(rename = "progression.tree_reset")]
    TreeReset,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressionEvent {
    /// A node reached `level`.
    NodeUnlocked { node_key: String, level: u32 },

    /// `level` (and everything above it) was removed from a node.
    NodeRelocked { node_key: String, level: u32 },

    /// The contribution ledger now targets `node_key` at `target_level`.
    TargetSet {
        node_key: String,
        target_level: u32,
        /// True when the target was chosen without a vote.
        auto_selected: bool,
        session_id: SessionId,
    },

    /// A voting session opened.
    VotingStarted {
        session_id: SessionId,
        options: Vec<String>,
        /// Node whose unlock triggered this session, if any.
        previous_unlock: Option<String>,
    },

    /// No candidates remain.
    AllUnlocked { message: String },

    /// Votes, progress, and non-automatic unlocks were wiped.
    TreeReset {
        reset_by: String,
        reason: String,
        nodes_reset: usize,
    },
}

impl ProgressionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProgressionEvent::NodeUnlocked { .. } => EventKind::NodeUnlocked,
            ProgressionEvent::NodeRelocked { .. } => EventKind::NodeRelocked,
            ProgressionEvent::TargetSet { .. } => EventKind::TargetSet,
            ProgressionEvent::VotingStarted { .. } => EventKind::VotingStarted,
            ProgressionEvent::AllUnlocked { .. } => EventKind::AllUnlocked,
            ProgressionEvent::TreeReset { .. } => EventKind::TreeReset,
        }
    }

    /// Payload as an unordered key/value map.
    ///
    /// Consumers should read the keys they need and ignore the rest.
    pub fn payload(&self) -> Map<String, Value> {
        let value = match self {
            ProgressionEvent::NodeUnlocked { node_key, level }
            | ProgressionEvent::NodeRelocked { node_key, level } => json!({
                "node_key": node_key,
                "level": level,
            }),
            ProgressionEvent::TargetSet {
                node_key,
                target_level,
                auto_selected,
                session_id,
            } => json!({
                "node_key": node_key,
                "target_level": target_level,
                "auto_selected": auto_selected,
                "session_id": session_id.get(),
            }),
            ProgressionEvent::VotingStarted {
                session_id,
                options,
                previous_unlock,
            } => json!({
                "session_id": session_id.get(),
                "options": options,
                "previous_unlock": previous_unlock,
            }),
            ProgressionEvent::AllUnlocked { message } => json!({ "message": message }),
            ProgressionEvent::TreeReset {
                reset_by,
                reason,
                nodes_reset,
            } => json!({
                "reset_by": reset_by,
                "reason": reason,
                "nodes_reset": nodes_reset,
            }),
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
