//! Repository contract for progression state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use progression_core::{
    NodeId, OptionId, ProgressId, ProgressionNode, ProgressionReset, ProgressionUnlock, SessionId,
    UnlockProgress, UserEngagement, UserId, VotingOption, VotingSession,
};

use super::error::Result;

/// `unlocked_by` for nodes the tree itself unlocks. Tree resets keep these.
pub const AUTO_UNLOCKED_BY: &str = "auto";

/// Option to create alongside a new voting session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVotingOption {
    pub node_id: NodeId,
    pub node_key: String,
    pub target_level: u32,
}

/// Outcome of [`ProgressionRepository::upsert_node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeUpsert {
    Inserted(NodeId),
    Updated(NodeId),
    Unchanged(NodeId),
}

impl NodeUpsert {
    pub fn id(self) -> NodeId {
        match self {
            NodeUpsert::Inserted(id) | NodeUpsert::Updated(id) | NodeUpsert::Unchanged(id) => id,
        }
    }
}

/// Durable store for nodes, unlocks, voting sessions, the contribution
/// ledger, and engagement totals.
///
/// Implementations must make each method atomic on its own. Callers serialize
/// multi-step transitions; the repository only guarantees that a single call
/// never leaves partial state behind.
#[async_trait]
pub trait ProgressionRepository: Send + Sync {
    // Nodes

    async fn node_by_id(&self, id: NodeId) -> Result<Option<ProgressionNode>>;

    async fn node_by_key(&self, key: &str) -> Result<Option<ProgressionNode>>;

    /// Nodes for the given ids, in the order requested. Unknown ids are skipped.
    async fn nodes_by_ids(&self, ids: &[NodeId]) -> Result<Vec<ProgressionNode>>;

    async fn all_nodes(&self) -> Result<Vec<ProgressionNode>>;

    /// Every node whose modifier targets `feature_key`, paired with its
    /// current unlock level (0 when locked), in a stable order.
    async fn nodes_by_feature_key(&self, feature_key: &str)
    -> Result<Vec<(ProgressionNode, u32)>>;

    /// Inserts a node, or updates the node with the same key. The stored id of
    /// an existing node is kept.
    async fn upsert_node(&self, node: ProgressionNode) -> Result<NodeUpsert>;

    // Unlocks

    async fn unlock(&self, node_id: NodeId) -> Result<Option<ProgressionUnlock>>;

    async fn all_unlocks(&self) -> Result<Vec<ProgressionUnlock>>;

    /// True when the node with `key` is unlocked at `level` or higher.
    async fn is_node_unlocked(&self, key: &str, level: u32) -> Result<bool>;

    /// Raises the node's level to `level`. Never lowers an existing level.
    async fn unlock_node(
        &self,
        node_id: NodeId,
        level: u32,
        unlocked_by: &str,
        engagement_score: u64,
    ) -> Result<ProgressionUnlock>;

    /// Removes `level` and everything above it. Relocking level 1 removes the
    /// unlock record.
    async fn relock_node(&self, node_id: NodeId, level: u32) -> Result<()>;

    // Voting sessions

    /// The session currently in `voting` status, if any.
    async fn active_session(&self) -> Result<Option<VotingSession>>;

    /// The most recently created session regardless of status.
    async fn latest_session(&self) -> Result<Option<VotingSession>>;

    async fn session_by_id(&self, id: SessionId) -> Result<Option<VotingSession>>;

    /// Creates a session in `voting` status with the given options.
    async fn create_session(&self, options: Vec<NewVotingOption>) -> Result<VotingSession>;

    async fn end_session(
        &self,
        id: SessionId,
        winning_option: Option<OptionId>,
    ) -> Result<VotingSession>;

    /// Records one vote and bumps the option's count in a single step.
    ///
    /// Fails with `DuplicateVote` when the user already voted in the session.
    async fn record_vote(
        &self,
        session_id: SessionId,
        option_id: OptionId,
        user_id: &UserId,
        cast_at: DateTime<Utc>,
    ) -> Result<VotingOption>;

    async fn has_user_voted(&self, session_id: SessionId, user_id: &UserId) -> Result<bool>;

    async fn session_voters(&self, session_id: SessionId) -> Result<Vec<UserId>>;

    // Contribution ledger

    async fn active_progress(&self) -> Result<Option<UnlockProgress>>;

    async fn create_progress(&self, initial_contributions: u64) -> Result<UnlockProgress>;

    /// Points the progress at a node and level. `session_id` must reference an
    /// existing session.
    async fn set_progress_target(
        &self,
        progress_id: ProgressId,
        node_id: NodeId,
        target_level: u32,
        session_id: SessionId,
    ) -> Result<UnlockProgress>;

    /// Adds to the accumulated total and returns the new total.
    async fn add_contribution(&self, progress_id: ProgressId, amount: u64) -> Result<u64>;

    /// Retires `progress_id` and creates its successor seeded with `rollover`.
    async fn complete_progress(
        &self,
        progress_id: ProgressId,
        rollover: u64,
    ) -> Result<UnlockProgress>;

    // Engagement

    /// Adds to a user's engagement score and returns the new score. The
    /// amount also counts toward today's (UTC) daily total.
    async fn add_engagement(&self, user_id: &UserId, amount: u64) -> Result<u64>;

    /// Engagement summed per UTC day, for days on or after `since`.
    async fn daily_engagement_totals(&self, since: NaiveDate) -> Result<BTreeMap<NaiveDate, u64>>;

    async fn engagement(&self, user_id: &UserId) -> Result<Option<UserEngagement>>;

    /// Highest scores first.
    async fn top_engagement(&self, limit: usize) -> Result<Vec<UserEngagement>>;

    // Resets

    /// Clears votes, sessions, the contribution ledger, and every unlock not
    /// made by [`AUTO_UNLOCKED_BY`], then records the reset. Engagement is
    /// cleared too unless `preserve_user_data` is set. Nodes are kept.
    async fn reset_tree(
        &self,
        reset_by: &str,
        reason: &str,
        preserve_user_data: bool,
    ) -> Result<ProgressionReset>;

    /// Recorded resets, oldest first.
    async fn reset_history(&self) -> Result<Vec<ProgressionReset>>;
}
