mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{feature, rate_upgrade};
use progression_core::{
    NodeId, OptionId, ProgressId, ProgressionNode, ProgressionReset, ProgressionUnlock, SessionId,
    UnlockProgress, UserEngagement, UserId, VotingOption, VotingSession,
};
use progression_runtime::repository::Result;
use progression_runtime::{
    InMemoryProgressionRepository, NewVotingOption, NodeUpsert, ProgressionOrchestrator,
    ProgressionRepository,
};
use tokio::sync::oneshot;

/// Holds one read open after the inner store has answered.
struct Pause {
    op: &'static str,
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Delegates to an in-memory store, optionally parking a single read of
/// `is_node_unlocked` or `nodes_by_feature_key` between the store answering
/// and the caller seeing the answer.
struct GatedRepository {
    inner: InMemoryProgressionRepository,
    pause: Mutex<Option<Pause>>,
}

/// Test side of a [`Pause`].
struct PauseHandle {
    reached: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl GatedRepository {
    fn new(nodes: impl IntoIterator<Item = ProgressionNode>) -> Self {
        Self {
            inner: InMemoryProgressionRepository::with_nodes(nodes),
            pause: Mutex::new(None),
        }
    }

    fn pause_next(&self, op: &'static str) -> PauseHandle {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.pause.lock().unwrap() = Some(Pause {
            op,
            reached: reached_tx,
            release: release_rx,
        });
        PauseHandle {
            reached: reached_rx,
            release: release_tx,
        }
    }

    async fn hold(&self, op: &'static str) {
        let pause = {
            let mut slot = self.pause.lock().unwrap();
            match slot.take() {
                Some(pause) if pause.op == op => Some(pause),
                other => {
                    *slot = other;
                    None
                }
            }
        };
        if let Some(pause) = pause {
            let _ = pause.reached.send(());
            let _ = pause.release.await;
        }
    }
}

#[async_trait]
impl ProgressionRepository for GatedRepository {
    async fn node_by_id(&self, id: NodeId) -> Result<Option<ProgressionNode>> {
        self.inner.node_by_id(id).await
    }

    async fn node_by_key(&self, key: &str) -> Result<Option<ProgressionNode>> {
        self.inner.node_by_key(key).await
    }

    async fn nodes_by_ids(&self, ids: &[NodeId]) -> Result<Vec<ProgressionNode>> {
        self.inner.nodes_by_ids(ids).await
    }

    async fn all_nodes(&self) -> Result<Vec<ProgressionNode>> {
        self.inner.all_nodes().await
    }

    async fn nodes_by_feature_key(&self, feature_key: &str) -> Result<Vec<(ProgressionNode, u32)>> {
        let nodes = self.inner.nodes_by_feature_key(feature_key).await;
        self.hold("nodes_by_feature_key").await;
        nodes
    }

    async fn upsert_node(&self, node: ProgressionNode) -> Result<NodeUpsert> {
        self.inner.upsert_node(node).await
    }

    async fn unlock(&self, node_id: NodeId) -> Result<Option<ProgressionUnlock>> {
        self.inner.unlock(node_id).await
    }

    async fn all_unlocks(&self) -> Result<Vec<ProgressionUnlock>> {
        self.inner.all_unlocks().await
    }

    async fn is_node_unlocked(&self, key: &str, level: u32) -> Result<bool> {
        let unlocked = self.inner.is_node_unlocked(key, level).await;
        self.hold("is_node_unlocked").await;
        unlocked
    }

    async fn unlock_node(
        &self,
        node_id: NodeId,
        level: u32,
        unlocked_by: &str,
        engagement_score: u64,
    ) -> Result<ProgressionUnlock> {
        self.inner
            .unlock_node(node_id, level, unlocked_by, engagement_score)
            .await
    }

    async fn relock_node(&self, node_id: NodeId, level: u32) -> Result<()> {
        self.inner.relock_node(node_id, level).await
    }

    async fn active_session(&self) -> Result<Option<VotingSession>> {
        self.inner.active_session().await
    }

    async fn latest_session(&self) -> Result<Option<VotingSession>> {
        self.inner.latest_session().await
    }

    async fn session_by_id(&self, id: SessionId) -> Result<Option<VotingSession>> {
        self.inner.session_by_id(id).await
    }

    async fn create_session(&self, options: Vec<NewVotingOption>) -> Result<VotingSession> {
        self.inner.create_session(options).await
    }

    async fn end_session(&self, id: SessionId, winning_option: Option<OptionId>) -> Result<VotingSession> {
        self.inner.end_session(id, winning_option).await
    }

    async fn record_vote(
        &self,
        session_id: SessionId,
        option_id: OptionId,
        user_id: &UserId,
        cast_at: DateTime<Utc>,
    ) -> Result<VotingOption> {
        self.inner
            .record_vote(session_id, option_id, user_id, cast_at)
            .await
    }

    async fn has_user_voted(&self, session_id: SessionId, user_id: &UserId) -> Result<bool> {
        self.inner.has_user_voted(session_id, user_id).await
    }

    async fn session_voters(&self, session_id: SessionId) -> Result<Vec<UserId>> {
        self.inner.session_voters(session_id).await
    }

    async fn active_progress(&self) -> Result<Option<UnlockProgress>> {
        self.inner.active_progress().await
    }

    async fn create_progress(&self, initial_contributions: u64) -> Result<UnlockProgress> {
        self.inner.create_progress(initial_contributions).await
    }

    async fn set_progress_target(
        &self,
        progress_id: ProgressId,
        node_id: NodeId,
        target_level: u32,
        session_id: SessionId,
    ) -> Result<UnlockProgress> {
        self.inner
            .set_progress_target(progress_id, node_id, target_level, session_id)
            .await
    }

    async fn add_contribution(&self, progress_id: ProgressId, amount: u64) -> Result<u64> {
        self.inner.add_contribution(progress_id, amount).await
    }

    async fn complete_progress(&self, progress_id: ProgressId, rollover: u64) -> Result<UnlockProgress> {
        self.inner.complete_progress(progress_id, rollover).await
    }

    async fn add_engagement(&self, user_id: &UserId, amount: u64) -> Result<u64> {
        self.inner.add_engagement(user_id, amount).await
    }

    async fn daily_engagement_totals(&self, since: NaiveDate) -> Result<BTreeMap<NaiveDate, u64>> {
        self.inner.daily_engagement_totals(since).await
    }

    async fn engagement(&self, user_id: &UserId) -> Result<Option<UserEngagement>> {
        self.inner.engagement(user_id).await
    }

    async fn top_engagement(&self, limit: usize) -> Result<Vec<UserEngagement>> {
        self.inner.top_engagement(limit).await
    }

    async fn reset_tree(
        &self,
        reset_by: &str,
        reason: &str,
        preserve_user_data: bool,
    ) -> Result<ProgressionReset> {
        self.inner
            .reset_tree(reset_by, reason, preserve_user_data)
            .await
    }

    async fn reset_history(&self) -> Result<Vec<ProgressionReset>> {
        self.inner.reset_history().await
    }
}

fn orchestrator(repo: &Arc<GatedRepository>) -> ProgressionOrchestrator {
    ProgressionOrchestrator::builder()
        .repository(repo.clone())
        .build()
}

/// A lookup that read "locked" before an admin unlock landed must not leave
/// that answer in the cache.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unlock_during_lookup_is_not_cached_stale() {
    let repo = Arc::new(GatedRepository::new([feature(1, "feature_a")]));
    let orchestrator = orchestrator(&repo);

    let pause = repo.pause_next("is_node_unlocked");
    let lookup = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.is_node_unlocked("feature_a", 1).await }
    });
    pause.reached.await.expect("lookup reached the store");

    orchestrator.admin_unlock("feature_a", 1).await.expect("admin unlock");
    pause.release.send(()).expect("lookup still waiting");

    // The in-flight caller gets the answer it read.
    assert!(!lookup.await.unwrap().unwrap());
    assert!(orchestrator.unlock_cache().is_empty());
    assert!(orchestrator.is_node_unlocked("feature_a", 1).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn level_change_during_modifier_lookup_is_not_cached_stale() {
    let repo = Arc::new(GatedRepository::new([rate_upgrade(1, "rate_boost", 0.5)]));
    let orchestrator = orchestrator(&repo);
    orchestrator.admin_unlock("rate_boost", 1).await.expect("level 1");

    let pause = repo.pause_next("nodes_by_feature_key");
    let lookup = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.modified_value("progression_rate", 10.0).await }
    });
    pause.reached.await.expect("lookup reached the store");

    orchestrator.admin_unlock("rate_boost", 2).await.expect("level 2");
    pause.release.send(()).expect("lookup still waiting");

    assert_eq!(lookup.await.unwrap().unwrap(), 15.0);
    assert!(orchestrator.modifier_cache().get("progression_rate").is_none());
    assert_eq!(orchestrator.modified_value("progression_rate", 10.0).await.unwrap(), 20.0);
}
