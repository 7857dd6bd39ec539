//! In-memory ProgressionRepository implementation for tests and local runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use progression_core::{
    NodeId, OptionId, ProgressId, ProgressionNode, ProgressionReset, ProgressionUnlock, SessionId,
    SessionStatus, UnlockProgress, UserEngagement, UserId, Vote, VotingOption, VotingSession,
};

use crate::repository::{
    AUTO_UNLOCKED_BY, NewVotingOption, NodeUpsert, ProgressionRepository, RepositoryError, Result,
};

#[derive(Default)]
struct Store {
    nodes: BTreeMap<NodeId, ProgressionNode>,
    unlocks: HashMap<NodeId, ProgressionUnlock>,
    sessions: BTreeMap<SessionId, VotingSession>,
    votes: HashMap<(SessionId, UserId), Vote>,
    progress: BTreeMap<ProgressId, UnlockProgress>,
    engagement: HashMap<UserId, u64>,
    daily_engagement: BTreeMap<NaiveDate, u64>,
    resets: Vec<ProgressionReset>,
    next_session: u64,
    next_option: u64,
    next_progress: u64,
}

impl Store {
    fn node_by_key(&self, key: &str) -> Option<&ProgressionNode> {
        self.nodes.values().find(|node| node.key == key)
    }

    fn level(&self, node_id: NodeId) -> u32 {
        self.unlocks
            .get(&node_id)
            .map_or(0, |unlock| unlock.current_level)
    }

    fn active_progress_mut(&mut self, id: ProgressId) -> Result<&mut UnlockProgress> {
        self.progress
            .get_mut(&id)
            .filter(|progress| progress.is_active())
            .ok_or(RepositoryError::ProgressNotFound(id))
    }

    fn insert_progress(&mut self, initial_contributions: u64) -> UnlockProgress {
        self.next_progress += 1;
        let progress = UnlockProgress::new(
            ProgressId(self.next_progress),
            initial_contributions,
            Utc::now(),
        );
        self.progress.insert(progress.id, progress.clone());
        progress
    }
}

/// In-memory implementation of [`ProgressionRepository`].
///
/// All tables live behind one lock, so every method is atomic. The store can
/// be taken offline to exercise error paths in callers.
pub struct InMemoryProgressionRepository {
    store: RwLock<Store>,
    offline: AtomicBool,
}

impl InMemoryProgressionRepository {
    /// Create a new empty in-memory repository.
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
            offline: AtomicBool::new(false),
        }
    }

    /// Create with a set of nodes, keeping their ids.
    pub fn with_nodes(nodes: impl IntoIterator<Item = ProgressionNode>) -> Self {
        let repo = Self::new();
        if let Ok(mut store) = repo.store.write() {
            for node in nodes {
                store.nodes.insert(node.id, node);
            }
        }
        repo
    }

    /// Adds `amount` to the daily engagement total for `day` without
    /// touching any user's score. Used to load history.
    pub fn seed_daily_engagement(&self, day: NaiveDate, amount: u64) -> Result<()> {
        let mut store = self.write()?;
        let total = store.daily_engagement.entry(day).or_insert(0);
        *total = total.saturating_add(amount);
        Ok(())
    }

    /// While offline, every call fails with [`RepositoryError::Backend`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("store is offline".into()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.check_online()?;
        self.store.read().map_err(|_| RepositoryError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Store>> {
        self.check_online()?;
        self.store.write().map_err(|_| RepositoryError::LockPoisoned)
    }
}

impl Default for InMemoryProgressionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressionRepository for InMemoryProgressionRepository {
    async fn node_by_id(&self, id: NodeId) -> Result<Option<ProgressionNode>> {
        Ok(self.read()?.nodes.get(&id).cloned())
    }

    async fn node_by_key(&self, key: &str) -> Result<Option<ProgressionNode>> {
        Ok(self.read()?.node_by_key(key).cloned())
    }

    async fn nodes_by_ids(&self, ids: &[NodeId]) -> Result<Vec<ProgressionNode>> {
        let store = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| store.nodes.get(id).cloned())
            .collect())
    }

    async fn all_nodes(&self) -> Result<Vec<ProgressionNode>> {
        Ok(self.read()?.nodes.values().cloned().collect())
    }

    async fn nodes_by_feature_key(
        &self,
        feature_key: &str,
    ) -> Result<Vec<(ProgressionNode, u32)>> {
        let store = self.read()?;
        Ok(store
            .nodes
            .values()
            .filter(|node| {
                node.modifier
                    .as_ref()
                    .is_some_and(|modifier| modifier.feature_key == feature_key)
            })
            .map(|node| (node.clone(), store.level(node.id)))
            .collect())
    }

    async fn upsert_node(&self, node: ProgressionNode) -> Result<NodeUpsert> {
        let mut store = self.write()?;
        let mut node = node;

        if let Some(existing) = store.node_by_key(&node.key) {
            let id = existing.id;
            node.id = id;
            if *existing == node {
                return Ok(NodeUpsert::Unchanged(id));
            }
            store.nodes.insert(id, node);
            return Ok(NodeUpsert::Updated(id));
        }

        if node.id.get() == 0 || store.nodes.contains_key(&node.id) {
            let next = store.nodes.keys().next_back().map_or(1, |id| id.get() + 1);
            node.id = NodeId(next);
        }
        let id = node.id;
        store.nodes.insert(id, node);
        Ok(NodeUpsert::Inserted(id))
    }

    async fn unlock(&self, node_id: NodeId) -> Result<Option<ProgressionUnlock>> {
        Ok(self.read()?.unlocks.get(&node_id).cloned())
    }

    async fn all_unlocks(&self) -> Result<Vec<ProgressionUnlock>> {
        let store = self.read()?;
        let mut unlocks: Vec<ProgressionUnlock> = store.unlocks.values().cloned().collect();
        unlocks.sort_by_key(|unlock| unlock.node_id);
        Ok(unlocks)
    }

    async fn is_node_unlocked(&self, key: &str, level: u32) -> Result<bool> {
        let store = self.read()?;
        Ok(store
            .node_by_key(key)
            .is_some_and(|node| store.level(node.id) >= level.max(1)))
    }

    async fn unlock_node(
        &self,
        node_id: NodeId,
        level: u32,
        unlocked_by: &str,
        engagement_score: u64,
    ) -> Result<ProgressionUnlock> {
        let mut store = self.write()?;
        let node = store
            .nodes
            .get(&node_id)
            .ok_or(RepositoryError::NodeNotFound(node_id))?;
        if level == 0 || level > node.max_level {
            return Err(RepositoryError::InvalidLevel { node_id, level });
        }

        if let Some(existing) = store.unlocks.get(&node_id)
            && existing.current_level >= level
        {
            return Ok(existing.clone());
        }

        let unlock = ProgressionUnlock {
            node_id,
            current_level: level,
            unlocked_by: unlocked_by.to_owned(),
            unlocked_at: Utc::now(),
            engagement_score,
        };
        store.unlocks.insert(node_id, unlock.clone());
        Ok(unlock)
    }

    async fn relock_node(&self, node_id: NodeId, level: u32) -> Result<()> {
        let mut store = self.write()?;
        if !store.nodes.contains_key(&node_id) {
            return Err(RepositoryError::NodeNotFound(node_id));
        }
        if level == 0 {
            return Err(RepositoryError::InvalidLevel { node_id, level });
        }

        let remove = match store.unlocks.get_mut(&node_id) {
            Some(unlock) if unlock.current_level >= level => {
                unlock.current_level = level - 1;
                unlock.current_level == 0
            }
            _ => false,
        };
        if remove {
            store.unlocks.remove(&node_id);
        }
        Ok(())
    }

    async fn active_session(&self) -> Result<Option<VotingSession>> {
        Ok(self
            .read()?
            .sessions
            .values()
            .find(|session| session.is_voting())
            .cloned())
    }

    async fn latest_session(&self) -> Result<Option<VotingSession>> {
        Ok(self.read()?.sessions.values().next_back().cloned())
    }

    async fn session_by_id(&self, id: SessionId) -> Result<Option<VotingSession>> {
        Ok(self.read()?.sessions.get(&id).cloned())
    }

    async fn create_session(&self, options: Vec<NewVotingOption>) -> Result<VotingSession> {
        let mut store = self.write()?;
        for option in &options {
            if !store.nodes.contains_key(&option.node_id) {
                return Err(RepositoryError::NodeNotFound(option.node_id));
            }
        }

        store.next_session += 1;
        let session_id = SessionId(store.next_session);

        let mut voting_options = Vec::with_capacity(options.len());
        for option in options {
            store.next_option += 1;
            voting_options.push(VotingOption {
                id: OptionId(store.next_option),
                session_id,
                node_id: option.node_id,
                node_key: option.node_key,
                target_level: option.target_level,
                vote_count: 0,
                last_highest_vote_at: None,
            });
        }

        let session = VotingSession {
            id: session_id,
            status: SessionStatus::Voting,
            options: voting_options,
            created_at: Utc::now(),
            ended_at: None,
            winning_option: None,
        };
        store.sessions.insert(session_id, session.clone());
        Ok(session)
    }

    async fn end_session(
        &self,
        id: SessionId,
        winning_option: Option<OptionId>,
    ) -> Result<VotingSession> {
        let mut store = self.write()?;
        let session = store
            .sessions
            .get_mut(&id)
            .ok_or(RepositoryError::SessionNotFound(id))?;

        if let Some(option_id) = winning_option
            && session.option(option_id).is_none()
        {
            return Err(RepositoryError::OptionNotFound {
                session_id: id,
                option_id,
            });
        }

        session.status = SessionStatus::Ended;
        session.ended_at = Some(Utc::now());
        session.winning_option = winning_option;
        Ok(session.clone())
    }

    async fn record_vote(
        &self,
        session_id: SessionId,
        option_id: OptionId,
        user_id: &UserId,
        cast_at: DateTime<Utc>,
    ) -> Result<VotingOption> {
        let mut store = self.write()?;
        let key = (session_id, user_id.clone());
        if store.votes.contains_key(&key) {
            return Err(RepositoryError::DuplicateVote {
                session_id,
                user_id: user_id.clone(),
            });
        }

        let session = store
            .sessions
            .get_mut(&session_id)
            .ok_or(RepositoryError::SessionNotFound(session_id))?;
        if !session.is_voting() {
            return Err(RepositoryError::SessionNotVoting(session_id));
        }
        let option = session
            .register_vote(option_id, cast_at)
            .cloned()
            .ok_or(RepositoryError::OptionNotFound {
                session_id,
                option_id,
            })?;

        store.votes.insert(
            key,
            Vote {
                session_id,
                option_id,
                user_id: user_id.clone(),
                cast_at,
            },
        );
        Ok(option)
    }

    async fn has_user_voted(&self, session_id: SessionId, user_id: &UserId) -> Result<bool> {
        Ok(self
            .read()?
            .votes
            .contains_key(&(session_id, user_id.clone())))
    }

    async fn session_voters(&self, session_id: SessionId) -> Result<Vec<UserId>> {
        let store = self.read()?;
        let mut voters: Vec<&Vote> = store
            .votes
            .values()
            .filter(|vote| vote.session_id == session_id)
            .collect();
        voters.sort_by_key(|vote| vote.cast_at);

        let mut seen = HashSet::new();
        Ok(voters
            .into_iter()
            .filter(|vote| seen.insert(vote.user_id.clone()))
            .map(|vote| vote.user_id.clone())
            .collect())
    }

    async fn active_progress(&self) -> Result<Option<UnlockProgress>> {
        Ok(self
            .read()?
            .progress
            .values()
            .find(|progress| progress.is_active())
            .cloned())
    }

    async fn create_progress(&self, initial_contributions: u64) -> Result<UnlockProgress> {
        let mut store = self.write()?;
        if let Some(active) = store.progress.values().find(|progress| progress.is_active()) {
            return Err(RepositoryError::ProgressAlreadyActive(active.id));
        }
        Ok(store.insert_progress(initial_contributions))
    }

    async fn set_progress_target(
        &self,
        progress_id: ProgressId,
        node_id: NodeId,
        target_level: u32,
        session_id: SessionId,
    ) -> Result<UnlockProgress> {
        let mut store = self.write()?;
        if !store.sessions.contains_key(&session_id) {
            return Err(RepositoryError::ForeignKey(format!(
                "unlock progress {progress_id} references missing voting session {session_id}"
            )));
        }
        if !store.nodes.contains_key(&node_id) {
            return Err(RepositoryError::ForeignKey(format!(
                "unlock progress {progress_id} references missing node {node_id}"
            )));
        }

        let progress = store.active_progress_mut(progress_id)?;
        progress.node_id = Some(node_id);
        progress.target_level = Some(target_level);
        progress.voting_session_id = Some(session_id);
        Ok(progress.clone())
    }

    async fn add_contribution(&self, progress_id: ProgressId, amount: u64) -> Result<u64> {
        let mut store = self.write()?;
        let progress = store.active_progress_mut(progress_id)?;
        progress.contributions_accumulated = progress.contributions_accumulated.saturating_add(amount);
        Ok(progress.contributions_accumulated)
    }

    async fn complete_progress(
        &self,
        progress_id: ProgressId,
        rollover: u64,
    ) -> Result<UnlockProgress> {
        let mut store = self.write()?;
        let progress = store.active_progress_mut(progress_id)?;
        progress.completed_at = Some(Utc::now());
        Ok(store.insert_progress(rollover))
    }

    async fn add_engagement(&self, user_id: &UserId, amount: u64) -> Result<u64> {
        let mut store = self.write()?;
        let today = Utc::now().date_naive();
        let daily = store.daily_engagement.entry(today).or_insert(0);
        *daily = daily.saturating_add(amount);

        let score = store.engagement.entry(user_id.clone()).or_insert(0);
        *score = score.saturating_add(amount);
        Ok(*score)
    }

    async fn daily_engagement_totals(&self, since: NaiveDate) -> Result<BTreeMap<NaiveDate, u64>> {
        Ok(self
            .read()?
            .daily_engagement
            .range(since..)
            .map(|(day, total)| (*day, *total))
            .collect())
    }

    async fn engagement(&self, user_id: &UserId) -> Result<Option<UserEngagement>> {
        Ok(self
            .read()?
            .engagement
            .get(user_id)
            .map(|score| UserEngagement {
                user_id: user_id.clone(),
                score: *score,
            }))
    }

    async fn top_engagement(&self, limit: usize) -> Result<Vec<UserEngagement>> {
        let store = self.read()?;
        let mut entries: Vec<UserEngagement> = store
            .engagement
            .iter()
            .map(|(user_id, score)| UserEngagement {
                user_id: user_id.clone(),
                score: *score,
            })
            .collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.user_id.cmp(&b.user_id)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn reset_tree(
        &self,
        reset_by: &str,
        reason: &str,
        preserve_user_data: bool,
    ) -> Result<ProgressionReset> {
        let mut store = self.write()?;

        let before = store.unlocks.len();
        store
            .unlocks
            .retain(|_, unlock| unlock.unlocked_by == AUTO_UNLOCKED_BY);
        let reset = ProgressionReset {
            reset_by: reset_by.to_owned(),
            reason: reason.to_owned(),
            nodes_reset: before - store.unlocks.len(),
            engagement_score_at_reset: store.engagement.values().sum(),
            reset_at: Utc::now(),
        };

        store.votes.clear();
        store.progress.clear();
        store.sessions.clear();
        if !preserve_user_data {
            store.engagement.clear();
            store.daily_engagement.clear();
        }
        store.resets.push(reset.clone());
        Ok(reset)
    }

    async fn reset_history(&self) -> Result<Vec<ProgressionReset>> {
        Ok(self.read()?.resets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progression_core::{NodeSize, NodeType};

    fn node(id: u64, key: &str) -> ProgressionNode {
        ProgressionNode::new(NodeId(id), key, NodeType::Feature, 0, NodeSize::Small)
            .unwrap()
            .with_max_level(3)
    }

    fn option(node: &ProgressionNode) -> NewVotingOption {
        NewVotingOption {
            node_id: node.id,
            node_key: node.key.clone(),
            target_level: 1,
        }
    }

    #[tokio::test]
    async fn progress_target_requires_existing_session() {
        let a = node(1, "a");
        let repo = InMemoryProgressionRepository::with_nodes([a.clone()]);
        let progress = repo.create_progress(0).await.unwrap();

        let err = repo
            .set_progress_target(progress.id, a.id, 1, SessionId(99))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ForeignKey(_)));

        let session = repo.create_session(vec![option(&a)]).await.unwrap();
        let updated = repo
            .set_progress_target(progress.id, a.id, 1, session.id)
            .await
            .unwrap();
        assert_eq!(updated.voting_session_id, Some(session.id));
    }

    #[tokio::test]
    async fn duplicate_vote_is_rejected() {
        let a = node(1, "a");
        let repo = InMemoryProgressionRepository::with_nodes([a.clone()]);
        let session = repo.create_session(vec![option(&a)]).await.unwrap();
        let option_id = session.options[0].id;
        let user = UserId::new("twitch:alice");

        let counted = repo
            .record_vote(session.id, option_id, &user, Utc::now())
            .await
            .unwrap();
        assert_eq!(counted.vote_count, 1);

        let err = repo
            .record_vote(session.id, option_id, &user, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateVote { .. }));
        assert!(repo.has_user_voted(session.id, &user).await.unwrap());
        assert_eq!(repo.session_voters(session.id).await.unwrap(), vec![user]);
    }

    #[tokio::test]
    async fn ended_session_rejects_votes() {
        let a = node(1, "a");
        let repo = InMemoryProgressionRepository::with_nodes([a.clone()]);
        let session = repo.create_session(vec![option(&a)]).await.unwrap();
        repo.end_session(session.id, None).await.unwrap();

        let err = repo
            .record_vote(session.id, session.options[0].id, &UserId::new("u"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::SessionNotVoting(_)));
        assert!(repo.active_session().await.unwrap().is_none());
        assert_eq!(repo.latest_session().await.unwrap().unwrap().id, session.id);
    }

    #[tokio::test]
    async fn complete_progress_rolls_over() {
        let repo = InMemoryProgressionRepository::new();
        let first = repo.create_progress(0).await.unwrap();
        assert_eq!(repo.add_contribution(first.id, 120).await.unwrap(), 120);
        assert!(matches!(
            repo.create_progress(0).await,
            Err(RepositoryError::ProgressAlreadyActive(_))
        ));

        let next = repo.complete_progress(first.id, 20).await.unwrap();
        assert_ne!(next.id, first.id);
        assert_eq!(next.contributions_accumulated, 20);
        assert_eq!(repo.active_progress().await.unwrap().unwrap().id, next.id);
        assert!(matches!(
            repo.add_contribution(first.id, 1).await,
            Err(RepositoryError::ProgressNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unlock_levels_only_rise_until_relocked() {
        let a = node(1, "a");
        let repo = InMemoryProgressionRepository::with_nodes([a.clone()]);

        repo.unlock_node(a.id, 2, "vote", 0).await.unwrap();
        let unchanged = repo.unlock_node(a.id, 1, "admin", 0).await.unwrap();
        assert_eq!(unchanged.current_level, 2);
        assert!(repo.is_node_unlocked("a", 2).await.unwrap());
        assert!(!repo.is_node_unlocked("a", 3).await.unwrap());
        assert!(matches!(
            repo.unlock_node(a.id, 4, "admin", 0).await,
            Err(RepositoryError::InvalidLevel { .. })
        ));

        repo.relock_node(a.id, 2).await.unwrap();
        assert!(repo.is_node_unlocked("a", 1).await.unwrap());
        assert!(!repo.is_node_unlocked("a", 2).await.unwrap());

        repo.relock_node(a.id, 1).await.unwrap();
        assert!(repo.unlock(a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_keeps_existing_ids() {
        let repo = InMemoryProgressionRepository::with_nodes([node(1, "a")]);

        assert_eq!(repo.upsert_node(node(1, "a")).await.unwrap(), NodeUpsert::Unchanged(NodeId(1)));
        assert_eq!(
            repo.upsert_node(node(7, "a").with_description("changed")).await.unwrap(),
            NodeUpsert::Updated(NodeId(1))
        );
        assert_eq!(repo.upsert_node(node(1, "b")).await.unwrap(), NodeUpsert::Inserted(NodeId(2)));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let repo = InMemoryProgressionRepository::new();
        repo.set_offline(true);
        assert!(matches!(
            repo.all_nodes().await,
            Err(RepositoryError::Backend(_))
        ));
        repo.set_offline(false);
        assert!(repo.all_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn engagement_feeds_daily_totals() {
        let repo = InMemoryProgressionRepository::new();
        let today = Utc::now().date_naive();
        let week_ago = today - chrono::TimeDelta::days(7);
        let month_ago = today - chrono::TimeDelta::days(30);
        repo.seed_daily_engagement(week_ago, 40).unwrap();
        repo.seed_daily_engagement(month_ago, 900).unwrap();

        repo.add_engagement(&UserId::new("a"), 5).await.unwrap();
        repo.add_engagement(&UserId::new("b"), 3).await.unwrap();

        let totals = repo.daily_engagement_totals(week_ago).await.unwrap();
        assert_eq!(totals, BTreeMap::from([(week_ago, 40), (today, 8)]));
    }

    #[tokio::test]
    async fn reset_keeps_auto_unlocks_and_optionally_engagement() {
        let root = node(1, "root");
        let a = node(2, "a");
        let repo = InMemoryProgressionRepository::with_nodes([root.clone(), a.clone()]);
        repo.unlock_node(root.id, 1, AUTO_UNLOCKED_BY, 0).await.unwrap();
        repo.unlock_node(a.id, 2, "vote", 0).await.unwrap();
        let session = repo.create_session(vec![option(&a)]).await.unwrap();
        repo.record_vote(session.id, session.options[0].id, &UserId::new("u"), Utc::now())
            .await
            .unwrap();
        repo.create_progress(30).await.unwrap();
        repo.add_engagement(&UserId::new("u"), 12).await.unwrap();

        let reset = repo.reset_tree("admin", "season end", true).await.unwrap();
        assert_eq!(reset.nodes_reset, 1);
        assert_eq!(reset.engagement_score_at_reset, 12);

        assert!(repo.is_node_unlocked("root", 1).await.unwrap());
        assert!(!repo.is_node_unlocked("a", 1).await.unwrap());
        assert!(repo.latest_session().await.unwrap().is_none());
        assert!(repo.active_progress().await.unwrap().is_none());
        assert!(!repo.has_user_voted(session.id, &UserId::new("u")).await.unwrap());
        assert_eq!(repo.engagement(&UserId::new("u")).await.unwrap().unwrap().score, 12);
        assert_eq!(repo.all_nodes().await.unwrap().len(), 2);

        repo.reset_tree("admin", "wipe", false).await.unwrap();
        assert!(repo.engagement(&UserId::new("u")).await.unwrap().is_none());
        assert!(repo.daily_engagement_totals(NaiveDate::MIN).await.unwrap().is_empty());
        assert_eq!(repo.reset_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_score() {
        let repo = InMemoryProgressionRepository::new();
        repo.add_engagement(&UserId::new("a"), 5).await.unwrap();
        repo.add_engagement(&UserId::new("b"), 9).await.unwrap();
        repo.add_engagement(&UserId::new("a"), 2).await.unwrap();

        let top = repo.top_engagement(1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].user_id, UserId::new("b"));
        assert_eq!(
            repo.engagement(&UserId::new("a")).await.unwrap().unwrap().score,
            7
        );
    }
}
