//! Operator-facing transitions: forced unlocks, resets, startup
//! reconciliation, and tree synchronization.

use progression_content::TreeDefinition;
use progression_core::{ProgressionNode, ProgressionReset, ProgressionUnlock, select_winner};
use tracing::{debug, error, info, warn};

use super::ProgressionOrchestrator;
use crate::api::{Result, RuntimeError, StorageContext};
use crate::events::ProgressionEvent;
use crate::repository::{AUTO_UNLOCKED_BY, NodeUpsert};

/// Outcome of [`ProgressionOrchestrator::sync_tree`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Keys unlocked because the tree flags them `auto_unlock`.
    pub auto_unlocked: Vec<String>,
}

impl ProgressionOrchestrator {
    /// Raises `node_key` to `level` without a vote.
    pub async fn admin_unlock(&self, node_key: &str, level: u32) -> Result<ProgressionUnlock> {
        let _guard = self.shared.transitions.lock().await;
        let node = self.node_for_admin(node_key).await?;
        self.admin_unlock_locked(&node, level).await
    }

    /// Removes `level` and everything above it from `node_key`.
    pub async fn admin_relock(&self, node_key: &str, level: u32) -> Result<()> {
        let _guard = self.shared.transitions.lock().await;
        let node = self.node_for_admin(node_key).await?;

        self.shared
            .repo
            .relock_node(node.id, level)
            .await
            .op("relock_node")?;

        info!(node_key, level, "admin relocked node");
        self.publish(ProgressionEvent::NodeRelocked {
            node_key: node.key,
            level,
        });
        Ok(())
    }

    /// Unlocks every node at its max level. Returns how many succeeded;
    /// individual failures are logged and skipped.
    pub async fn admin_unlock_all(&self) -> Result<usize> {
        let _guard = self.shared.transitions.lock().await;
        let nodes = self.shared.repo.all_nodes().await.op("all_nodes")?;
        if nodes.is_empty() {
            return Err(RuntimeError::NoNodesAvailable);
        }

        let mut unlocked = 0;
        for node in &nodes {
            match self.admin_unlock_locked(node, node.max_level).await {
                Ok(_) => unlocked += 1,
                Err(err) => warn!(node_key = %node.key, error = %err, "failed to unlock node"),
            }
        }

        info!(total = nodes.len(), unlocked, "admin unlocked all nodes");
        Ok(unlocked)
    }

    /// Ends the active session and unlocks its current leader at once.
    ///
    /// The leader is chosen the way [`Self::end_voting`] chooses a winner. No
    /// cost is charged: the ledger carries everything accumulated into the
    /// next cycle, which starts immediately.
    pub async fn force_instant_unlock(&self) -> Result<ProgressionUnlock> {
        let _guard = self.shared.transitions.lock().await;
        let repo = &self.shared.repo;

        let session = repo
            .active_session()
            .await
            .op("active_session")?
            .ok_or(RuntimeError::NoActiveSession)?;
        let winner = {
            let mut rng = rand::thread_rng();
            select_winner(&session.options, &mut rng).cloned()
        }
        .ok_or(RuntimeError::NoActiveSession)?;

        let progress = self.ensure_progress().await?;
        repo.set_progress_target(progress.id, winner.node_id, winner.target_level, session.id)
            .await
            .op("set_progress_target")?;
        repo.end_session(session.id, Some(winner.id))
            .await
            .op("end_session")?;

        let accumulated = progress.contributions_accumulated;
        let unlock = repo
            .unlock_node(winner.node_id, winner.target_level, "instant_override", accumulated)
            .await
            .op("unlock_node")?;
        repo.complete_progress(progress.id, accumulated)
            .await
            .op("complete_progress")?;

        info!(
            node_key = %winner.node_key,
            level = winner.target_level,
            session_id = %session.id,
            vote_count = winner.vote_count,
            carried = accumulated,
            "forced instant unlock"
        );
        self.publish(ProgressionEvent::NodeUnlocked {
            node_key: winner.node_key.clone(),
            level: winner.target_level,
        });

        if let Err(err) = self.start_next_cycle(&winner.node_key, Some(session.id)).await {
            error!(error = %err, "failed to start next progression cycle");
        }
        Ok(unlock)
    }

    /// Wipes votes, sessions, the ledger, and every unlock the tree did not
    /// make itself, then opens a fresh voting session.
    ///
    /// Engagement scores and history survive only with `preserve_user_data`.
    pub async fn reset_progression_tree(
        &self,
        reset_by: &str,
        reason: &str,
        preserve_user_data: bool,
    ) -> Result<ProgressionReset> {
        let _guard = self.shared.transitions.lock().await;

        let reset = self
            .shared
            .repo
            .reset_tree(reset_by, reason, preserve_user_data)
            .await
            .op("reset_tree")?;

        warn!(
            reset_by,
            reason,
            preserve_user_data,
            nodes_reset = reset.nodes_reset,
            engagement_score = reset.engagement_score_at_reset,
            "progression tree reset"
        );
        self.publish(ProgressionEvent::TreeReset {
            reset_by: reset.reset_by.clone(),
            reason: reset.reason.clone(),
            nodes_reset: reset.nodes_reset,
        });

        match self.start_voting_locked(&[], None).await {
            Ok(_) => {}
            Err(RuntimeError::NoNodesAvailable) => self.publish_all_unlocked(),
            Err(err) => error!(error = %err, "failed to start voting after reset"),
        }
        Ok(reset)
    }

    /// Past resets, oldest first.
    pub async fn reset_history(&self) -> Result<Vec<ProgressionReset>> {
        self.shared
            .repo
            .reset_history()
            .await
            .op("reset_history")
    }

    /// Reconciles state at startup.
    ///
    /// A funded target gets an unlock check; with no target and no open
    /// session, a new voting session starts.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.shared.transitions.lock().await;

        let progress = self.ensure_progress().await?;
        if let Some((node_id, level)) = progress.target() {
            debug!(%node_id, level, "resuming existing unlock target");
            self.schedule_unlock_check();
            return Ok(());
        }

        if let Some(session) = self.shared.repo.active_session().await.op("active_session")? {
            debug!(session_id = %session.id, "resuming open voting session");
            return Ok(());
        }

        match self.start_voting_locked(&[], None).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::NoNodesAvailable) => {
                self.publish_all_unlocked();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Writes a validated tree into the repository.
    ///
    /// Existing nodes are matched by key and keep their ids. Nodes flagged
    /// `auto_unlock` are raised to level 1.
    pub async fn sync_tree(&self, tree: &TreeDefinition) -> Result<SyncReport> {
        let nodes = tree.into_nodes()?;

        let _guard = self.shared.transitions.lock().await;
        let repo = &self.shared.repo;
        let mut report = SyncReport::default();

        for node in nodes {
            match repo.upsert_node(node).await.op("upsert_node")? {
                NodeUpsert::Inserted(_) => report.inserted += 1,
                NodeUpsert::Updated(_) => report.updated += 1,
                NodeUpsert::Unchanged(_) => report.unchanged += 1,
            }
        }

        for key in tree.auto_unlock_keys() {
            let Some(node) = repo.node_by_key(&key).await.op("node_by_key")? else {
                continue;
            };
            if repo.is_node_unlocked(&key, 1).await.op("is_node_unlocked")? {
                continue;
            }
            repo.unlock_node(node.id, 1, AUTO_UNLOCKED_BY, 0)
                .await
                .op("unlock_node")?;
            self.publish(ProgressionEvent::NodeUnlocked {
                node_key: key.clone(),
                level: 1,
            });
            report.auto_unlocked.push(key);
        }

        info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            auto_unlocked = report.auto_unlocked.len(),
            "progression tree synced"
        );
        Ok(report)
    }

    async fn node_for_admin(&self, node_key: &str) -> Result<ProgressionNode> {
        self.shared
            .repo
            .node_by_key(node_key)
            .await
            .op("node_by_key")?
            .ok_or_else(|| RuntimeError::NodeNotFound(node_key.to_owned()))
    }

    async fn admin_unlock_locked(&self, node: &ProgressionNode, level: u32) -> Result<ProgressionUnlock> {
        if level > node.max_level {
            return Err(RuntimeError::MaxLevelExceeded {
                node_key: node.key.clone(),
                level,
                max_level: node.max_level,
            });
        }

        let repo = &self.shared.repo;
        let engagement_score = match repo.active_progress().await {
            Ok(progress) => progress.map_or(0, |progress| progress.contributions_accumulated),
            Err(err) => {
                warn!(error = %err, "failed to read progress for admin unlock");
                0
            }
        };

        let unlock = repo
            .unlock_node(node.id, level, "admin", engagement_score)
            .await
            .op("unlock_node")?;

        info!(node_key = %node.key, level, "admin unlocked node");
        self.publish(ProgressionEvent::NodeUnlocked {
            node_key: node.key.clone(),
            level,
        });
        Ok(unlock)
    }
}
