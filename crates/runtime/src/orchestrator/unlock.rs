//! Contribution accounting and unlock transitions.

use progression_core::{ProgressionUnlock, SessionId, UnlockProgress};
use tracing::{debug, error, info, trace};

use super::ProgressionOrchestrator;
use crate::api::{Result, RuntimeError, StorageContext};
use crate::events::ProgressionEvent;
use crate::repository::RepositoryError;

impl ProgressionOrchestrator {
    /// Adds `amount` to the active progress and returns the new total.
    ///
    /// The unlock itself happens on the worker; see
    /// [`Self::flush_unlock_checks`].
    pub async fn add_contribution(&self, amount: u64) -> Result<u64> {
        let total = {
            let _guard = self.shared.transitions.lock().await;
            let progress = self.ensure_progress().await?;
            self.shared
                .repo
                .add_contribution(progress.id, amount)
                .await
                .op("add_contribution")?
        };

        trace!(amount, total, "contribution added");
        self.schedule_unlock_check();
        Ok(total)
    }

    /// Unlocks the target if enough has been contributed, then starts the
    /// next cycle.
    pub async fn check_and_unlock_node(&self) -> Result<Option<ProgressionUnlock>> {
        let _guard = self.shared.transitions.lock().await;
        self.check_and_unlock_locked().await
    }

    /// Queues an unlock check on the worker. Returns false after shutdown.
    pub fn schedule_unlock_check(&self) -> bool {
        self.shared.scheduler.schedule()
    }

    /// Waits until every scheduled unlock check, including checks scheduled
    /// by those checks, has finished.
    pub async fn flush_unlock_checks(&self) {
        self.shared.scheduler.flush().await;
    }

    async fn check_and_unlock_locked(&self) -> Result<Option<ProgressionUnlock>> {
        let repo = &self.shared.repo;

        let Some(progress) = repo.active_progress().await.op("active_progress")? else {
            repo.create_progress(0).await.op("create_progress")?;
            return Ok(None);
        };
        let Some((node_id, target_level)) = progress.target() else {
            return Ok(None);
        };

        let node = repo
            .node_by_id(node_id)
            .await
            .op("node_by_id")?
            .ok_or(RuntimeError::Storage {
                op: "node_by_id",
                source: RepositoryError::NodeNotFound(node_id),
            })?;

        let accumulated = progress.contributions_accumulated;
        if let Some(existing) = repo.unlock(node_id).await.op("unlock")?
            && existing.current_level >= target_level
        {
            self.retire_reached_target(&progress, &node.key, target_level).await?;
            return Ok(None);
        }

        if accumulated < node.unlock_cost {
            trace!(node_key = %node.key, accumulated, cost = node.unlock_cost, "target not yet funded");
            return Ok(None);
        }

        let unlock = repo
            .unlock_node(node_id, target_level, "vote", accumulated)
            .await
            .op("unlock_node")?;

        self.end_owning_session(&progress, &node.key).await?;

        let rollover = self.shared.config.cap_rollover(accumulated - node.unlock_cost);
        repo.complete_progress(progress.id, rollover)
            .await
            .op("complete_progress")?;

        info!(
            node_key = %node.key,
            level = target_level,
            cost = node.unlock_cost,
            rollover,
            "node unlocked"
        );
        self.publish(ProgressionEvent::NodeUnlocked {
            node_key: node.key.clone(),
            level: target_level,
        });

        if let Err(err) = self.start_next_cycle(&node.key, progress.voting_session_id).await {
            error!(error = %err, "failed to start next progression cycle");
        }

        Ok(Some(unlock))
    }

    /// Drops a target that was raised to its level some other way (usually
    /// an admin unlock). Everything accumulated carries over and no unlock
    /// event is published.
    async fn retire_reached_target(
        &self,
        progress: &UnlockProgress,
        node_key: &str,
        target_level: u32,
    ) -> Result<()> {
        self.end_owning_session(progress, node_key).await?;
        self.shared
            .repo
            .complete_progress(progress.id, progress.contributions_accumulated)
            .await
            .op("complete_progress")?;

        info!(
            node_key,
            level = target_level,
            carried = progress.contributions_accumulated,
            "target level already reached, retargeting without charge"
        );

        if let Err(err) = self.start_next_cycle(node_key, progress.voting_session_id).await {
            error!(error = %err, "failed to start next progression cycle");
        }
        Ok(())
    }

    /// Ends the session that chose the progress target if it is still open,
    /// recording the target as its winner.
    async fn end_owning_session(&self, progress: &UnlockProgress, node_key: &str) -> Result<()> {
        let repo = &self.shared.repo;
        if let Some(session_id) = progress.voting_session_id
            && let Some(session) = repo.session_by_id(session_id).await.op("session_by_id")?
            && session.is_voting()
        {
            let winner = session.option_for_node(node_key).map(|option| option.id);
            repo.end_session(session_id, winner).await.op("end_session")?;
        }
        Ok(())
    }

    /// Picks the next target after an unlock.
    ///
    /// A winner left queued on an ended session takes priority; otherwise a
    /// new session opens (or the only candidate is auto-selected).
    pub(super) async fn start_next_cycle(&self, unlocked_key: &str, completed_session: Option<SessionId>) -> Result<()> {
        let repo = &self.shared.repo;

        if let Some(active) = repo.active_session().await.op("active_session")? {
            debug!(session_id = %active.id, "voting session already open");
            return Ok(());
        }

        if let Some(latest) = repo.latest_session().await.op("latest_session")?
            && !latest.is_voting()
            && completed_session != Some(latest.id)
            && let Some(winner) = latest.winner().cloned()
        {
            let still_available = self
                .candidate_set()
                .await?
                .candidates
                .iter()
                .any(|candidate| candidate.node.id == winner.node_id && candidate.target_level == winner.target_level);

            if still_available {
                let progress = self.ensure_progress().await?;
                repo.set_progress_target(progress.id, winner.node_id, winner.target_level, latest.id)
                    .await
                    .op("set_progress_target")?;

                info!(node_key = %winner.node_key, session_id = %latest.id, "applied queued voting winner");
                self.publish(ProgressionEvent::TargetSet {
                    node_key: winner.node_key,
                    target_level: winner.target_level,
                    auto_selected: false,
                    session_id: latest.id,
                });
                self.schedule_unlock_check();
                return Ok(());
            }
        }

        match self.start_voting_locked(&[], Some(unlocked_key)).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::NoNodesAvailable) => {
                self.publish_all_unlocked();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub(super) fn publish_all_unlocked(&self) {
        info!("all progression nodes unlocked");
        self.publish(ProgressionEvent::AllUnlocked {
            message: "All progression nodes have been unlocked".to_owned(),
        });
    }
}
