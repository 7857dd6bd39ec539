//! Voting session lifecycle.

use progression_core::{SessionId, VotingOption, VotingSession, select_winner};
use tracing::{debug, info, warn};

use super::ProgressionOrchestrator;
use crate::api::{Result, RuntimeError, StorageContext};
use crate::events::ProgressionEvent;
use crate::repository::{NewVotingOption, RepositoryError};

/// Result of [`ProgressionOrchestrator::start_voting_session`].
#[derive(Clone, Debug, PartialEq)]
pub enum VotingOutcome {
    /// A session opened with one option per candidate.
    Opened(VotingSession),
    /// Only one candidate was available, so it became the target directly.
    ///
    /// The single-option session stays in voting status until the node
    /// unlocks.
    AutoSelected {
        session: VotingSession,
        node_key: String,
        target_level: u32,
    },
}

impl VotingOutcome {
    pub fn session(&self) -> &VotingSession {
        match self {
            VotingOutcome::Opened(session) | VotingOutcome::AutoSelected { session, .. } => session,
        }
    }

    pub fn is_auto_selected(&self) -> bool {
        matches!(self, VotingOutcome::AutoSelected { .. })
    }
}

impl ProgressionOrchestrator {
    /// Opens a voting session over the currently available nodes.
    ///
    /// Nodes named in `exclude` and the node already targeted by the active
    /// progress are left out.
    pub async fn start_voting_session(&self, exclude: &[&str]) -> Result<VotingOutcome> {
        let _guard = self.shared.transitions.lock().await;
        self.start_voting_locked(exclude, None).await
    }

    pub(super) async fn start_voting_locked(
        &self,
        exclude: &[&str],
        previous_unlock: Option<&str>,
    ) -> Result<VotingOutcome> {
        let repo = &self.shared.repo;

        if let Some(active) = repo.active_session().await.op("active_session")? {
            return Err(RuntimeError::SessionAlreadyActive {
                session_id: active.id.get(),
            });
        }

        let progress = self.ensure_progress().await?;
        let mut candidates = self.candidate_set().await?.candidates;
        candidates.retain(|candidate| {
            !exclude.contains(&candidate.node.key.as_str()) && progress.node_id != Some(candidate.node.id)
        });

        if candidates.is_empty() {
            debug!("no candidates for a new voting session");
            return Err(RuntimeError::NoNodesAvailable);
        }

        if candidates.len() == 1 && progress.target().is_none() {
            let candidate = candidates.remove(0);
            let session = repo
                .create_session(vec![NewVotingOption {
                    node_id: candidate.node.id,
                    node_key: candidate.node.key.clone(),
                    target_level: candidate.target_level,
                }])
                .await
                .op("create_session")?;
            repo.set_progress_target(progress.id, candidate.node.id, candidate.target_level, session.id)
                .await
                .op("set_progress_target")?;

            info!(
                node_key = %candidate.node.key,
                target_level = candidate.target_level,
                session_id = %session.id,
                "auto-selected only available node"
            );
            self.publish(ProgressionEvent::TargetSet {
                node_key: candidate.node.key.clone(),
                target_level: candidate.target_level,
                auto_selected: true,
                session_id: session.id,
            });
            self.publish(ProgressionEvent::VotingStarted {
                session_id: session.id,
                options: vec![candidate.node.key.clone()],
                previous_unlock: previous_unlock.map(str::to_owned),
            });
            self.schedule_unlock_check();

            return Ok(VotingOutcome::AutoSelected {
                session,
                node_key: candidate.node.key,
                target_level: candidate.target_level,
            });
        }

        let options: Vec<NewVotingOption> = candidates
            .into_iter()
            .take(self.shared.config.max_voting_options.max(1))
            .map(|candidate| NewVotingOption {
                node_id: candidate.node.id,
                node_key: candidate.node.key,
                target_level: candidate.target_level,
            })
            .collect();
        let session = repo.create_session(options).await.op("create_session")?;
        let option_keys: Vec<String> = session.options.iter().map(|option| option.node_key.clone()).collect();

        info!(session_id = %session.id, options = ?option_keys, "voting session started");
        self.publish(ProgressionEvent::VotingStarted {
            session_id: session.id,
            options: option_keys,
            previous_unlock: previous_unlock.map(str::to_owned),
        });

        Ok(VotingOutcome::Opened(session))
    }

    /// Casts one vote for `node_key` in the active session.
    ///
    /// Returns the option with its updated count.
    pub async fn vote_for_unlock(
        &self,
        platform: &str,
        platform_user_id: &str,
        node_key: &str,
    ) -> Result<VotingOption> {
        let user_id = self.shared.identity.resolve(platform, platform_user_id).await?;

        let _guard = self.shared.transitions.lock().await;
        let repo = &self.shared.repo;

        let session = repo
            .active_session()
            .await
            .op("active_session")?
            .ok_or(RuntimeError::NoActiveSession)?;
        let option = session
            .option_for_node(node_key)
            .ok_or_else(|| RuntimeError::NotInOptions {
                node_key: node_key.to_owned(),
            })?;

        if repo.has_user_voted(session.id, &user_id).await.op("has_user_voted")? {
            return Err(RuntimeError::AlreadyVoted {
                user_id: user_id.to_string(),
            });
        }

        let updated = match repo
            .record_vote(session.id, option.id, &user_id, self.shared.clock.now())
            .await
        {
            Ok(updated) => updated,
            Err(RepositoryError::DuplicateVote { user_id, .. }) => {
                return Err(RuntimeError::AlreadyVoted {
                    user_id: user_id.to_string(),
                });
            }
            Err(source) => {
                return Err(RuntimeError::Storage {
                    op: "record_vote",
                    source,
                });
            }
        };

        let weight = self.shared.config.vote_weight;
        if weight > 0
            && let Err(err) = repo.add_engagement(&user_id, weight).await
        {
            warn!(%user_id, error = %err, "failed to record vote engagement");
        }

        info!(
            %user_id,
            platform,
            node_key,
            session_id = %session.id,
            vote_count = updated.vote_count,
            "vote recorded"
        );
        Ok(updated)
    }

    /// Closes the active session and returns its winner.
    ///
    /// When the progress has no target the winner becomes the target right
    /// away. Otherwise the winner stays recorded on the ended session and is
    /// picked up after the current target unlocks.
    pub async fn end_voting(&self) -> Result<VotingOption> {
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
        .ok_or(RuntimeError::NoNodesAvailable)?;

        let progress = self.ensure_progress().await?;
        let retarget = progress.target().is_none();

        // The target must reference the session before it is ended.
        if retarget {
            repo.set_progress_target(progress.id, winner.node_id, winner.target_level, session.id)
                .await
                .op("set_progress_target")?;
        }
        repo.end_session(session.id, Some(winner.id))
            .await
            .op("end_session")?;
        self.award_participation(session.id).await;

        info!(
            session_id = %session.id,
            node_key = %winner.node_key,
            vote_count = winner.vote_count,
            total_votes = session.total_votes(),
            queued = !retarget,
            "voting ended"
        );

        if retarget {
            self.publish(ProgressionEvent::TargetSet {
                node_key: winner.node_key.clone(),
                target_level: winner.target_level,
                auto_selected: false,
                session_id: session.id,
            });
            self.schedule_unlock_check();
        }

        Ok(winner)
    }

    async fn award_participation(&self, session_id: SessionId) {
        let weight = self.shared.config.participation_weight;
        if weight == 0 {
            return;
        }

        let repo = &self.shared.repo;
        let voters = match repo.session_voters(session_id).await {
            Ok(voters) => voters,
            Err(err) => {
                warn!(%session_id, error = %err, "failed to load session voters");
                return;
            }
        };
        for user_id in voters {
            if let Err(err) = repo.add_engagement(&user_id, weight).await {
                warn!(%user_id, error = %err, "failed to award participation");
            }
        }
    }
}
