//! Engagement scoring.

use chrono::{TimeDelta, Utc};
use progression_core::{DEFAULT_VELOCITY_DAYS, EngagementVelocity, UnlockEstimate, UserEngagement, UserId};
use tracing::{debug, warn};

use super::ProgressionOrchestrator;
use crate::api::{Result, RuntimeError, StorageContext};

/// Feature key whose modifiers scale engagement before it counts as a
/// contribution.
pub const PROGRESSION_RATE_FEATURE: &str = "progression_rate";

impl ProgressionOrchestrator {
    /// Scores one engagement event and credits it to the user and the
    /// active progress.
    ///
    /// The score is `value × weight(metric)` passed through the
    /// `progression_rate` modifiers and truncated. Returns the score; zero
    /// scores credit nothing.
    pub async fn record_engagement(&self, user_id: &UserId, metric: &str, value: u64) -> Result<u64> {
        let weight = self.shared.config.engagement_weight(metric);
        let base_score = value as f64 * weight;
        let modified = self
            .modified_value_or_base(PROGRESSION_RATE_FEATURE, base_score)
            .await;

        // Float to int casts saturate; negative and NaN become zero.
        let score = modified.trunc() as u64;
        if score == 0 {
            debug!(%user_id, metric, value, "engagement scored zero");
            return Ok(0);
        }

        self.shared
            .repo
            .add_engagement(user_id, score)
            .await
            .op("add_engagement")?;

        if let Err(err) = self.add_contribution(score).await {
            warn!(%user_id, metric, score, error = %err, "failed to add contribution from engagement");
        }

        debug!(%user_id, metric, value, weight, score, "engagement recorded");
        Ok(score)
    }

    pub async fn engagement(&self, user_id: &UserId) -> Result<u64> {
        Ok(self
            .shared
            .repo
            .engagement(user_id)
            .await
            .op("engagement")?
            .map_or(0, |engagement| engagement.score))
    }

    /// Community engagement rate over the last `days` UTC days, today
    /// included. Zero means [`DEFAULT_VELOCITY_DAYS`].
    pub async fn engagement_velocity(&self, days: u32) -> Result<EngagementVelocity> {
        let days = if days == 0 { DEFAULT_VELOCITY_DAYS } else { days };
        let today = Utc::now().date_naive();
        let since = today
            .checked_sub_signed(TimeDelta::days(i64::from(days) - 1))
            .unwrap_or(today);

        let totals = self
            .shared
            .repo
            .daily_engagement_totals(since)
            .await
            .op("daily_engagement_totals")?;
        Ok(EngagementVelocity::from_daily_totals(&totals, days))
    }

    /// Projects when `node_key` unlocks at the current weekly velocity.
    ///
    /// Contributions count toward the estimate only while the ledger targets
    /// this node.
    pub async fn estimate_unlock_time(&self, node_key: &str) -> Result<UnlockEstimate> {
        let repo = &self.shared.repo;
        let node = repo
            .node_by_key(node_key)
            .await
            .op("node_by_key")?
            .ok_or_else(|| RuntimeError::NodeNotFound(node_key.to_owned()))?;

        let velocity = self.engagement_velocity(DEFAULT_VELOCITY_DAYS).await?;
        let now = Utc::now();

        let level = repo
            .unlock(node.id)
            .await
            .op("unlock")?
            .map_or(0, |unlock| unlock.current_level);
        if level >= node.max_level {
            return Ok(UnlockEstimate::already_unlocked(node.key, node.unlock_cost, &velocity, now));
        }

        let current_progress = repo
            .active_progress()
            .await
            .op("active_progress")?
            .filter(|progress| progress.node_id == Some(node.id))
            .map_or(0, |progress| progress.contributions_accumulated);

        let estimate = UnlockEstimate::project(node.key, node.unlock_cost, current_progress, &velocity, now);
        debug!(
            node_key,
            required = estimate.required_points,
            velocity = estimate.current_velocity,
            confidence = %estimate.confidence,
            "unlock time estimated"
        );
        Ok(estimate)
    }

    /// Highest engagement scores first.
    pub async fn engagement_leaderboard(&self, limit: usize) -> Result<Vec<UserEngagement>> {
        self.shared
            .repo
            .top_engagement(limit)
            .await
            .op("top_engagement")
    }
}
