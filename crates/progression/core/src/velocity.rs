//! Engagement velocity and unlock-time projection.
//!
//! Velocity is computed from per-day engagement totals over a trailing
//! window. The trend compares the average of the older half of the sampled
//! days against the newer half.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use strum::{AsRefStr, Display, EnumString};

/// Window used when a caller asks for zero days.
pub const DEFAULT_VELOCITY_DAYS: u32 = 7;

/// Newer-half average must exceed the older half by this factor to count as
/// increasing (or fall below its inverse bound to count as decreasing).
const TREND_UP: f64 = 1.1;
const TREND_DOWN: f64 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Engagement rate over a trailing window of days.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngagementVelocity {
    /// Total points divided by the window length, not by the sampled days.
    pub points_per_day: f64,
    pub trend: Trend,
    pub period_days: u32,
    /// Days in the window that recorded any engagement.
    pub sample_size: usize,
    pub total_points: u64,
}

impl EngagementVelocity {
    pub fn from_daily_totals(totals: &BTreeMap<NaiveDate, u64>, period_days: u32) -> Self {
        let period_days = period_days.max(1);
        let total_points: u64 = totals.values().sum();

        Self {
            points_per_day: total_points as f64 / f64::from(period_days),
            trend: trend(totals),
            period_days,
            sample_size: totals.len(),
            total_points,
        }
    }
}

fn trend(totals: &BTreeMap<NaiveDate, u64>) -> Trend {
    let samples: Vec<u64> = totals.values().copied().collect();
    if samples.len() < 2 {
        return Trend::Stable;
    }

    let (older, newer) = samples.split_at(samples.len() / 2);
    let average = |half: &[u64]| half.iter().sum::<u64>() as f64 / half.len() as f64;
    let (older, newer) = (average(older), average(newer));

    if newer > older * TREND_UP {
        Trend::Increasing
    } else if newer < older * TREND_DOWN {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// A full week of samples that is not trending down is high confidence;
    /// three or more days is medium.
    pub fn for_velocity(velocity: &EngagementVelocity) -> Self {
        match velocity.sample_size {
            7.. if velocity.trend != Trend::Decreasing => Confidence::High,
            3.. => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Projected time until a node unlocks at the current velocity.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnlockEstimate {
    pub node_key: String,
    pub required_points: u64,
    pub current_progress: u64,
    pub current_velocity: f64,
    /// `None` when nothing is being contributed.
    pub estimated_days: Option<f64>,
    pub estimated_unlock_at: Option<DateTime<Utc>>,
    pub confidence: Confidence,
}

impl UnlockEstimate {
    /// Estimate for a node already at its max level.
    pub fn already_unlocked(
        node_key: impl Into<String>,
        unlock_cost: u64,
        velocity: &EngagementVelocity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            node_key: node_key.into(),
            required_points: 0,
            current_progress: unlock_cost,
            current_velocity: velocity.points_per_day,
            estimated_days: Some(0.0),
            estimated_unlock_at: Some(now),
            confidence: Confidence::High,
        }
    }

    /// Projects the remaining cost over `velocity`.
    pub fn project(
        node_key: impl Into<String>,
        unlock_cost: u64,
        current_progress: u64,
        velocity: &EngagementVelocity,
        now: DateTime<Utc>,
    ) -> Self {
        let required_points = unlock_cost.saturating_sub(current_progress);
        let estimated_days = if required_points == 0 {
            Some(0.0)
        } else if velocity.points_per_day > 0.0 {
            Some(required_points as f64 / velocity.points_per_day)
        } else {
            None
        };
        let estimated_unlock_at = estimated_days.and_then(|days| {
            // Float to int casts saturate.
            let delta = TimeDelta::try_seconds((days * 86_400.0).round() as i64)?;
            now.checked_add_signed(delta)
        });

        Self {
            node_key: node_key.into(),
            required_points,
            current_progress,
            current_velocity: velocity.points_per_day,
            estimated_days,
            estimated_unlock_at,
            confidence: Confidence::for_velocity(velocity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week(points: impl Fn(u32) -> u64) -> BTreeMap<NaiveDate, u64> {
        let today = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        (0..7)
            .map(|days_ago| (today - TimeDelta::days(i64::from(days_ago)), points(days_ago)))
            .collect()
    }

    #[test]
    fn no_samples_is_stable_and_zero() {
        let velocity = EngagementVelocity::from_daily_totals(&BTreeMap::new(), 7);
        assert_eq!(velocity.points_per_day, 0.0);
        assert_eq!(velocity.trend, Trend::Stable);
        assert_eq!(velocity.sample_size, 0);
        assert_eq!(Confidence::for_velocity(&velocity), Confidence::Low);
    }

    #[test]
    fn constant_activity_is_stable() {
        let velocity = EngagementVelocity::from_daily_totals(&week(|_| 100), 7);
        assert!((velocity.points_per_day - 100.0).abs() < 1e-9);
        assert_eq!(velocity.trend, Trend::Stable);
        assert_eq!(velocity.sample_size, 7);
        assert_eq!(velocity.total_points, 700);
    }

    #[test]
    fn rising_activity_is_increasing() {
        // Oldest day 10, today 70.
        let velocity = EngagementVelocity::from_daily_totals(&week(|days_ago| u64::from(7 - days_ago) * 10), 7);
        assert_eq!(velocity.trend, Trend::Increasing);
        assert!((velocity.points_per_day - 40.0).abs() < 1e-9);
    }

    #[test]
    fn falling_activity_is_decreasing() {
        let velocity = EngagementVelocity::from_daily_totals(&week(|days_ago| u64::from(days_ago + 1) * 10), 7);
        assert_eq!(velocity.trend, Trend::Decreasing);
        assert_eq!(Confidence::for_velocity(&velocity), Confidence::Medium);
    }

    #[test]
    fn average_spreads_over_whole_window() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let totals = BTreeMap::from([(today, 300)]);
        let velocity = EngagementVelocity::from_daily_totals(&totals, 30);
        assert!((velocity.points_per_day - 10.0).abs() < 1e-9);
        assert_eq!(velocity.sample_size, 1);
    }

    #[test]
    fn projection_divides_remaining_cost() {
        let now = Utc::now();
        let velocity = EngagementVelocity::from_daily_totals(&week(|_| 100), 7);
        let estimate = UnlockEstimate::project("target_node", 1000, 500, &velocity, now);

        assert_eq!(estimate.required_points, 500);
        assert!((estimate.estimated_days.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(estimate.estimated_unlock_at, Some(now + TimeDelta::days(5)));
        assert_eq!(estimate.confidence, Confidence::High);
    }

    #[test]
    fn zero_velocity_never_arrives() {
        let velocity = EngagementVelocity::from_daily_totals(&BTreeMap::new(), 7);
        let estimate = UnlockEstimate::project("target_node", 1000, 0, &velocity, Utc::now());
        assert_eq!(estimate.estimated_days, None);
        assert_eq!(estimate.estimated_unlock_at, None);
        assert_eq!(estimate.confidence, Confidence::Low);
    }

    #[test]
    fn funded_target_needs_nothing() {
        let velocity = EngagementVelocity::from_daily_totals(&BTreeMap::new(), 7);
        let estimate = UnlockEstimate::project("target_node", 100, 140, &velocity, Utc::now());
        assert_eq!(estimate.required_points, 0);
        assert_eq!(estimate.estimated_days, Some(0.0));
    }
}
