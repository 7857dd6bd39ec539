//! Unlock cost computation.
//!
//! Cost grows geometrically with tier: `round(base[size] * 1.5^tier)`, where the
//! base depends on the node's size class. Rounding is half away from zero, so a
//! tier-3 medium node costs 338 (337.5 rounded up).

use thiserror::Error;

use crate::node::NodeSize;

pub const BASE_COST_SMALL: u64 = 50;
pub const BASE_COST_MEDIUM: u64 = 100;
pub const BASE_COST_LARGE: u64 = 200;

/// Per-tier cost multiplier.
pub const TIER_GROWTH: f64 = 1.5;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CostError {
    #[error("invalid tier {0}: tier must be >= 0")]
    InvalidTier(i32),

    #[error("invalid node size {0:?}: expected small, medium, or large")]
    InvalidSize(String),

    #[error("unlock cost for tier {tier} overflows")]
    CostOverflow { tier: i32 },
}

/// Rejects negative tiers.
pub fn validate_tier(tier: i32) -> Result<(), CostError> {
    if tier < 0 {
        return Err(CostError::InvalidTier(tier));
    }
    Ok(())
}

/// Computes the contribution cost of unlocking a node of `size` at `tier`.
pub fn unlock_cost(tier: i32, size: NodeSize) -> Result<u64, CostError> {
    validate_tier(tier)?;

    let raw = size.base_cost() as f64 * TIER_GROWTH.powi(tier);
    let rounded = raw.round();
    if !rounded.is_finite() || rounded >= u64::MAX as f64 {
        return Err(CostError::CostOverflow { tier });
    }

    Ok(rounded as u64)
}

/// Same as [`unlock_cost`], for a size class given as authored text.
pub fn unlock_cost_for_size(tier: i32, size: &str) -> Result<u64, CostError> {
    let size = size
        .parse::<NodeSize>()
        .map_err(|_| CostError::InvalidSize(size.to_owned()))?;
    unlock_cost(tier, size)
}

impl NodeSize {
    /// Tier-0 cost for this size class.
    pub const fn base_cost(self) -> u64 {
        match self {
            NodeSize::Small => BASE_COST_SMALL,
            NodeSize::Medium => BASE_COST_MEDIUM,
            NodeSize::Large => BASE_COST_LARGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_costs_follow_tier_growth() {
        let expected = [
            (0, 100),
            (1, 150),
            (2, 225),
            (3, 338),
            (4, 506),
            (5, 759),
            (10, 5767),
        ];
        for (tier, cost) in expected {
            assert_eq!(unlock_cost(tier, NodeSize::Medium), Ok(cost), "tier {tier}");
        }
    }

    #[test]
    fn tier_zero_is_base_cost() {
        assert_eq!(unlock_cost(0, NodeSize::Small), Ok(50));
        assert_eq!(unlock_cost(0, NodeSize::Medium), Ok(100));
        assert_eq!(unlock_cost(0, NodeSize::Large), Ok(200));
    }

    #[test]
    fn size_scales_cost() {
        assert_eq!(unlock_cost(2, NodeSize::Small), Ok(113));
        assert_eq!(unlock_cost(2, NodeSize::Large), Ok(450));
    }

    #[test]
    fn negative_tier_is_rejected() {
        assert_eq!(
            unlock_cost(-1, NodeSize::Medium),
            Err(CostError::InvalidTier(-1))
        );
    }

    #[test]
    fn unknown_size_is_rejected() {
        assert_eq!(
            unlock_cost_for_size(1, "huge"),
            Err(CostError::InvalidSize("huge".to_owned()))
        );
        assert_eq!(unlock_cost_for_size(1, "medium"), Ok(150));
    }

    #[test]
    fn absurd_tier_overflows() {
        assert_eq!(
            unlock_cost(200, NodeSize::Large),
            Err(CostError::CostOverflow { tier: 200 })
        );
    }
}
