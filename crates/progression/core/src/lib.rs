//! Pure progression rules for the community tech tree.
//!
//! `progression-core` defines the data model (nodes, unlocks, voting sessions,
//! unlock progress) and the deterministic rules that operate on it: unlock cost
//! computation, prerequisite parsing and evaluation, modifier stacking, vote
//! tallying, and engagement velocity projections. It performs no I/O; the
//! runtime crate layers persistence, caching, and event notification on top of
//! these APIs.
pub mod config;
pub mod cost;
pub mod ids;
pub mod modifier;
pub mod node;
pub mod prerequisite;
pub mod progress;
pub mod velocity;
pub mod voting;

pub use config::ProgressionConfig;
pub use cost::{BASE_COST_LARGE, BASE_COST_MEDIUM, BASE_COST_SMALL, CostError, TIER_GROWTH};
pub use cost::{unlock_cost, unlock_cost_for_size, validate_tier};
pub use ids::{NodeId, OptionId, ProgressId, SessionId, UserId};
pub use modifier::{ModifierConfig, ModifierKind, ModifierStack, StackedValue, ValueModifier};
pub use node::{NodeSize, NodeType, ProgressionNode, ProgressionUnlock};
pub use prerequisite::{
    Candidate, CandidateSet, Prerequisite, PrerequisiteError, PrerequisiteEvaluator,
    RejectedNode, UnlockState,
};
pub use progress::{ProgressionReset, UnlockProgress, UserEngagement};
pub use velocity::{Confidence, DEFAULT_VELOCITY_DAYS, EngagementVelocity, Trend, UnlockEstimate};
pub use voting::{SessionStatus, Vote, VoteClock, VotingOption, VotingSession, select_winner};
