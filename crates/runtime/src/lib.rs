//! Runtime orchestration for the community progression tree.
//!
//! This crate wires the progression core into a running service: a
//! repository seam, an event bus, read-through caches, and a background
//! unlock worker, coordinated by [`ProgressionOrchestrator`].
//!
//! Modules are organized by responsibility:
//! - [`orchestrator`] hosts the orchestrator, its builder, and every state
//!   transition
//! - [`api`] exposes the error and identity types downstream clients use
//! - [`events`] provides the kind-based event bus
//! - [`cache`] holds the unlock and modifier caches
//! - [`modifiers`] composes modifier values from unlocked nodes
//! - [`repository`] defines the storage contract and an in-memory store
//! - `workers` keeps the unlock worker internal to the crate
pub mod api;
pub mod cache;
pub mod events;
pub mod modifiers;
pub mod orchestrator;
pub mod repository;

mod workers;

pub use api::{IdentityError, IdentityResolver, PlatformIdentity, Result, RuntimeError};
pub use cache::{CacheInvalidationHandler, CachedModifier, ModifierCache, UnlockCache};
pub use events::{EventBus, EventHandler, EventKind, InMemoryEventBus, ProgressionEvent, SubscriptionId};
pub use modifiers::{ModifierEngine, ModifierFallback};
pub use orchestrator::{
    OrchestratorBuilder, ProgressionOrchestrator, ProgressionStatus, SyncReport, TreeNodeView,
    VotingOutcome,
};
pub use progression_core::{
    Confidence, EngagementVelocity, ProgressionConfig, ProgressionReset, Trend, UnlockEstimate,
};
pub use repository::{
    AUTO_UNLOCKED_BY, InMemoryProgressionRepository, NewVotingOption, NodeUpsert,
    ProgressionRepository, RepositoryError,
};
