//! Public runtime API surface.
//!
//! This module gathers the types exposed to consumers of the runtime crate so
//! the orchestrator and workers can stay focused on state transitions.

pub mod errors;
pub mod identity;

pub(crate) use errors::StorageContext;
pub use errors::{Result, RuntimeError};
pub use identity::{IdentityError, IdentityResolver, PlatformIdentity};
