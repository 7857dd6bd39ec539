//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from the unlock worker, repositories, identity resolution,
//! and validation so callers can bubble them up with consistent context.

use progression_content::TreeError;
use progression_core::{CostError, PrerequisiteError};
use thiserror::Error;

use super::identity::IdentityError;
pub use crate::repository::RepositoryError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no nodes available to unlock")]
    NoNodesAvailable,

    #[error("no active voting session")]
    NoActiveSession,

    #[error("node {node_key} is not a voting option in the active session")]
    NotInOptions { node_key: String },

    #[error("user {user_id} has already voted in this session")]
    AlreadyVoted { user_id: String },

    #[error("voting session {session_id} is already active")]
    SessionAlreadyActive { session_id: u64 },

    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("level {level} exceeds max level {max_level} for node {node_key}")]
    MaxLevelExceeded {
        node_key: String,
        level: u32,
        max_level: u32,
    },

    #[error("failed to resolve user identity")]
    Identity(#[from] IdentityError),

    #[error("invalid progression tree")]
    Tree(#[from] TreeError),

    #[error("unlock worker did not stop before the shutdown deadline")]
    ShutdownTimedOut,

    #[error("unlock worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Cost(#[from] CostError),

    #[error(transparent)]
    Prerequisite(#[from] PrerequisiteError),

    #[error("repository operation `{op}` failed")]
    Storage {
        op: &'static str,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RuntimeError {
    /// The repository error behind this failure, if any.
    pub fn repository_error(&self) -> Option<&RepositoryError> {
        match self {
            RuntimeError::Storage { source, .. } | RuntimeError::Repository(source) => Some(source),
            _ => None,
        }
    }
}

/// Attaches the failing operation name to repository results.
pub(crate) trait StorageContext<T> {
    fn op(self, op: &'static str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, RepositoryError> {
    fn op(self, op: &'static str) -> Result<T> {
        self.map_err(|source| RuntimeError::Storage { op, source })
    }
}
