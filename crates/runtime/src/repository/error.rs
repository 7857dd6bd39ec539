//! Error types raised by repository implementations.

use progression_core::{NodeId, OptionId, ProgressId, SessionId, UserId};
use thiserror::Error;

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("progression repository lock was poisoned")]
    LockPoisoned,

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("voting session {0} not found")]
    SessionNotFound(SessionId),

    #[error("voting option {option_id} not found in session {session_id}")]
    OptionNotFound {
        session_id: SessionId,
        option_id: OptionId,
    },

    #[error("unlock progress {0} not found or already completed")]
    ProgressNotFound(ProgressId),

    #[error("unlock progress {0} is already active")]
    ProgressAlreadyActive(ProgressId),

    #[error("user {user_id} already voted in session {session_id}")]
    DuplicateVote {
        session_id: SessionId,
        user_id: UserId,
    },

    #[error("voting session {0} is not accepting votes")]
    SessionNotVoting(SessionId),

    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("invalid level {level} for node {node_id}")]
    InvalidLevel { node_id: NodeId, level: u32 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
