//! Repository layer for progression state.
//!
//! Repositories own everything that changes while the tree is played:
//! - Unlock records and their levels
//! - Voting sessions, options, and ballots
//! - The contribution ledger (unlock progress)
//! - Per-user engagement totals
//!
//! Authored tree content enters through [`ProgressionRepository::upsert_node`].

mod error;
pub mod memory;
mod traits;

pub use error::{RepositoryError, Result};
pub use memory::InMemoryProgressionRepository;
pub use traits::{AUTO_UNLOCKED_BY, NewVotingOption, NodeUpsert, ProgressionRepository};
