//! Command implementations for xtask
//!
//! Each command is a separate module that implements its own CLI args and execution logic.

mod check_tree;
mod show_config;
mod simulate;

pub use check_tree::CheckTree;
pub use show_config::ShowConfig;
pub use simulate::Simulate;
