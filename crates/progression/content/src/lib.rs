//! Authored tech-tree content and loaders.
//!
//! [`tree`] holds the tree definition format and its structural validation.
//! With the `loaders` feature (default), [`loaders`] reads trees from RON or
//! TOML files and progression configuration from TOML.
pub mod tree;

#[cfg(feature = "loaders")]
pub mod loaders;

pub use tree::{NodeDefinition, TreeDefinition, TreeError};

#[cfg(feature = "loaders")]
pub use loaders::{ConfigLoader, LoadResult, TreeLoader};
