//! Composition of modifier values from unlocked nodes.
//!
//! [`ModifierEngine`] loads every node whose modifier targets a feature key,
//! folds their effects over a base value, and memoizes the result in a
//! [`ModifierCache`]. Lookups that hit a storage failure report the base
//! value as their fallback so callers can keep serving.

use std::sync::Arc;

use progression_core::{ModifierStack, StackedValue, ValueModifier};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::ModifierCache;
use crate::repository::{ProgressionRepository, RepositoryError};

/// Storage failed while resolving modifiers for a feature key.
#[derive(Debug, Error)]
#[error("failed to resolve modifiers for {feature_key}; falling back to {fallback}")]
pub struct ModifierFallback {
    pub feature_key: String,
    fallback: f64,
    #[source]
    pub source: RepositoryError,
}

impl ModifierFallback {
    /// The unmodified base value.
    pub fn fallback(&self) -> f64 {
        self.fallback
    }
}

pub struct ModifierEngine {
    repo: Arc<dyn ProgressionRepository>,
    cache: Arc<ModifierCache>,
}

impl ModifierEngine {
    pub fn new(repo: Arc<dyn ProgressionRepository>, cache: Arc<ModifierCache>) -> Self {
        Self { repo, cache }
    }

    /// Modifiers currently affecting `feature_key`, in application order.
    ///
    /// Locked nodes contribute a modifier at level 0.
    pub async fn modifiers_for_feature(
        &self,
        feature_key: &str,
    ) -> Result<ModifierStack, RepositoryError> {
        let nodes = self.repo.nodes_by_feature_key(feature_key).await?;

        Ok(nodes
            .into_iter()
            .filter_map(|(node, level)| {
                let config = node.modifier?;
                Some(ValueModifier::new(node.key, config, level))
            })
            .collect())
    }

    /// `base` with every modifier for `feature_key` applied.
    ///
    /// Returns `base` unchanged when no node targets the key.
    pub async fn modified_value(
        &self,
        feature_key: &str,
        base: f64,
    ) -> Result<f64, ModifierFallback> {
        if let Some(cached) = self.cache.get(feature_key) {
            return Ok(cached.value_for(base));
        }

        let generation = self.cache.generation();
        let stack = self
            .modifiers_for_feature(feature_key)
            .await
            .map_err(|source| ModifierFallback {
                feature_key: feature_key.to_owned(),
                fallback: base,
                source,
            })?;

        if stack.is_empty() {
            return Ok(base);
        }

        let StackedValue { value, total_level } = stack.apply(base);
        debug!(
            feature_key,
            base,
            value,
            total_level,
            modifiers = stack.len(),
            "composed modifier value"
        );
        if !self
            .cache
            .set_if_generation(generation, feature_key, base, value, total_level, stack)
        {
            debug!(feature_key, "modifier cache invalidated during lookup, not caching");
        }

        Ok(value)
    }

    /// Like [`Self::modified_value`], but logs storage failures and returns
    /// `base`.
    pub async fn modified_value_or_base(&self, feature_key: &str, base: f64) -> f64 {
        match self.modified_value(feature_key, base).await {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err.source, feature_key, "modifier lookup failed, using base value");
                err.fallback()
            }
        }
    }
}
