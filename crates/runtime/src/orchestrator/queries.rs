//! Read-only views over progression state.
//!
//! None of these take the transition lock.

use std::collections::{BTreeMap, HashMap};

use progression_core::{
    PrerequisiteEvaluator, ProgressionNode, StackedValue, UnlockProgress, VotingSession,
};

use super::ProgressionOrchestrator;
use crate::api::{Result, RuntimeError, StorageContext};
use crate::modifiers::ModifierFallback;

/// A node in the progression tree with its unlock state.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNodeView {
    pub node: ProgressionNode,
    /// 0 when locked.
    pub unlocked_level: u32,
    /// Keys of nodes that list this node as a static prerequisite.
    pub children: Vec<String>,
}

impl TreeNodeView {
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_level > 0
    }
}

/// Snapshot returned by [`ProgressionOrchestrator::status`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressionStatus {
    pub total_nodes: usize,
    pub unlocked_nodes: usize,
    pub active_session: Option<VotingSession>,
    pub progress: Option<UnlockProgress>,
    pub target_key: Option<String>,
    pub target_cost: Option<u64>,
    /// True when every node is at its max level. False for an empty tree.
    pub all_unlocked: bool,
}

impl ProgressionOrchestrator {
    /// Whether `key` is unlocked at `level` or higher.
    ///
    /// Served from the unlock cache; misses go to the repository and are
    /// cached unless an unlock or relock lands during the read.
    pub async fn is_node_unlocked(&self, key: &str, level: u32) -> Result<bool> {
        let cache = &self.shared.unlock_cache;
        if let Some(unlocked) = cache.get(key, level) {
            return Ok(unlocked);
        }

        let generation = cache.generation();
        let unlocked = self
            .shared
            .repo
            .is_node_unlocked(key, level)
            .await
            .op("is_node_unlocked")?;
        cache.set_if_generation(generation, key, level, unlocked);
        Ok(unlocked)
    }

    pub async fn is_feature_unlocked(&self, feature_key: &str) -> Result<bool> {
        self.is_node_unlocked(feature_key, 1).await
    }

    /// Items are backed by nodes keyed `item_<name>`.
    pub async fn is_item_unlocked(&self, item_name: &str) -> Result<bool> {
        self.is_node_unlocked(&item_node_key(item_name), 1).await
    }

    /// Batch form of [`Self::is_item_unlocked`], keyed by item name.
    pub async fn are_items_unlocked(&self, item_names: &[&str]) -> Result<HashMap<String, bool>> {
        let cache = &self.shared.unlock_cache;
        let mut result = HashMap::with_capacity(item_names.len());
        let mut misses = Vec::new();

        for name in item_names {
            let key = item_node_key(name);
            match cache.get(&key, 1) {
                Some(unlocked) => {
                    result.insert((*name).to_owned(), unlocked);
                }
                None => misses.push((*name, key)),
            }
        }

        let generation = cache.generation();
        for (name, key) in misses {
            let unlocked = self
                .shared
                .repo
                .is_node_unlocked(&key, 1)
                .await
                .op("is_node_unlocked")?;
            cache.set_if_generation(generation, &key, 1, unlocked);
            result.insert(name.to_owned(), unlocked);
        }

        Ok(result)
    }

    /// Nodes whose prerequisites hold and that are below their max level,
    /// ordered by tier then key.
    pub async fn available_unlocks(&self) -> Result<Vec<ProgressionNode>> {
        Ok(self
            .candidate_set()
            .await?
            .candidates
            .into_iter()
            .map(|candidate| candidate.node)
            .collect())
    }

    pub async fn progression_tree(&self) -> Result<Vec<TreeNodeView>> {
        let (nodes, state) = self.unlock_levels().await?;

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &nodes {
            for parent in node.static_prerequisites() {
                children.entry(parent).or_default().push(node.key.clone());
            }
        }

        Ok(nodes
            .into_iter()
            .map(|node| TreeNodeView {
                unlocked_level: state.level(&node.key),
                children: children.remove(&node.key).unwrap_or_default(),
                node,
            })
            .collect())
    }

    /// Locked static prerequisites standing between `key` and availability,
    /// followed transitively.
    pub async fn required_nodes(&self, key: &str) -> Result<Vec<ProgressionNode>> {
        let (nodes, state) = self.unlock_levels().await?;
        if !nodes.iter().any(|node| node.key == key) {
            return Err(RuntimeError::NodeNotFound(key.to_owned()));
        }

        let required = PrerequisiteEvaluator::new(&state).required_nodes(key, &nodes);
        Ok(required
            .iter()
            .filter_map(|required_key| nodes.iter().find(|node| &node.key == required_key))
            .cloned()
            .collect())
    }

    pub async fn status(&self) -> Result<ProgressionStatus> {
        let repo = &self.shared.repo;
        let (nodes, state) = self.unlock_levels().await?;
        let active_session = repo.active_session().await.op("active_session")?;
        let progress = repo.active_progress().await.op("active_progress")?;

        let target = progress
            .as_ref()
            .and_then(|progress| progress.node_id)
            .and_then(|id| nodes.iter().find(|node| node.id == id));

        let all_unlocked = !nodes.is_empty()
            && nodes
                .iter()
                .all(|node| state.level(&node.key) >= node.max_level);

        Ok(ProgressionStatus {
            total_nodes: nodes.len(),
            unlocked_nodes: state.unlocked_count(),
            target_key: target.map(|node| node.key.clone()),
            target_cost: target.map(|node| node.unlock_cost),
            active_session,
            progress,
            all_unlocked,
        })
    }

    pub async fn active_session(&self) -> Result<Option<VotingSession>> {
        self.shared
            .repo
            .active_session()
            .await
            .op("active_session")
    }

    /// Latest session whatever its status.
    pub async fn most_recent_session(&self) -> Result<Option<VotingSession>> {
        self.shared
            .repo
            .latest_session()
            .await
            .op("latest_session")
    }

    pub async fn unlock_progress(&self) -> Result<Option<UnlockProgress>> {
        self.shared
            .repo
            .active_progress()
            .await
            .op("active_progress")
    }

    /// `base` with the modifiers registered for `feature_key` applied.
    pub async fn modified_value(&self, feature_key: &str, base: f64) -> std::result::Result<f64, ModifierFallback> {
        self.shared.modifiers.modified_value(feature_key, base).await
    }

    /// Like [`Self::modified_value`], returning `base` on storage failure.
    pub async fn modified_value_or_base(&self, feature_key: &str, base: f64) -> f64 {
        self.shared
            .modifiers
            .modified_value_or_base(feature_key, base)
            .await
    }

    /// Value and summed level, for diagnostics.
    pub async fn modifier_breakdown(&self, feature_key: &str, base: f64) -> Result<StackedValue> {
        let stack = self
            .shared
            .modifiers
            .modifiers_for_feature(feature_key)
            .await
            .op("nodes_by_feature_key")?;
        Ok(stack.apply(base))
    }
}

fn item_node_key(item_name: &str) -> String {
    format!("item_{item_name}")
}
