//! Authored tech-tree definitions and their validation.
//!
//! A [`TreeDefinition`] is the on-disk shape of the tree. [`TreeDefinition::validate`]
//! enforces the structural rules the runtime relies on (unique keys, known
//! static prerequisites, no cycles, well-formed dynamic predicates) and
//! [`TreeDefinition::into_nodes`] turns a valid definition into runtime nodes.

use std::collections::{HashMap, HashSet};

use progression_core::{
    CostError, ModifierConfig, NodeId, NodeSize, NodeType, Prerequisite, PrerequisiteError,
    ProgressionNode, unlock_cost,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("tree defines no nodes")]
    Empty,

    #[error("duplicate node key '{0}'")]
    DuplicateKey(String),

    #[error("node '{0}' has an empty key or name")]
    MissingField(String),

    #[error("node '{key}' has max_level {max_level}; must be >= 1")]
    InvalidMaxLevel { key: String, max_level: u32 },

    #[error("node '{key}' has an invalid tier")]
    InvalidTier {
        key: String,
        #[source]
        source: CostError,
    },

    #[error("node '{key}' has invalid size '{size}'")]
    InvalidSize { key: String, size: String },

    #[error("node '{key}' has invalid prerequisite '{expression}'")]
    InvalidPrerequisite {
        key: String,
        expression: String,
        #[source]
        source: PrerequisiteError,
    },

    #[error("node '{key}' requires unknown node '{prerequisite}'")]
    MissingPrerequisite { key: String, prerequisite: String },

    #[error("cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("node '{key}' has invalid modifier: {reason}")]
    InvalidModifier { key: String, reason: String },
}

/// A complete authored tree.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeDefinition {
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub nodes: Vec<NodeDefinition>,
}

/// A single authored node.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeDefinition {
    pub key: String,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub node_type: NodeType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub tier: i32,
    /// Size class as authored text: small, medium, or large.
    pub size: String,
    #[cfg_attr(feature = "serde", serde(default = "default_max_level"))]
    pub max_level: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub category: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub prerequisites: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub sort_order: i32,
    /// Unlocked at level 1 when the tree is synced, bypassing voting.
    #[cfg_attr(feature = "serde", serde(default))]
    pub auto_unlock: bool,
    /// Overrides the computed unlock cost (free starter nodes use 0).
    #[cfg_attr(feature = "serde", serde(default))]
    pub cost: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub modifier: Option<ModifierConfig>,
}

#[cfg(feature = "serde")]
fn default_max_level() -> u32 {
    1
}

impl TreeDefinition {
    /// Checks the whole tree, returning the first problem found.
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }

        let mut keys = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            node.validate()?;
            if !keys.insert(node.key.as_str()) {
                return Err(TreeError::DuplicateKey(node.key.clone()));
            }
        }

        for node in &self.nodes {
            for prerequisite in node.static_prerequisites() {
                if !keys.contains(prerequisite.as_str()) {
                    return Err(TreeError::MissingPrerequisite {
                        key: node.key.clone(),
                        prerequisite,
                    });
                }
            }
        }

        self.detect_cycles()
    }

    /// Validates and converts into runtime nodes, numbering ids from 1 in
    /// authored order.
    pub fn into_nodes(&self) -> Result<Vec<ProgressionNode>, TreeError> {
        self.validate()?;
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| node.to_node(NodeId(index as u64 + 1)))
            .collect()
    }

    /// Keys of nodes flagged `auto_unlock`.
    pub fn auto_unlock_keys(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.auto_unlock)
            .map(|node| node.key.clone())
            .collect()
    }

    fn detect_cycles(&self) -> Result<(), TreeError> {
        let edges: HashMap<&str, Vec<String>> = self
            .nodes
            .iter()
            .map(|node| (node.key.as_str(), node.static_prerequisites().collect()))
            .collect();

        let mut finished = HashSet::new();
        for node in &self.nodes {
            let mut path = Vec::new();
            visit(&node.key, &edges, &mut path, &mut finished)?;
        }
        Ok(())
    }
}

fn visit(
    key: &str,
    edges: &HashMap<&str, Vec<String>>,
    path: &mut Vec<String>,
    finished: &mut HashSet<String>,
) -> Result<(), TreeError> {
    if finished.contains(key) {
        return Ok(());
    }
    if let Some(start) = path.iter().position(|k| k == key) {
        let mut cycle = path[start..].to_vec();
        cycle.push(key.to_owned());
        return Err(TreeError::CycleDetected { path: cycle });
    }

    path.push(key.to_owned());
    for next in edges.get(key).into_iter().flatten() {
        visit(next, edges, path, finished)?;
    }
    path.pop();
    finished.insert(key.to_owned());
    Ok(())
}

impl NodeDefinition {
    fn validate(&self) -> Result<(), TreeError> {
        if self.key.trim().is_empty() || self.name.trim().is_empty() {
            return Err(TreeError::MissingField(self.key.clone()));
        }
        if self.max_level < 1 {
            return Err(TreeError::InvalidMaxLevel {
                key: self.key.clone(),
                max_level: self.max_level,
            });
        }

        let size = self.parse_size()?;
        unlock_cost(self.tier, size).map_err(|source| TreeError::InvalidTier {
            key: self.key.clone(),
            source,
        })?;

        for expression in &self.prerequisites {
            Prerequisite::parse_validated(expression).map_err(|source| {
                TreeError::InvalidPrerequisite {
                    key: self.key.clone(),
                    expression: expression.clone(),
                    source,
                }
            })?;
        }

        if let Some(modifier) = &self.modifier {
            self.validate_modifier(modifier)?;
        }
        Ok(())
    }

    fn validate_modifier(&self, modifier: &ModifierConfig) -> Result<(), TreeError> {
        let invalid = |reason: &str| TreeError::InvalidModifier {
            key: self.key.clone(),
            reason: reason.to_owned(),
        };

        if modifier.feature_key.trim().is_empty() {
            return Err(invalid("feature_key is empty"));
        }
        if !modifier.base_value.is_finite() || !modifier.per_level_value.is_finite() {
            return Err(invalid("values must be finite"));
        }
        if let (Some(min), Some(max)) = (modifier.min_value, modifier.max_value)
            && min > max
        {
            return Err(invalid("min_value exceeds max_value"));
        }
        Ok(())
    }

    fn parse_size(&self) -> Result<NodeSize, TreeError> {
        self.size.parse().map_err(|_| TreeError::InvalidSize {
            key: self.key.clone(),
            size: self.size.clone(),
        })
    }

    fn static_prerequisites(&self) -> impl Iterator<Item = String> + '_ {
        self.prerequisites
            .iter()
            .filter_map(|expression| match Prerequisite::parse(expression) {
                Ok(Prerequisite::StaticKey(key)) => Some(key),
                _ => None,
            })
    }

    fn to_node(&self, id: NodeId) -> Result<ProgressionNode, TreeError> {
        let size = self.parse_size()?;
        let mut node = ProgressionNode::new(id, self.key.clone(), self.node_type, self.tier, size)
            .map_err(|source| TreeError::InvalidTier {
                key: self.key.clone(),
                source,
            })?
            .with_display_name(self.name.clone())
            .with_description(self.description.clone())
            .with_max_level(self.max_level)
            .with_prerequisites(self.prerequisites.iter().cloned());

        node.sort_order = self.sort_order;
        node.category = self.category.clone();
        node.modifier = self.modifier.clone();
        if let Some(cost) = self.cost {
            node.unlock_cost = cost;
        }
        Ok(node)
    }
}
