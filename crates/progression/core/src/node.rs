//! Tech-tree nodes and their unlock records.

use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::cost::{CostError, unlock_cost};
use crate::ids::NodeId;
use crate::modifier::ModifierConfig;
use crate::prerequisite::Prerequisite;

/// What a node gates once unlocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NodeType {
    Feature,
    Item,
    Upgrade,
}

/// Size class used to pick the node's base cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NodeSize {
    Small,
    Medium,
    Large,
}

/// A single node in the tech tree.
///
/// Nodes are authored data: tier, size, and prerequisites never change at
/// runtime. The unlock cost is derived from tier and size unless the authored
/// data overrides it (used for free starter nodes).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressionNode {
    pub id: NodeId,
    pub key: String,
    pub node_type: NodeType,
    pub display_name: String,
    pub description: String,
    pub tier: i32,
    pub size: NodeSize,
    pub max_level: u32,
    pub unlock_cost: u64,
    pub category: Option<String>,
    pub sort_order: i32,
    pub modifier: Option<ModifierConfig>,
    pub prerequisites: Vec<String>,
}

impl ProgressionNode {
    /// Creates a node with a computed cost, a max level of 1, and no
    /// prerequisites.
    pub fn new(
        id: NodeId,
        key: impl Into<String>,
        node_type: NodeType,
        tier: i32,
        size: NodeSize,
    ) -> Result<Self, CostError> {
        let key = key.into();
        Ok(Self {
            id,
            display_name: key.clone(),
            key,
            node_type,
            description: String::new(),
            tier,
            size,
            max_level: 1,
            unlock_cost: unlock_cost(tier, size)?,
            category: None,
            sort_order: 0,
            modifier: None,
            prerequisites: Vec::new(),
        })
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_modifier(mut self, modifier: ModifierConfig) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.unlock_cost = cost;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Static prerequisite keys, skipping dynamic and malformed expressions.
    pub fn static_prerequisites(&self) -> impl Iterator<Item = String> + '_ {
        self.prerequisites
            .iter()
            .filter_map(|expr| match Prerequisite::parse(expr) {
                Ok(Prerequisite::StaticKey(key)) => Some(key),
                _ => None,
            })
    }
}

/// Unlock record for a node. One record per node; the level only moves down
/// through an explicit relock.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressionUnlock {
    pub node_id: NodeId,
    pub current_level: u32,
    pub unlocked_by: String,
    pub unlocked_at: DateTime<Utc>,
    pub engagement_score: u64,
}
