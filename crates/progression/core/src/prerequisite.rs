//! Prerequisite expressions and node availability.
//!
//! A node lists prerequisite expressions as plain strings in authored data.
//! Most are static node keys; expressions starting with `-` are dynamic
//! predicates over the set of unlocked nodes:
//!
//! ```text
//! feature_buy                          static: feature_buy must be unlocked
//! -nodes_unlocked_below_tier:2:5       at least 5 unlocked nodes with tier <= 2
//! -total_nodes_unlocked:10             at least 10 unlocked nodes overall
//! ```
//!
//! Parsing and validation are separate steps: [`Prerequisite::parse`] checks
//! syntax only, [`Prerequisite::validate`] checks value ranges.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::cost::validate_tier;
use crate::node::ProgressionNode;

const NODES_UNLOCKED_BELOW_TIER: &str = "nodes_unlocked_below_tier";
const TOTAL_NODES_UNLOCKED: &str = "total_nodes_unlocked";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PrerequisiteError {
    #[error("invalid syntax: expected {expected}, got {expression:?}")]
    InvalidSyntax {
        expression: String,
        expected: &'static str,
    },

    #[error("invalid tier in {expression:?}")]
    InvalidTier { expression: String },

    #[error("invalid count in {expression:?}: count must be a positive integer")]
    InvalidCount { expression: String },

    #[error("unknown dynamic prerequisite type: {0}")]
    UnknownPrerequisiteType(String),
}

/// A parsed prerequisite expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Prerequisite {
    /// The referenced node must be unlocked at level 1 or higher.
    StaticKey(String),
    /// At least `count` distinct unlocked nodes with tier <= `tier`.
    NodesUnlockedBelowTier { tier: i32, count: i64 },
    /// At least `count` unlocked nodes of any tier.
    TotalNodesUnlocked { count: i64 },
}

impl Prerequisite {
    /// Parses an expression. Never panics; malformed input yields an error.
    pub fn parse(expression: &str) -> Result<Self, PrerequisiteError> {
        let Some(dynamic) = expression.strip_prefix('-') else {
            return Ok(Self::StaticKey(expression.to_owned()));
        };

        let parts: Vec<&str> = dynamic.split(':').collect();
        match parts[0] {
            NODES_UNLOCKED_BELOW_TIER => {
                let [_, tier, count] = parts[..] else {
                    return Err(PrerequisiteError::InvalidSyntax {
                        expression: expression.to_owned(),
                        expected: "-nodes_unlocked_below_tier:TIER:COUNT",
                    });
                };
                let tier = tier
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| PrerequisiteError::InvalidTier {
                        expression: expression.to_owned(),
                    })?;
                let count = parse_count(expression, count)?;
                Ok(Self::NodesUnlockedBelowTier { tier, count })
            }
            TOTAL_NODES_UNLOCKED => {
                let [_, count] = parts[..] else {
                    return Err(PrerequisiteError::InvalidSyntax {
                        expression: expression.to_owned(),
                        expected: "-total_nodes_unlocked:COUNT",
                    });
                };
                let count = parse_count(expression, count)?;
                Ok(Self::TotalNodesUnlocked { count })
            }
            other => Err(PrerequisiteError::UnknownPrerequisiteType(other.to_owned())),
        }
    }

    /// Parses and validates in one step.
    pub fn parse_validated(expression: &str) -> Result<Self, PrerequisiteError> {
        let prerequisite = Self::parse(expression)?;
        prerequisite.validate()?;
        Ok(prerequisite)
    }

    /// Range checks for dynamic predicates: count must be positive, tier
    /// must be non-negative. There is no upper bound.
    pub fn validate(&self) -> Result<(), PrerequisiteError> {
        match self {
            Self::StaticKey(_) => Ok(()),
            Self::NodesUnlockedBelowTier { tier, count } => {
                if *count <= 0 {
                    return Err(PrerequisiteError::InvalidCount {
                        expression: self.to_string(),
                    });
                }
                validate_tier(*tier).map_err(|_| PrerequisiteError::InvalidTier {
                    expression: self.to_string(),
                })
            }
            Self::TotalNodesUnlocked { count } => {
                if *count <= 0 {
                    return Err(PrerequisiteError::InvalidCount {
                        expression: self.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::StaticKey(_))
    }

    pub fn is_satisfied(&self, state: &UnlockState) -> bool {
        match self {
            Self::StaticKey(key) => state.is_unlocked(key),
            Self::NodesUnlockedBelowTier { tier, count } => {
                state.unlocked_at_or_below(*tier) as i64 >= *count
            }
            Self::TotalNodesUnlocked { count } => state.unlocked_count() as i64 >= *count,
        }
    }
}

fn parse_count(expression: &str, raw: &str) -> Result<i64, PrerequisiteError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| PrerequisiteError::InvalidCount {
            expression: expression.to_owned(),
        })
}

impl FromStr for Prerequisite {
    type Err = PrerequisiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaticKey(key) => f.write_str(key),
            Self::NodesUnlockedBelowTier { tier, count } => {
                write!(f, "-{NODES_UNLOCKED_BELOW_TIER}:{tier}:{count}")
            }
            Self::TotalNodesUnlocked { count } => write!(f, "-{TOTAL_NODES_UNLOCKED}:{count}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeStatus {
    tier: i32,
    level: u32,
}

/// Snapshot of unlock levels used to evaluate prerequisites.
///
/// Built from the source-of-truth unlock records, never from caches.
#[derive(Clone, Debug, Default)]
pub struct UnlockState {
    nodes: HashMap<String, NodeStatus>,
}

impl UnlockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from `(node, current level)` pairs; level 0 means locked.
    pub fn from_levels<'a>(levels: impl IntoIterator<Item = (&'a ProgressionNode, u32)>) -> Self {
        let mut state = Self::new();
        for (node, level) in levels {
            state.insert(node.key.clone(), node.tier, level);
        }
        state
    }

    pub fn insert(&mut self, key: impl Into<String>, tier: i32, level: u32) {
        self.nodes.insert(key.into(), NodeStatus { tier, level });
    }

    pub fn level(&self, key: &str) -> u32 {
        self.nodes.get(key).map_or(0, |status| status.level)
    }

    pub fn is_unlocked(&self, key: &str) -> bool {
        self.level(key) >= 1
    }

    pub fn unlocked_count(&self) -> usize {
        self.nodes.values().filter(|status| status.level >= 1).count()
    }

    pub fn unlocked_at_or_below(&self, tier: i32) -> usize {
        self.nodes
            .values()
            .filter(|status| status.level >= 1 && status.tier <= tier)
            .count()
    }
}

/// A node offered for the next voting round.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub node: ProgressionNode,
    pub current_level: u32,
    pub target_level: u32,
}

/// A node whose prerequisite expressions could not be parsed or validated.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedNode {
    pub node_key: String,
    pub error: PrerequisiteError,
}

/// Result of a candidate scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateSet {
    /// Ordered by tier, then node key.
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<RejectedNode>,
}

/// Decides which nodes are available against an [`UnlockState`] snapshot.
pub struct PrerequisiteEvaluator<'a> {
    state: &'a UnlockState,
}

impl<'a> PrerequisiteEvaluator<'a> {
    pub fn new(state: &'a UnlockState) -> Self {
        Self { state }
    }

    /// Returns whether every prerequisite of `node` holds.
    pub fn prerequisites_met(&self, node: &ProgressionNode) -> Result<bool, PrerequisiteError> {
        for expression in &node.prerequisites {
            let prerequisite = Prerequisite::parse_validated(expression)?;
            if !prerequisite.is_satisfied(self.state) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Scans `nodes` for voting candidates.
    ///
    /// A node qualifies when it is below its max level and all of its
    /// prerequisites hold; it is offered at `current_level + 1`.
    pub fn candidates<'n>(&self, nodes: impl IntoIterator<Item = &'n ProgressionNode>) -> CandidateSet {
        let mut set = CandidateSet::default();

        for node in nodes {
            let current_level = self.state.level(&node.key);
            if current_level >= node.max_level {
                continue;
            }
            match self.prerequisites_met(node) {
                Ok(true) => set.candidates.push(Candidate {
                    node: node.clone(),
                    current_level,
                    target_level: current_level + 1,
                }),
                Ok(false) => {}
                Err(error) => set.rejected.push(RejectedNode {
                    node_key: node.key.clone(),
                    error,
                }),
            }
        }

        set.candidates
            .sort_by(|a, b| a.node.tier.cmp(&b.node.tier).then_with(|| a.node.key.cmp(&b.node.key)));
        set
    }

    /// Locked static prerequisites blocking `key`, followed transitively.
    ///
    /// Returned in discovery order; each key appears once even when several
    /// nodes depend on it.
    pub fn required_nodes(&self, key: &str, nodes: &[ProgressionNode]) -> Vec<String> {
        let by_key: HashMap<&str, &ProgressionNode> =
            nodes.iter().map(|node| (node.key.as_str(), node)).collect();

        let mut visited = HashSet::new();
        let mut required = Vec::new();
        self.collect_required(key, &by_key, &mut visited, &mut required);
        required
    }

    fn collect_required(
        &self,
        key: &str,
        by_key: &HashMap<&str, &ProgressionNode>,
        visited: &mut HashSet<String>,
        required: &mut Vec<String>,
    ) {
        if !visited.insert(key.to_owned()) {
            return;
        }
        let Some(node) = by_key.get(key) else {
            return;
        };
        for prerequisite in node.static_prerequisites() {
            if self.state.is_unlocked(&prerequisite) {
                continue;
            }
            if !required.contains(&prerequisite) {
                required.push(prerequisite.clone());
            }
            self.collect_required(&prerequisite, by_key, visited, required);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::node::{NodeSize, NodeType};

    fn node(id: u64, key: &str, tier: i32, prerequisites: &[&str]) -> ProgressionNode {
        ProgressionNode::new(NodeId(id), key, NodeType::Feature, tier, NodeSize::Small)
            .unwrap()
            .with_prerequisites(prerequisites.iter().copied())
    }

    #[test]
    fn parses_static_key() {
        assert_eq!(
            Prerequisite::parse("feature_buy"),
            Ok(Prerequisite::StaticKey("feature_buy".into()))
        );
    }

    #[test]
    fn parses_dynamic_predicates() {
        assert_eq!(
            Prerequisite::parse("-nodes_unlocked_below_tier:2:5"),
            Ok(Prerequisite::NodesUnlockedBelowTier { tier: 2, count: 5 })
        );
        assert_eq!(
            Prerequisite::parse("-total_nodes_unlocked:10"),
            Ok(Prerequisite::TotalNodesUnlocked { count: 10 })
        );
    }

    #[test]
    fn wrong_parameter_count_is_invalid_syntax() {
        assert!(matches!(
            Prerequisite::parse("-nodes_unlocked_below_tier:2"),
            Err(PrerequisiteError::InvalidSyntax { .. })
        ));
        assert!(matches!(
            Prerequisite::parse("-total_nodes_unlocked:1:2"),
            Err(PrerequisiteError::InvalidSyntax { .. })
        ));
    }

    #[test]
    fn non_integer_parameters_are_rejected() {
        assert!(matches!(
            Prerequisite::parse("-nodes_unlocked_below_tier:abc:5"),
            Err(PrerequisiteError::InvalidTier { .. })
        ));
        assert!(matches!(
            Prerequisite::parse("-nodes_unlocked_below_tier:2:xyz"),
            Err(PrerequisiteError::InvalidCount { .. })
        ));
        assert!(matches!(
            Prerequisite::parse("-total_nodes_unlocked:abc"),
            Err(PrerequisiteError::InvalidCount { .. })
        ));
    }

    #[test]
    fn unknown_dynamic_type_is_rejected() {
        assert_eq!(
            Prerequisite::parse("-unknown_type:5"),
            Err(PrerequisiteError::UnknownPrerequisiteType("unknown_type".into()))
        );
    }

    #[test]
    fn validation_checks_ranges() {
        assert!(
            Prerequisite::NodesUnlockedBelowTier { tier: 1, count: 1 }
                .validate()
                .is_ok()
        );
        assert!(Prerequisite::TotalNodesUnlocked { count: 0 }.validate().is_err());
        assert!(Prerequisite::TotalNodesUnlocked { count: -3 }.validate().is_err());
        assert!(matches!(
            Prerequisite::NodesUnlockedBelowTier { tier: -1, count: 5 }.validate(),
            Err(PrerequisiteError::InvalidTier { .. })
        ));
        assert!(
            Prerequisite::NodesUnlockedBelowTier { tier: 100, count: 5 }
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn display_round_trips_dynamic_expressions() {
        let expression = "-nodes_unlocked_below_tier:3:2";
        assert_eq!(Prerequisite::parse(expression).unwrap().to_string(), expression);
    }

    #[test]
    fn dynamic_predicates_count_unlocked_nodes() {
        let mut state = UnlockState::new();
        state.insert("a", 0, 1);
        state.insert("b", 1, 2);
        state.insert("c", 3, 1);
        state.insert("d", 1, 0);

        let below = |tier, count| Prerequisite::NodesUnlockedBelowTier { tier, count };
        assert!(below(1, 2).is_satisfied(&state));
        assert!(!below(1, 3).is_satisfied(&state));
        assert!(below(3, 3).is_satisfied(&state));
        assert!(Prerequisite::TotalNodesUnlocked { count: 3 }.is_satisfied(&state));
        assert!(!Prerequisite::TotalNodesUnlocked { count: 4 }.is_satisfied(&state));
    }

    #[test]
    fn candidates_are_ordered_by_tier_then_key() {
        let nodes = vec![
            node(1, "root", 0, &[]),
            node(2, "zeta", 1, &["root"]),
            node(3, "alpha", 1, &["root"]),
            node(4, "deep", 2, &["alpha"]),
            node(5, "gated", 1, &["-total_nodes_unlocked:2"]),
        ];
        let state = UnlockState::from_levels(nodes.iter().map(|n| (n, u32::from(n.key == "root"))));

        let set = PrerequisiteEvaluator::new(&state).candidates(&nodes);
        let keys: Vec<&str> = set.candidates.iter().map(|c| c.node.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
        assert!(set.rejected.is_empty());
    }

    #[test]
    fn multi_level_nodes_are_reoffered() {
        let nodes = vec![node(1, "upgrade", 0, &[]).with_max_level(3)];
        let mut state = UnlockState::new();
        state.insert("upgrade", 0, 2);

        let set = PrerequisiteEvaluator::new(&state).candidates(&nodes);
        assert_eq!(set.candidates.len(), 1);
        assert_eq!(set.candidates[0].current_level, 2);
        assert_eq!(set.candidates[0].target_level, 3);

        state.insert("upgrade", 0, 3);
        assert!(PrerequisiteEvaluator::new(&state).candidates(&nodes).candidates.is_empty());
    }

    #[test]
    fn malformed_prerequisites_are_reported_not_offered() {
        let nodes = vec![node(1, "broken", 0, &["-total_nodes_unlocked:zero"])];
        let state = UnlockState::new();

        let set = PrerequisiteEvaluator::new(&state).candidates(&nodes);
        assert!(set.candidates.is_empty());
        assert_eq!(set.rejected.len(), 1);
        assert_eq!(set.rejected[0].node_key, "broken");
    }

    #[test]
    fn required_nodes_follow_locked_chain() {
        let nodes = vec![
            node(1, "root", 0, &[]),
            node(2, "mid_a", 1, &["root"]),
            node(3, "mid_b", 1, &["root"]),
            node(4, "top", 2, &["mid_a", "mid_b", "-total_nodes_unlocked:1"]),
        ];
        let mut state = UnlockState::new();
        state.insert("mid_b", 1, 1);

        let required = PrerequisiteEvaluator::new(&state).required_nodes("top", &nodes);
        assert_eq!(required, vec!["mid_a", "root"]);
    }
}
