//! Value modifiers attached to tech-tree nodes.
//!
//! Several nodes may modify the same feature (for example three upgrades all
//! raising `progression_rate`). The stack applies them one after another in
//! the order given, each feeding its output into the next:
//!
//! ```text
//! multiplicative  v * (1 + level * step)
//! linear          v + level * step
//! fixed           base + level * step          (ignores v)
//! percentage      base + level * step          (ignores v)
//! ```
//!
//! Each result is clamped to the modifier's optional `[min, max]` bounds.

use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ModifierKind {
    Multiplicative,
    Linear,
    Fixed,
    /// Same formula as [`ModifierKind::Fixed`]; kept as a separate label for
    /// authored content.
    Percentage,
}

/// Authored modifier settings for a node.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierConfig {
    pub feature_key: String,
    pub kind: ModifierKind,
    pub base_value: f64,
    pub per_level_value: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_value: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_value: Option<f64>,
}

impl ModifierConfig {
    pub fn new(feature_key: impl Into<String>, kind: ModifierKind, per_level_value: f64) -> Self {
        Self {
            feature_key: feature_key.into(),
            kind,
            base_value: 1.0,
            per_level_value,
            min_value: None,
            max_value: None,
        }
    }

    pub fn with_base_value(mut self, base_value: f64) -> Self {
        self.base_value = base_value;
        self
    }

    pub fn with_bounds(mut self, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }
}

/// A node's modifier resolved against its current unlock level.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueModifier {
    pub node_key: String,
    pub config: ModifierConfig,
    pub current_level: u32,
}

impl ValueModifier {
    pub fn new(node_key: impl Into<String>, config: ModifierConfig, current_level: u32) -> Self {
        Self {
            node_key: node_key.into(),
            config,
            current_level,
        }
    }

    /// Applies this modifier to `value`, then clamps.
    pub fn apply(&self, value: f64) -> f64 {
        let level = f64::from(self.current_level);
        let step = self.config.per_level_value;

        let result = match self.config.kind {
            ModifierKind::Multiplicative => value * (1.0 + level * step),
            ModifierKind::Linear => value + level * step,
            ModifierKind::Fixed | ModifierKind::Percentage => self.config.base_value + level * step,
        };

        self.clamp(result)
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut value = value;
        if let Some(min) = self.config.min_value {
            value = value.max(min);
        }
        if let Some(max) = self.config.max_value {
            value = value.min(max);
        }
        value
    }
}

/// Output of [`ModifierStack::apply`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StackedValue {
    pub value: f64,
    /// Sum of current levels across every modifier in the stack.
    pub total_level: u32,
}

/// Ordered collection of modifiers for one feature.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModifierStack {
    modifiers: Vec<ValueModifier>,
}

impl ModifierStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, modifier: ValueModifier) {
        self.modifiers.push(modifier);
    }

    pub fn extend(&mut self, modifiers: impl IntoIterator<Item = ValueModifier>) {
        self.modifiers.extend(modifiers);
    }

    /// Folds `base` through every modifier in insertion order.
    pub fn apply(&self, base: f64) -> StackedValue {
        self.modifiers.iter().fold(
            StackedValue {
                value: base,
                total_level: 0,
            },
            |acc, modifier| StackedValue {
                value: modifier.apply(acc.value),
                total_level: acc.total_level.saturating_add(modifier.current_level),
            },
        )
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValueModifier> {
        self.modifiers.iter()
    }
}

impl FromIterator<ValueModifier> for ModifierStack {
    fn from_iter<T: IntoIterator<Item = ValueModifier>>(iter: T) -> Self {
        Self {
            modifiers: iter.into_iter().collect(),
        }
    }
}
