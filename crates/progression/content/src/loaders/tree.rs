//! Tech-tree loader.

use std::path::Path;

use progression_core::ProgressionNode;

use crate::loaders::{LoadResult, read_file};
use crate::tree::TreeDefinition;

/// Loader for tech-tree definitions from RON or TOML files.
///
/// The format is chosen by file extension (`.ron` or `.toml`).
pub struct TreeLoader;

impl TreeLoader {
    /// Load a tree definition without validating it.
    pub fn load(path: &Path) -> LoadResult<TreeDefinition> {
        let content = read_file(path)?;
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "ron" => Self::parse_ron(&content),
            "toml" => Self::parse_toml(&content),
            other => Err(anyhow::anyhow!(
                "Unsupported tree format '{}' for {}: expected .ron or .toml",
                other,
                path.display()
            )),
        }
    }

    /// Load, validate, and convert a tree into runtime nodes.
    pub fn load_nodes(path: &Path) -> LoadResult<(TreeDefinition, Vec<ProgressionNode>)> {
        let definition = Self::load(path)?;
        let nodes = definition
            .into_nodes()
            .map_err(|e| anyhow::anyhow!("Invalid tree {}: {}", path.display(), e))?;
        Ok((definition, nodes))
    }

    pub fn parse_ron(content: &str) -> LoadResult<TreeDefinition> {
        ron::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse tree RON: {}", e))
    }

    pub fn parse_toml(content: &str) -> LoadResult<TreeDefinition> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse tree TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progression_core::{ModifierKind, NodeType};
    use std::io::Write;

    const TREE_RON: &str = r#"(
    version: "1.0",
    description: "starter tree",
    nodes: [
        (
            key: "progression_system",
            name: "Progression",
            type: feature,
            tier: 0,
            size: "small",
            auto_unlock: true,
            cost: Some(0),
        ),
        (
            key: "upgrade_progression_basic",
            name: "Faster Progress",
            type: upgrade,
            tier: 1,
            size: "medium",
            max_level: 5,
            prerequisites: ["progression_system"],
            modifier: Some((
                feature_key: "progression_rate",
                kind: multiplicative,
                base_value: 1.0,
                per_level_value: 0.1,
            )),
        ),
    ],
)"#;

    const TREE_TOML: &str = r#"
version = "1.0"

[[nodes]]
key = "item_lootbox0"
name = "Lootbox"
type = "item"
tier = 0
size = "small"

[[nodes]]
key = "feature_buy"
name = "Buy"
type = "feature"
tier = 1
size = "large"
prerequisites = ["item_lootbox0", "-total_nodes_unlocked:1"]
"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_ron_tree() {
        let file = write_temp(".ron", TREE_RON);
        let (definition, nodes) = TreeLoader::load_nodes(file.path()).unwrap();

        assert_eq!(definition.version, "1.0");
        assert_eq!(definition.auto_unlock_keys(), vec!["progression_system"]);
        assert_eq!(nodes[0].unlock_cost, 0);
        assert_eq!(nodes[1].node_type, NodeType::Upgrade);
        assert_eq!(nodes[1].max_level, 5);
        let modifier = nodes[1].modifier.as_ref().unwrap();
        assert_eq!(modifier.kind, ModifierKind::Multiplicative);
        assert_eq!(modifier.min_value, None);
    }

    #[test]
    fn loads_toml_tree() {
        let file = write_temp(".toml", TREE_TOML);
        let (_, nodes) = TreeLoader::load_nodes(file.path()).unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_type, NodeType::Item);
        assert_eq!(nodes[0].max_level, 1);
        assert_eq!(nodes[1].unlock_cost, 300);
        assert_eq!(nodes[1].prerequisites.len(), 2);
    }

    #[test]
    fn invalid_tree_reports_path() {
        let file = write_temp(
            ".toml",
            "[[nodes]]\nkey = \"a\"\nname = \"A\"\ntype = \"feature\"\ntier = 0\nsize = \"small\"\nprerequisites = [\"missing\"]\n",
        );
        let err = TreeLoader::load_nodes(file.path()).unwrap_err();
        assert!(err.to_string().contains("requires unknown node 'missing'"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let file = write_temp(".json", "{}");
        let err = TreeLoader::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported tree format"));
    }
}
