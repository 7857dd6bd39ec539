//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use progression_core::{
    ModifierConfig, ModifierKind, NodeId, NodeSize, NodeType, ProgressionConfig, ProgressionNode,
};
use progression_runtime::{
    EventKind, InMemoryEventBus, InMemoryProgressionRepository, ProgressionEvent,
    ProgressionOrchestrator,
};
use tokio::sync::broadcast;

pub struct Harness {
    pub orchestrator: ProgressionOrchestrator,
    pub repo: Arc<InMemoryProgressionRepository>,
    pub bus: InMemoryEventBus,
}

impl Harness {
    pub async fn new(nodes: Vec<ProgressionNode>) -> Self {
        Self::with_config(nodes, ProgressionConfig::default()).await
    }

    pub async fn with_config(nodes: Vec<ProgressionNode>, config: ProgressionConfig) -> Self {
        let repo = Arc::new(InMemoryProgressionRepository::with_nodes(nodes));
        let bus = InMemoryEventBus::new();
        let orchestrator = ProgressionOrchestrator::builder()
            .config(config)
            .repository(repo.clone())
            .event_bus(Arc::new(bus.clone()))
            .build();

        Self {
            orchestrator,
            repo,
            bus,
        }
    }

    pub fn events(&self, kind: EventKind) -> broadcast::Receiver<ProgressionEvent> {
        self.bus.subscribe_channel(kind)
    }
}

/// Tier 0 small feature: costs 50.
pub fn feature(id: u64, key: &str) -> ProgressionNode {
    node(id, key, NodeType::Feature, 0, NodeSize::Small)
}

pub fn node(id: u64, key: &str, node_type: NodeType, tier: i32, size: NodeSize) -> ProgressionNode {
    ProgressionNode::new(NodeId(id), key, node_type, tier, size).expect("valid tier")
}

/// Multiplicative `progression_rate` upgrade.
pub fn rate_upgrade(id: u64, key: &str, per_level: f64) -> ProgressionNode {
    node(id, key, NodeType::Upgrade, 0, NodeSize::Small)
        .with_max_level(5)
        .with_modifier(ModifierConfig::new(
            "progression_rate",
            ModifierKind::Multiplicative,
            per_level,
        ))
}

/// Everything currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<ProgressionEvent>) -> Vec<ProgressionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
