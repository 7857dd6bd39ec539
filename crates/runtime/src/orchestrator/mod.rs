//! Progression orchestrator and builder.
//!
//! The orchestrator owns the caches, the unlock worker, and the collaborators
//! (repository, event bus, identity resolver). Every state transition runs
//! under a single async mutex so concurrent votes and contributions observe
//! a consistent ledger. Read paths never take that mutex.

mod admin;
mod engagement;
mod queries;
mod unlock;
mod voting;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use progression_core::{
    CandidateSet, NodeId, PrerequisiteEvaluator, ProgressionConfig, ProgressionNode, UnlockProgress,
    UnlockState, VoteClock,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{IdentityResolver, PlatformIdentity, Result, RuntimeError, StorageContext};
use crate::cache::{CacheInvalidationHandler, ModifierCache, UnlockCache};
use crate::events::{EventBus, EventHandler, EventKind, InMemoryEventBus, ProgressionEvent, SubscriptionId};
use crate::modifiers::ModifierEngine;
use crate::repository::{InMemoryProgressionRepository, ProgressionRepository};
use crate::workers::{UnlockScheduler, UnlockWorker};

pub use admin::SyncReport;
pub use engagement::PROGRESSION_RATE_FEATURE;
pub use queries::{ProgressionStatus, TreeNodeView};
pub use voting::VotingOutcome;

/// State shared between orchestrator handles and the unlock worker.
pub(crate) struct Shared {
    repo: Arc<dyn ProgressionRepository>,
    bus: Arc<dyn EventBus>,
    identity: Arc<dyn IdentityResolver>,
    config: ProgressionConfig,
    unlock_cache: Arc<UnlockCache>,
    modifier_cache: Arc<ModifierCache>,
    modifiers: ModifierEngine,
    /// Serializes every state transition.
    transitions: tokio::sync::Mutex<()>,
    scheduler: UnlockScheduler,
    clock: VoteClock,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Coordinates voting, contributions, and unlocks for one progression tree.
///
/// Cheap to clone; clones share state. The unlock worker stops once
/// [`ProgressionOrchestrator::shutdown`] runs or every clone is dropped.
#[derive(Clone)]
pub struct ProgressionOrchestrator {
    shared: Arc<Shared>,
}

impl ProgressionOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn config(&self) -> &ProgressionConfig {
        &self.shared.config
    }

    pub fn repository(&self) -> Arc<dyn ProgressionRepository> {
        Arc::clone(&self.shared.repo)
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.shared.bus)
    }

    pub fn unlock_cache(&self) -> &UnlockCache {
        &self.shared.unlock_cache
    }

    pub fn modifier_cache(&self) -> &ModifierCache {
        &self.shared.modifier_cache
    }

    /// Stops the unlock worker.
    ///
    /// New check requests are refused, the cache handlers are removed from the
    /// bus, and checks already queued run to completion. Fails with
    /// [`RuntimeError::ShutdownTimedOut`] if the worker is still busy at
    /// `deadline`.
    pub async fn shutdown(&self, deadline: Instant) -> Result<()> {
        let subscriptions = std::mem::take(
            &mut *self
                .shared
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for id in subscriptions {
            if !self.shared.bus.unsubscribe(id) {
                debug!(subscription = %id, "cache handler already unsubscribed");
            }
        }

        self.shared.scheduler.close();

        let handle = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout_at(deadline, handle).await {
            Ok(joined) => {
                joined.map_err(RuntimeError::WorkerJoin)?;
                info!("progression orchestrator shut down");
                Ok(())
            }
            Err(_) => {
                warn!("unlock worker still running at shutdown deadline");
                Err(RuntimeError::ShutdownTimedOut)
            }
        }
    }

    fn publish(&self, event: ProgressionEvent) {
        debug!(kind = %event.kind(), "publishing progression event");
        self.shared.bus.publish(event);
    }

    /// Active progress, created empty when none exists. Caller holds the
    /// transition lock.
    async fn ensure_progress(&self) -> Result<UnlockProgress> {
        let repo = &self.shared.repo;
        if let Some(progress) = repo.active_progress().await.op("active_progress")? {
            return Ok(progress);
        }
        let progress = repo.create_progress(0).await.op("create_progress")?;
        debug!(progress_id = %progress.id, "created unlock progress");
        Ok(progress)
    }

    /// Every node with its current level, read from the repository.
    async fn unlock_levels(&self) -> Result<(Vec<ProgressionNode>, UnlockState)> {
        let repo = &self.shared.repo;
        let nodes = repo.all_nodes().await.op("all_nodes")?;
        let levels: HashMap<NodeId, u32> = repo
            .all_unlocks()
            .await
            .op("all_unlocks")?
            .into_iter()
            .map(|unlock| (unlock.node_id, unlock.current_level))
            .collect();

        let state = UnlockState::from_levels(
            nodes
                .iter()
                .map(|node| (node, levels.get(&node.id).copied().unwrap_or(0))),
        );
        Ok((nodes, state))
    }

    async fn candidate_set(&self) -> Result<CandidateSet> {
        let (nodes, state) = self.unlock_levels().await?;
        let set = PrerequisiteEvaluator::new(&state).candidates(&nodes);
        for rejected in &set.rejected {
            warn!(node_key = %rejected.node_key, error = %rejected.error, "skipping node with invalid prerequisites");
        }
        Ok(set)
    }
}

/// Builder for [`ProgressionOrchestrator`].
///
/// Unset collaborators default to in-memory implementations.
pub struct OrchestratorBuilder {
    config: ProgressionConfig,
    repo: Option<Arc<dyn ProgressionRepository>>,
    bus: Option<Arc<dyn EventBus>>,
    identity: Option<Arc<dyn IdentityResolver>>,
}

impl OrchestratorBuilder {
    fn new() -> Self {
        Self {
            config: ProgressionConfig::default(),
            repo: None,
            bus: None,
            identity: None,
        }
    }

    /// Override progression configuration
    pub fn config(mut self, config: ProgressionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(mut self, repo: Arc<dyn ProgressionRepository>) -> Self {
        self.repo = Some(repo);
        self
    }

    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Build the orchestrator and spawn its unlock worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> ProgressionOrchestrator {
        let config = self.config;
        let repo = self
            .repo
            .unwrap_or_else(|| Arc::new(InMemoryProgressionRepository::new()));
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InMemoryEventBus::with_capacity(config.event_buffer_size)));
        let identity = self.identity.unwrap_or_else(|| Arc::new(PlatformIdentity));

        let unlock_cache = Arc::new(UnlockCache::new());
        let modifier_cache = Arc::new(ModifierCache::new(config.modifier_cache_ttl()));
        let modifiers = ModifierEngine::new(Arc::clone(&repo), Arc::clone(&modifier_cache));

        let invalidation: Arc<dyn EventHandler> = Arc::new(CacheInvalidationHandler::new(
            Arc::clone(&unlock_cache),
            Arc::clone(&modifier_cache),
        ));
        let subscriptions: Vec<SubscriptionId> = [EventKind::NodeUnlocked, EventKind::NodeRelocked, EventKind::TreeReset]
            .into_iter()
            .map(|kind| bus.subscribe(kind, Arc::clone(&invalidation)))
            .collect();

        let (scheduler, rx) = UnlockScheduler::new();
        let pending = scheduler.pending_flag();

        let shared = Arc::new_cyclic(|weak| {
            let worker = UnlockWorker::new(weak.clone(), rx, pending);
            let handle = tokio::spawn(worker.run());

            Shared {
                repo,
                bus,
                identity,
                config,
                unlock_cache,
                modifier_cache,
                modifiers,
                transitions: tokio::sync::Mutex::new(()),
                scheduler,
                clock: VoteClock::new(),
                subscriptions: Mutex::new(subscriptions),
                worker: Mutex::new(Some(handle)),
            }
        });

        info!(
            max_voting_options = shared.config.max_voting_options,
            modifier_cache_ttl_secs = shared.config.modifier_cache_ttl_secs,
            "progression orchestrator started"
        );

        ProgressionOrchestrator { shared }
    }
}
