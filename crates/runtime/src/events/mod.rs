//! Kind-based event bus for progression events.
//!
//! The orchestrator publishes [`ProgressionEvent`]s through the [`EventBus`]
//! trait. Synchronous handlers (cache invalidation) run inside `publish`;
//! [`InMemoryEventBus`] additionally fans events out to broadcast channels.

mod bus;
mod types;

pub use bus::{EventBus, EventHandler, InMemoryEventBus, SubscriptionId};
pub use types::{EventKind, ProgressionEvent};
