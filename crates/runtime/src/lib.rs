//! Change-tracking persistence runtime for game items.
//!
//! Gameplay code reports item mutations; this crate batches them, writes a
//! compact meta record per item through a pluggable [`MetaStore`], detects
//! item events by publish or by budgeted polling, and offers snapshot-based
//! transactions. Consumers build one [`Engine`] and call [`Engine::tick`]
//! once per frame.
//!
//! Modules are organized by responsibility:
//! - [`engine`] hosts the context object and its builder
//! - [`scheduler`] coalesces dirty marks and throttles write-back
//! - [`events`] detects additions, removals, changes and world drops
//! - [`transaction`] snapshots items and restores them on rollback
//! - [`extensions`] lets plugins contribute and restore payload fragments
//! - [`store`] and [`memory`] provide adapters reused by tests and hosts
pub mod clock;
pub mod engine;
pub mod events;
pub mod extensions;
pub mod locks;
pub mod memory;
pub mod metrics;
pub mod scheduler;
pub mod store;
pub mod transaction;
pub mod write;

mod deferred;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineBuilder, EngineTick};
pub use events::{
    ContainerLocator, Event, EventBus, ItemEventSource, ItemPopulation, PublishKind, SourceMode,
    SubscriptionId, Topic, WorldDropEventSource,
};
pub use extensions::{
    ExtensionCriticality, ExtensionRegistry, MetaEnricher, StateApplier, StateContributor,
    StatsExtension,
};
pub use locks::OwnerLocks;
pub use metrics::{FlushMetrics, FlushMetricsSnapshot};
pub use scheduler::{
    DirtyEntry, FlushAllReport, FlushContext, FlushReport, PersistenceScheduler, TickOutcome,
};
pub use store::{InMemoryMetaStore, MetaStore, VariableMetaStore};
pub use transaction::{TransactionManager, TxToken};

pub use item_core::{DirtyKind, EngineConfig, EngineError, ErrorCode, ItemAccessor, Result};
