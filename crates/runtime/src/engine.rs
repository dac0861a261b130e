//! Engine context tying the scheduler, event sources and transactions together.
//!
//! There is no global state: an [`Engine`] is built once at startup and
//! passed to every call site. All work is cooperative; nothing happens
//! between calls to [`Engine::tick`] except what callers trigger directly.

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use item_core::{
    DirtyKind, EngineConfig, FragmentMap, ItemAccessor, ItemMeta, Result, StableId,
    decode_payload,
};
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::deferred::DeferredQueue;
use crate::events::{
    ContainerLocator, Event, EventBus, ItemEventSource, ItemPopulation, PublishKind, SourceMode,
    SourceTick, SubscriptionId, Topic, WorldDropEventSource,
};
use crate::extensions::ExtensionRegistry;
use crate::locks::OwnerLocks;
use crate::metrics::FlushMetrics;
use crate::scheduler::{FlushAllReport, FlushContext, FlushReport, PersistenceScheduler};
use crate::store::{MetaStore, VariableMetaStore};
use crate::transaction::{TransactionManager, TxToken};
use crate::write::{self, CoreFieldChanges};

/// Summary of one [`Engine::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineTick {
    pub deferred_run: usize,
    pub events_fired: usize,
    pub items_scanned: usize,
    pub flushed: usize,
    pub failed: usize,
}

/// Holds one level of dirty scope; released on drop, including unwinding.
struct ScopeGuard(Rc<Cell<u32>>);

impl ScopeGuard {
    fn enter(depth: &Rc<Cell<u32>>) -> Self {
        depth.set(depth.get() + 1);
        Self(Rc::clone(depth))
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

struct WorldView<T> {
    population: Box<dyn ItemPopulation<T>>,
    locator: Box<dyn ContainerLocator<T>>,
}

/// Change-tracking persistence engine for items reached through `A`.
pub struct Engine<A: ItemAccessor + 'static> {
    config: EngineConfig,
    accessor: A,
    store: Box<dyn MetaStore<A>>,
    clock: Rc<dyn Clock>,
    extensions: ExtensionRegistry<A>,
    scheduler: PersistenceScheduler<A::Item>,
    transactions: TransactionManager,
    bus: EventBus<A::Item>,
    item_events: ItemEventSource<A::Item>,
    world_drops: WorldDropEventSource<A::Item>,
    population: Option<Box<dyn ItemPopulation<A::Item>>>,
    world: Option<WorldView<A::Item>>,
    locks: OwnerLocks,
    deferred: DeferredQueue<Engine<A>>,
    metrics: Arc<FlushMetrics>,
    /// Depth of scopes in which dirty marks count under `explicitOnly`.
    dirty_scope: Rc<Cell<u32>>,
    /// Items whose embedded fragments were already applied by `restore`.
    applied: HashSet<StableId>,
}

impl<A: ItemAccessor + 'static> Engine<A> {
    pub fn builder(accessor: A) -> EngineBuilder<A> {
        EngineBuilder::new(accessor)
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<FlushMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn scheduler(&self) -> &PersistenceScheduler<A::Item> {
        &self.scheduler
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry<A> {
        &mut self.extensions
    }

    pub fn stable_id(&self, item: &A::Item) -> StableId {
        self.accessor.stable_id(item)
    }

    // ----------------------------------------------------------------------
    // Dirty tracking and write-back
    // ----------------------------------------------------------------------

    /// Queues `item` for write-back. Returns whether the mark was accepted.
    ///
    /// Under `explicitOnly` marks outside [`Engine::with_dirty_scope`] are
    /// ignored.
    pub fn mark_dirty(&mut self, item: &A::Item, kind: DirtyKind) -> bool {
        self.enqueue(item, kind, false)
    }

    /// Like [`Engine::mark_dirty`] but the item is flushed on the next tick.
    pub fn mark_dirty_immediate(&mut self, item: &A::Item, kind: DirtyKind) -> bool {
        self.enqueue(item, kind, true)
    }

    fn enqueue(&mut self, item: &A::Item, kind: DirtyKind, immediate: bool) -> bool {
        if kind.is_empty() {
            return false;
        }
        let id = self.accessor.stable_id(item);
        if self.config.persistence.explicit_only && self.dirty_scope.get() == 0 {
            trace!(
                target: "item_runtime::scheduler",
                id = %id,
                dirty = ?kind,
                "Dirty mark outside allowed scope ignored"
            );
            return false;
        }
        let now = self.clock.now();
        self.scheduler
            .enqueue_dirty(id, item.clone(), kind, immediate, now);
        true
    }

    /// Runs `f` with dirty marks allowed even under `explicitOnly`.
    pub fn with_dirty_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let _scope = ScopeGuard::enter(&self.dirty_scope);
        f(self)
    }

    /// Flushes `item` synchronously. See [`PersistenceScheduler::flush`].
    pub fn flush(&mut self, item: &A::Item, force: bool) -> Result<Option<FlushReport>> {
        let ctx = FlushContext::new(
            &self.accessor,
            self.store.as_ref(),
            &self.extensions,
            &self.config.persistence,
            &self.metrics,
        );
        self.scheduler.flush(item, force, &ctx)
    }

    /// Flushes every queued item synchronously, e.g. on shutdown.
    pub fn flush_all(&mut self, reason: &str) -> FlushAllReport {
        let ctx = FlushContext::new(
            &self.accessor,
            self.store.as_ref(),
            &self.extensions,
            &self.config.persistence,
            &self.metrics,
        );
        self.scheduler.flush_all(reason, &ctx)
    }

    /// Drains the queue over the next ticks instead of in one stall.
    pub fn request_flush_all_deferred(&mut self) -> usize {
        self.scheduler.request_flush_all_deferred()
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Advances the engine one step.
    ///
    /// Order: deferred tasks queued before this tick, item events, world
    /// drops, then up to `maxPerTick` due write-backs.
    pub fn tick(&mut self) -> EngineTick {
        let now = self.clock.now();
        let deferred_run = self.run_deferred();

        let item_tick = self.item_events.tick(
            now,
            &self.accessor,
            self.population.as_deref(),
            &mut self.bus,
        );
        let world_tick = match &self.world {
            Some(world) => self.world_drops.tick(
                now,
                &self.accessor,
                world.population.as_ref(),
                world.locator.as_ref(),
                &mut self.bus,
            ),
            None => SourceTick::default(),
        };

        let events_fired = item_tick.fired + world_tick.fired;
        let items_scanned = item_tick.scanned + world_tick.scanned;
        for (item, kind) in item_tick.dirty {
            self.mark_dirty(&item, kind);
        }

        let ctx = FlushContext::new(
            &self.accessor,
            self.store.as_ref(),
            &self.extensions,
            &self.config.persistence,
            &self.metrics,
        );
        let flush = self.scheduler.tick(now, &ctx);

        EngineTick {
            deferred_run,
            events_fired,
            items_scanned,
            flushed: flush.flushed,
            failed: flush.failed,
        }
    }

    // ----------------------------------------------------------------------
    // Deferred tasks
    // ----------------------------------------------------------------------

    /// Runs `task` at the start of the next tick.
    pub fn defer(&mut self, task: impl FnOnce(&mut Self) + 'static) {
        self.deferred.push(Box::new(task));
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    fn run_deferred(&mut self) -> usize {
        let batch = self.deferred.take_batch();
        let count = batch.len();
        for task in batch {
            task(self);
        }
        count
    }

    // ----------------------------------------------------------------------
    // Transactions
    // ----------------------------------------------------------------------

    pub fn begin(&mut self, item: &A::Item) -> Result<TxToken> {
        let now = self.clock.now();
        self.transactions.begin(&self.accessor, item, now)
    }

    /// Closes the transaction and schedules a full write-back of the item.
    pub fn commit(&mut self, item: &A::Item, token: TxToken) -> Result<()> {
        let id = self.accessor.stable_id(item);
        self.transactions.commit(id, token)?;
        self.with_dirty_scope(|engine| engine.mark_dirty(item, DirtyKind::ALL));
        debug!(target: "item_runtime::transaction", id = %id, token = %token, "Transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self, item: &A::Item, token: TxToken) -> Result<()> {
        self.transactions.rollback(&self.accessor, item, token)
    }

    // ----------------------------------------------------------------------
    // Events
    // ----------------------------------------------------------------------

    /// Reports an external change. The item is marked dirty with the facets
    /// the change implies and an event fires once the coalescing window
    /// passes.
    pub fn publish(&mut self, kind: PublishKind, item: &A::Item) -> DirtyKind {
        let now = self.clock.now();
        let id = self.accessor.stable_id(item);
        let mask = self.item_events.publish(kind, id, item.clone(), now);
        self.mark_dirty(item, mask);
        mask
    }

    pub fn begin_external_mode(&mut self) {
        let now = self.clock.now();
        self.item_events.begin_external_mode(now);
    }

    pub fn end_external_mode(&mut self) {
        let now = self.clock.now();
        self.item_events.end_external_mode(now);
    }

    /// Allows both sources to scan for the default hint window.
    pub fn hint_active(&mut self) {
        self.hint_active_for(ItemEventSource::<A::Item>::DEFAULT_HINT_SECONDS);
    }

    pub fn hint_active_for(&mut self, seconds: f64) {
        let now = self.clock.now();
        self.item_events.hint_active(now, seconds);
        self.world_drops.hint_active(now, seconds);
    }

    pub fn source_mode(&self) -> SourceMode {
        self.item_events.mode(self.clock.now())
    }

    pub fn subscribe(
        &mut self,
        topic: Topic,
        handler: impl FnMut(&Event<A::Item>) + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe(topic, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ----------------------------------------------------------------------
    // Restore
    // ----------------------------------------------------------------------

    /// Re-applies the persisted record onto `item`.
    ///
    /// Non-empty name and positive scalar fields are written back, modifiers
    /// are reapplied, and embedded fragments go to their appliers. Fragments
    /// are applied at most once per item for the lifetime of the engine; an
    /// unreadable payload does not count.
    pub fn restore(&mut self, item: &A::Item) -> Result<Option<ItemMeta>> {
        let Some(meta) = self.store.try_extract_meta(&self.accessor, item)? else {
            return Ok(None);
        };
        let id = self.accessor.stable_id(item);

        let positive = |v: i32| (v > 0).then_some(v);
        let changes = CoreFieldChanges {
            name: Some(meta.name_key.clone()).filter(|name| !name.is_empty()),
            type_id: positive(meta.type_id),
            quality: positive(meta.quality),
            display_quality: positive(meta.display_quality),
            value: positive(meta.value),
        };
        if !changes.is_empty() {
            write::write_core_fields(&self.accessor, item, &changes)?;
        }

        if let Err(error) = self.accessor.reapply_modifiers(item) {
            debug!(
                target: "item_runtime::store",
                id = %id,
                error = %error,
                "Reapplying modifiers after restore failed"
            );
        }

        if meta.has_payload() && !self.applied.contains(&id) {
            match decode_fragments(&meta) {
                Ok(fragments) => {
                    let applied = self
                        .extensions
                        .apply(&self.accessor, item, &meta, &fragments);
                    self.applied.insert(id);
                    debug!(
                        target: "item_runtime::store",
                        id = %id,
                        fragments = fragments.len(),
                        applied,
                        "Extension fragments restored"
                    );
                }
                Err(error) => warn!(
                    target: "item_runtime::store",
                    id = %id,
                    error = %error,
                    "Embedded payload unreadable, fragments skipped"
                ),
            }
        }

        Ok(Some(meta))
    }

    // ----------------------------------------------------------------------
    // Owner locks
    // ----------------------------------------------------------------------

    pub fn try_lock(&mut self, item: &A::Item, owner: &str) -> Result<()> {
        let id = self.accessor.stable_id(item);
        self.locks.try_lock(id, owner)
    }

    pub fn unlock(&mut self, item: &A::Item, owner: &str) -> bool {
        let id = self.accessor.stable_id(item);
        self.locks.unlock(id, owner)
    }

    pub fn lock_holder(&self, item: &A::Item) -> Option<&str> {
        self.locks.holder(self.accessor.stable_id(item))
    }
}

fn decode_fragments(meta: &ItemMeta) -> Result<FragmentMap> {
    let stored = meta.embedded_json.as_deref().unwrap_or_default();
    let json = decode_payload(stored)?;
    Ok(serde_json::from_str(&json)?)
}

/// Builder for [`Engine`].
pub struct EngineBuilder<A: ItemAccessor + 'static> {
    accessor: A,
    config: EngineConfig,
    store: Option<Box<dyn MetaStore<A>>>,
    clock: Option<Rc<dyn Clock>>,
    extensions: Option<ExtensionRegistry<A>>,
    population: Option<Box<dyn ItemPopulation<A::Item>>>,
    world: Option<WorldView<A::Item>>,
}

impl<A: ItemAccessor + 'static> EngineBuilder<A> {
    fn new(accessor: A) -> Self {
        Self {
            accessor,
            config: EngineConfig::default(),
            store: None,
            clock: None,
            extensions: None,
            population: None,
            world: None,
        }
    }

    /// Override engine configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Write-back target (default: [`VariableMetaStore`])
    pub fn store(mut self, store: impl MetaStore<A> + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Time source (default: [`SystemClock`])
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Extension registry (default: built-in extensions only)
    pub fn extensions(mut self, extensions: ExtensionRegistry<A>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Population scanned by the polling fallback
    pub fn population(mut self, population: impl ItemPopulation<A::Item> + 'static) -> Self {
        self.population = Some(Box::new(population));
        self
    }

    /// World items and container lookup for world-drop detection
    pub fn world(
        mut self,
        population: impl ItemPopulation<A::Item> + 'static,
        locator: impl ContainerLocator<A::Item> + 'static,
    ) -> Self {
        self.world = Some(WorldView {
            population: Box::new(population),
            locator: Box::new(locator),
        });
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<Engine<A>> {
        self.config.validate()?;

        Ok(Engine {
            item_events: ItemEventSource::new(self.config.events.clone()),
            world_drops: WorldDropEventSource::new(self.config.world_drops.clone()),
            config: self.config,
            accessor: self.accessor,
            store: self
                .store
                .unwrap_or_else(|| Box::new(VariableMetaStore::new())),
            clock: self.clock.unwrap_or_else(|| Rc::new(SystemClock::new())),
            extensions: self.extensions.unwrap_or_else(ExtensionRegistry::with_builtin),
            scheduler: PersistenceScheduler::new(),
            transactions: TransactionManager::new(),
            bus: EventBus::new(),
            population: self.population,
            world: self.world,
            locks: OwnerLocks::new(),
            deferred: DeferredQueue::new(),
            metrics: Arc::new(FlushMetrics::new()),
            dirty_scope: Rc::default(),
            applied: HashSet::new(),
        })
    }
}
