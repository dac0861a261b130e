//! Hybrid item event source: coalesced external publishes with a budgeted
//! polling fallback.

use std::collections::HashMap;

use item_core::{AccessResult, DirtyKind, EventSourceConfig, ItemAccessor, StableId};
use tracing::{debug, trace, warn};

use super::bus::{Event, EventBus, Topic};
use super::sweep::{SweepCursor, Visit};
use super::ItemPopulation;

/// Kind of an externally published change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PublishKind {
    Added,
    Removed,
    Changed,
    Moved,
    Merged,
    Split,
}

impl PublishKind {
    /// Facets to mark dirty for this change.
    pub fn dirty_kind(self) -> DirtyKind {
        match self {
            Self::Added => DirtyKind::ADDED,
            Self::Removed => DirtyKind::empty(),
            Self::Changed | Self::Moved | Self::Merged | Self::Split => DirtyKind::ALL,
        }
    }

    fn event<T>(self, item: T) -> Event<T> {
        match self {
            Self::Added => Event::Added(item),
            Self::Removed => Event::Removed(item),
            Self::Changed | Self::Moved | Self::Merged | Self::Split => Event::Changed(item),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SourceMode {
    /// Publishers are active; polling is suspended.
    ExternalActive,
    Polling,
}

#[derive(Debug)]
struct PendingEvent<T> {
    at: f64,
    kind: PublishKind,
    item: T,
    seq: u64,
}

/// What one tick of an event source did.
#[derive(Debug)]
pub struct SourceTick<T> {
    pub fired: usize,
    pub scanned: usize,
    /// Dirty marks the engine should apply for items the scan found.
    pub dirty: Vec<(T, DirtyKind)>,
}

impl<T> Default for SourceTick<T> {
    fn default() -> Self {
        Self {
            fired: 0,
            scanned: 0,
            dirty: Vec::new(),
        }
    }
}

/// Detects item additions, removals and changes.
///
/// While publishers are active (a publish or an open external-mode scope
/// within `externalIdleTimeout`, or events still pending) the source only
/// coalesces and fires published events. Otherwise it falls back to walking
/// the population `min(chunkSize, budgetPerTick)` items per scan and diffing
/// a content hash against the previous pass.
pub struct ItemEventSource<T> {
    config: EventSourceConfig,
    pending: HashMap<StableId, PendingEvent<T>>,
    next_seq: u64,
    external_depth: u32,
    last_external_at: Option<f64>,
    hint_until: f64,
    next_scan_at: f64,
    sweep: SweepCursor<T, i32>,
}

impl<T: Clone> ItemEventSource<T> {
    pub const DEFAULT_HINT_SECONDS: f64 = 2.0;
    const MIN_HINT_SECONDS: f64 = 0.05;

    pub fn new(config: EventSourceConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            next_seq: 0,
            external_depth: 0,
            last_external_at: None,
            hint_until: f64::NEG_INFINITY,
            next_scan_at: f64::NEG_INFINITY,
            sweep: SweepCursor::new(),
        }
    }

    pub fn config(&self) -> &EventSourceConfig {
        &self.config
    }

    /// Records an external change and returns the dirty facets it implies.
    ///
    /// Repeated publishes for the same item inside the coalescing window
    /// collapse into one event carrying the latest kind. Subscribers are
    /// looked up when the event fires, so a handler registered inside the
    /// window still receives it.
    pub fn publish(&mut self, kind: PublishKind, id: StableId, item: T, now: f64) -> DirtyKind {
        self.last_external_at = Some(now);
        if !self.config.enabled {
            return kind.dirty_kind();
        }

        let seq = match self.pending.get(&id) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.pending.insert(
            id,
            PendingEvent {
                at: now,
                kind,
                item,
                seq,
            },
        );
        kind.dirty_kind()
    }

    /// Opens a nested external-mode scope; polling stays off while any is open.
    pub fn begin_external_mode(&mut self, now: f64) {
        self.external_depth += 1;
        self.last_external_at = Some(now);
    }

    pub fn end_external_mode(&mut self, now: f64) {
        self.external_depth = self.external_depth.saturating_sub(1);
        self.last_external_at = Some(now);
    }

    /// Allows polling for `seconds` (floored at 0.05) from `now`.
    pub fn hint_active(&mut self, now: f64, seconds: f64) {
        let until = now + seconds.max(Self::MIN_HINT_SECONDS);
        self.hint_until = self.hint_until.max(until);
    }

    pub fn mode(&self, now: f64) -> SourceMode {
        let recently_published = self
            .last_external_at
            .is_some_and(|at| now - at < self.config.external_idle_timeout);
        if self.external_depth > 0 || recently_published || !self.pending.is_empty() {
            SourceMode::ExternalActive
        } else {
            SourceMode::Polling
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn known_count(&self) -> usize {
        self.sweep.known_count()
    }

    pub fn tick<A>(
        &mut self,
        now: f64,
        accessor: &A,
        population: Option<&dyn ItemPopulation<T>>,
        bus: &mut EventBus<T>,
    ) -> SourceTick<T>
    where
        A: ItemAccessor<Item = T>,
    {
        let mut outcome = SourceTick {
            fired: self.fire_due(now, bus),
            ..SourceTick::default()
        };

        if !self.config.enabled || !bus.has_any(&Topic::ITEM) {
            return outcome;
        }
        if self.mode(now) == SourceMode::ExternalActive {
            return outcome;
        }
        if self.config.scan_only_when_active && now > self.hint_until {
            return outcome;
        }
        if now < self.next_scan_at {
            return outcome;
        }
        let Some(population) = population else {
            return outcome;
        };
        self.next_scan_at = now + self.config.effective_scan_interval();

        self.scan(accessor, population, bus, &mut outcome);
        outcome
    }

    fn fire_due(&mut self, now: f64, bus: &mut EventBus<T>) -> usize {
        let window = self.config.coalesce_window;
        let mut due: Vec<(u64, StableId)> = self
            .pending
            .iter()
            .filter(|(_, pending)| now - pending.at >= window)
            .map(|(id, pending)| (pending.seq, *id))
            .collect();
        due.sort_unstable();

        let mut fired = 0;
        for (_, id) in &due {
            if let Some(pending) = self.pending.remove(id) {
                let event = pending.kind.event(pending.item);
                if bus.has_subscribers(event.topic()) {
                    bus.publish(&event);
                    fired += 1;
                }
            }
        }
        fired
    }

    fn scan<A>(
        &mut self,
        accessor: &A,
        population: &dyn ItemPopulation<T>,
        bus: &mut EventBus<T>,
        outcome: &mut SourceTick<T>,
    ) where
        A: ItemAccessor<Item = T>,
    {
        if self.sweep.is_exhausted() {
            match population.enumerate() {
                Ok(items) => self.sweep.refill(items),
                Err(error) => {
                    warn!(
                        target: "item_runtime::events",
                        error = %error,
                        "Population enumeration failed, skipping scan"
                    );
                    return;
                }
            }
        }

        for item in self.sweep.next_chunk(self.config.step_budget()) {
            outcome.scanned += 1;
            let id = accessor.stable_id(&item);
            let hash = match content_hash(accessor, &item) {
                Ok(hash) => hash,
                Err(error) => {
                    debug!(
                        target: "item_runtime::events",
                        id = %id,
                        error = %error,
                        "Could not hash item, keeping previous state"
                    );
                    self.sweep.touch(id);
                    continue;
                }
            };

            match self.sweep.visit(id, item.clone(), hash) {
                Visit::New => {
                    bus.publish(&Event::Added(item.clone()));
                    outcome.dirty.push((item, DirtyKind::ADDED));
                    outcome.fired += 1;
                }
                Visit::Changed => {
                    bus.publish(&Event::Changed(item.clone()));
                    outcome.dirty.push((item, DirtyKind::ALL));
                    outcome.fired += 1;
                }
                Visit::Unchanged => {}
            }
        }

        if self.sweep.is_exhausted() {
            let removed = self.sweep.finish_pass();
            trace!(
                target: "item_runtime::events",
                removed = removed.len(),
                known = self.sweep.known_count(),
                "Scan pass complete"
            );
            for item in removed {
                bus.publish(&Event::Removed(item));
                outcome.fired += 1;
            }
        }
    }
}

/// Cheap change detector over the fields most edits touch.
pub fn content_hash<A: ItemAccessor>(accessor: &A, item: &A::Item) -> AccessResult<i32> {
    let quality = accessor.quality(item)?;
    let value = accessor.value(item)?;
    let type_id = accessor.type_id(item)?;
    let variable_count = accessor.variables(item)?.len() as i32;
    let tag_count = accessor.tags(item)?.len() as i32;

    let mut hash = quality.wrapping_mul(397) ^ value;
    hash = hash.wrapping_mul(397) ^ type_id;
    Ok(hash ^ variable_count.wrapping_shl(1) ^ tag_count.wrapping_shl(2))
}
