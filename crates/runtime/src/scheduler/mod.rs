//! Coalescing, throttled write-back queue.
//!
//! One [`DirtyEntry`] per stable id accumulates dirty kinds until the entry is
//! due: flagged immediate, quiet for `delaySeconds`, or first marked at least
//! `maxDelaySeconds` ago. Each [`PersistenceScheduler::tick`] flushes at most
//! `maxPerTick` due entries in first-enqueue order, so a burst of N items
//! drains over `ceil(N / maxPerTick)` ticks.
//!
//! Write-back is at-most-once: an entry is retired when its flush is
//! attempted, whether or not the flush succeeds.

mod flush;

pub use flush::{FlushContext, FlushReport};

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use item_core::{DirtyKind, ItemAccessor, PersistenceConfig, Result, StableId};
use tracing::{debug, info};

/// Pending write-back for one item.
#[derive(Clone, Debug)]
pub struct DirtyEntry<T> {
    /// Most recent handle seen for the item.
    pub item: T,
    pub kind: DirtyKind,
    pub first_dirty_at: f64,
    pub last_dirty_at: f64,
    /// Sticky until flushed.
    pub immediate: bool,
    seq: u64,
}

impl<T> DirtyEntry<T> {
    pub fn is_due(&self, now: f64, config: &PersistenceConfig) -> bool {
        self.immediate
            || now - self.last_dirty_at >= config.delay_seconds
            || now - self.first_dirty_at >= config.max_delay_seconds
    }
}

/// Result of one scheduler tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub flushed: usize,
    pub failed: usize,
}

impl TickOutcome {
    pub fn processed(&self) -> usize {
        self.flushed + self.failed
    }
}

/// Result of a synchronous flush of the whole queue.
#[derive(Clone, Debug, Default)]
pub struct FlushAllReport {
    pub flushed: usize,
    pub failed: usize,
    pub payload_bytes: usize,
    pub elapsed: Duration,
    pub max_item_time: Duration,
}

#[derive(Debug)]
pub struct PersistenceScheduler<T> {
    entries: HashMap<StableId, DirtyEntry<T>>,
    /// Enqueue sequence -> id; iteration order is flush order.
    order: BTreeMap<u64, StableId>,
    next_seq: u64,
    processed_total: u64,
}

impl<T: Clone> PersistenceScheduler<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            processed_total: 0,
        }
    }

    /// Records a dirty mark. Returns `true` when a new entry was created.
    ///
    /// Repeated marks OR into the existing entry, refresh `last_dirty_at` and
    /// keep the entry's original position in the flush order.
    pub fn enqueue_dirty(
        &mut self,
        id: StableId,
        item: T,
        kind: DirtyKind,
        immediate: bool,
        now: f64,
    ) -> bool {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.kind |= kind;
            entry.last_dirty_at = now;
            entry.immediate |= immediate;
            entry.item = item;
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id);
        self.entries.insert(
            id,
            DirtyEntry {
                item,
                kind,
                first_dirty_at: now,
                last_dirty_at: now,
                immediate,
                seq,
            },
        );
        true
    }

    /// Flushes up to `maxPerTick` due entries.
    pub fn tick<A>(&mut self, now: f64, ctx: &FlushContext<'_, A>) -> TickOutcome
    where
        A: ItemAccessor<Item = T> + 'static,
    {
        let config = ctx.config();
        let due: Vec<StableId> = self
            .order
            .values()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .is_some_and(|entry| entry.is_due(now, config))
            })
            .take(config.max_per_tick)
            .copied()
            .collect();

        let mut outcome = TickOutcome::default();
        for id in due {
            let Some(entry) = self.take(id) else {
                continue;
            };
            match ctx.flush(&entry.item, entry.kind) {
                Ok(_) => outcome.flushed += 1,
                Err(_) => outcome.failed += 1,
            }
        }
        outcome
    }

    /// Flushes one item now.
    ///
    /// A queued item is flushed with its accumulated kind and its entry is
    /// retired. An item that is not queued is only flushed when `force` is
    /// set, with kind `ALL`; otherwise `Ok(None)` is returned.
    pub fn flush<A>(
        &mut self,
        item: &T,
        force: bool,
        ctx: &FlushContext<'_, A>,
    ) -> Result<Option<FlushReport>>
    where
        A: ItemAccessor<Item = T> + 'static,
    {
        let id = ctx.stable_id(item);
        let kind = match self.take(id) {
            Some(entry) => entry.kind,
            None if force => {
                self.processed_total += 1;
                DirtyKind::ALL
            }
            None => return Ok(None),
        };
        ctx.flush(item, kind).map(Some)
    }

    /// Synchronously flushes every queued entry in enqueue order.
    pub fn flush_all<A>(&mut self, reason: &str, ctx: &FlushContext<'_, A>) -> FlushAllReport
    where
        A: ItemAccessor<Item = T> + 'static,
    {
        let started = Instant::now();
        let mut report = FlushAllReport::default();

        let ids: Vec<StableId> = self.order.values().copied().collect();
        for id in ids {
            let Some(entry) = self.take(id) else {
                continue;
            };
            match ctx.flush(&entry.item, entry.kind) {
                Ok(item_report) => {
                    report.flushed += 1;
                    report.payload_bytes += item_report.payload_bytes;
                    report.max_item_time = report.max_item_time.max(item_report.elapsed);
                }
                Err(_) => report.failed += 1,
            }
        }

        report.elapsed = started.elapsed();
        let attempted = (report.flushed + report.failed).max(1) as u32;
        info!(
            target: "item_runtime::scheduler",
            reason,
            flushed = report.flushed,
            failed = report.failed,
            payload_bytes = report.payload_bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            avg_item_us = (report.elapsed / attempted).as_micros() as u64,
            max_item_us = report.max_item_time.as_micros() as u64,
            "Flushed all dirty items"
        );
        report
    }

    /// Marks every queued entry immediate so the next ticks drain the queue
    /// within the per-tick budget. Returns the number of entries marked.
    pub fn request_flush_all_deferred(&mut self) -> usize {
        for entry in self.entries.values_mut() {
            entry.immediate = true;
        }
        debug!(
            target: "item_runtime::scheduler",
            pending = self.entries.len(),
            "Deferred flush of all dirty items requested"
        );
        self.entries.len()
    }

    pub fn entry(&self, id: StableId) -> Option<&DirtyEntry<T>> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: StableId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Entries retired by a flush attempt since creation.
    pub fn processed_total(&self) -> u64 {
        self.processed_total
    }

    fn take(&mut self, id: StableId) -> Option<DirtyEntry<T>> {
        let entry = self.entries.remove(&id)?;
        self.order.remove(&entry.seq);
        self.processed_total += 1;
        Some(entry)
    }
}

impl<T: Clone> Default for PersistenceScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
