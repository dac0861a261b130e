//! World-drop detection for items outside every tracked container.

use item_core::{ItemAccessor, WorldDropConfig};
use tracing::warn;

use super::bus::{Event, EventBus, Topic};
use super::sweep::{SweepCursor, Visit};
use super::{ContainerLocator, ItemPopulation, SourceTick};

/// Approximates "entered / left the world" transitions.
///
/// Fires [`Event::Dropped`] the first time an item is seen outside every
/// container, and [`Event::Left`] once a known world item is found inside a
/// container or is missing from a completed pass. The cause of a drop is
/// unknown to the scan and is never guessed.
pub struct WorldDropEventSource<T> {
    config: WorldDropConfig,
    hint_until: f64,
    next_scan_at: f64,
    sweep: SweepCursor<T, ()>,
}

impl<T: Clone> WorldDropEventSource<T> {
    pub fn new(config: WorldDropConfig) -> Self {
        Self {
            config,
            hint_until: f64::NEG_INFINITY,
            next_scan_at: f64::NEG_INFINITY,
            sweep: SweepCursor::new(),
        }
    }

    pub fn config(&self) -> &WorldDropConfig {
        &self.config
    }

    pub fn hint_active(&mut self, now: f64, seconds: f64) {
        self.hint_until = self.hint_until.max(now + seconds.max(0.05));
    }

    pub fn known_count(&self) -> usize {
        self.sweep.known_count()
    }

    pub fn tick<A>(
        &mut self,
        now: f64,
        accessor: &A,
        population: &dyn ItemPopulation<T>,
        locator: &dyn ContainerLocator<T>,
        bus: &mut EventBus<T>,
    ) -> SourceTick<T>
    where
        A: ItemAccessor<Item = T>,
    {
        let mut outcome = SourceTick::default();
        if !self.config.enabled || !bus.has_any(&Topic::WORLD) {
            return outcome;
        }
        if self.config.scan_only_when_active && now > self.hint_until {
            return outcome;
        }
        if now < self.next_scan_at {
            return outcome;
        }
        self.next_scan_at = now + self.config.effective_scan_interval();

        if self.sweep.is_exhausted() {
            match population.enumerate() {
                Ok(items) => self.sweep.refill(items),
                Err(error) => {
                    warn!(
                        target: "item_runtime::events",
                        error = %error,
                        "World enumeration failed, skipping scan"
                    );
                    return outcome;
                }
            }
        }

        for item in self.sweep.next_chunk(self.config.step_budget()) {
            outcome.scanned += 1;
            let id = accessor.stable_id(&item);

            if locator.is_contained(&item) {
                if let Some(known) = self.sweep.forget(id) {
                    bus.publish(&Event::Left(known));
                    outcome.fired += 1;
                }
                continue;
            }

            if self.sweep.visit(id, item.clone(), ()) == Visit::New {
                bus.publish(&Event::Dropped(item));
                outcome.fired += 1;
            }
        }

        if self.sweep.is_exhausted() {
            for item in self.sweep.finish_pass() {
                bus.publish(&Event::Left(item));
                outcome.fired += 1;
            }
        }
        outcome
    }
}
