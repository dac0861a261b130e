//! Item event detection.
//!
//! Two sources feed the same [`EventBus`]:
//! - [`ItemEventSource`] turns external publishes into coalesced events and
//!   falls back to a budgeted polling diff when publishers go quiet
//! - [`WorldDropEventSource`] runs the same budgeted mark-and-sweep over
//!   items lying outside every container
//!
//! Neither source ever propagates a failure to subscribers; a broken
//! enumerator only means fewer events.

mod bus;
mod source;
mod sweep;
mod world_drop;

pub use bus::{Event, EventBus, SubscriptionId, Topic};
pub use source::{ItemEventSource, PublishKind, SourceMode, SourceTick, content_hash};
pub use world_drop::WorldDropEventSource;

use item_core::AccessResult;

/// Enumerates the current population of items to scan.
pub trait ItemPopulation<T> {
    fn enumerate(&self) -> AccessResult<Vec<T>>;
}

/// Answers whether an item currently sits in any tracked container.
pub trait ContainerLocator<T> {
    fn is_contained(&self, item: &T) -> bool;
}
