//! Pluggable producers and consumers of embedded state fragments.
//!
//! At flush time each registered [`StateContributor`] whose dirty-kind mask
//! intersects the item's accumulated kind may add one named fragment to the
//! fragment map. [`MetaEnricher`]s then get a chance to adjust the meta
//! record. At restore time every fragment is handed to the
//! [`StateApplier`] registered under the same key.
//!
//! Extension failures never abort a flush or a restore; they are logged
//! according to the extension's [`ExtensionCriticality`] and skipped.

mod registry;
mod stats;

pub use registry::ExtensionRegistry;
pub use stats::StatsExtension;

use item_core::{DirtyKind, FragmentMap, ItemAccessor, ItemMeta, ItemSnapshot, Result};
use serde_json::Value;

/// How loudly a failing extension is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionCriticality {
    /// Logged at warn level.
    #[default]
    Important,

    /// Logged at debug level.
    Optional,
}

/// Captures one named fragment from an item during a flush.
pub trait StateContributor<A: ItemAccessor> {
    /// Fragment key; also the key its applier is registered under.
    fn key(&self) -> &str;

    /// Dirty facets this contributor cares about.
    fn kind_mask(&self) -> DirtyKind;

    /// Lower values run first.
    fn priority(&self) -> i32 {
        0
    }

    fn criticality(&self) -> ExtensionCriticality {
        ExtensionCriticality::Important
    }

    /// Returns `Ok(None)` when the item has nothing worth embedding.
    fn try_capture(
        &self,
        accessor: &A,
        item: &A::Item,
        snapshot: &ItemSnapshot,
    ) -> Result<Option<Value>>;
}

/// Adjusts the meta record once all fragments are collected.
pub trait MetaEnricher<A: ItemAccessor> {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn try_enrich(
        &self,
        accessor: &A,
        item: &A::Item,
        meta: &mut ItemMeta,
        fragments: &FragmentMap,
    ) -> Result<()>;
}

/// Restores one named fragment onto an item.
pub trait StateApplier<A: ItemAccessor> {
    fn key(&self) -> &str;

    fn criticality(&self) -> ExtensionCriticality {
        ExtensionCriticality::Important
    }

    fn try_apply(&self, accessor: &A, item: &A::Item, meta: &ItemMeta, fragment: &Value)
    -> Result<()>;
}

/// Fragment keys written by the scheduler itself for the built-in collections.
pub const RESERVED_KEYS: [&str; 4] = ["variables", "tags", "modifiers", "slots"];
