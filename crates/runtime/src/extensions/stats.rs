//! Built-in extension persisting numeric stats.

use item_core::{
    AccessError, DirtyKind, EngineError, ItemAccessor, ItemMeta, ItemSnapshot, Result, StatEntry,
};
use serde_json::Value;

use super::{StateApplier, StateContributor};

const STATS_KEY: &str = "stats";
const MAX_STATS: usize = 128;

/// Captures and restores `stats` for item types whose accessor supports them.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatsExtension;

impl<A: ItemAccessor> StateContributor<A> for StatsExtension {
    fn key(&self) -> &str {
        STATS_KEY
    }

    fn kind_mask(&self) -> DirtyKind {
        DirtyKind::STATS
    }

    fn try_capture(
        &self,
        accessor: &A,
        item: &A::Item,
        _snapshot: &ItemSnapshot,
    ) -> Result<Option<Value>> {
        let stats = match accessor.stats(item) {
            Ok(stats) => stats,
            Err(AccessError::Unsupported(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if stats.is_empty() {
            return Ok(None);
        }

        let capped: Vec<StatEntry> = stats.into_iter().take(MAX_STATS).collect();
        Ok(Some(serde_json::to_value(capped)?))
    }
}

impl<A: ItemAccessor> StateApplier<A> for StatsExtension {
    fn key(&self) -> &str {
        STATS_KEY
    }

    fn try_apply(
        &self,
        accessor: &A,
        item: &A::Item,
        _meta: &ItemMeta,
        fragment: &Value,
    ) -> Result<()> {
        let stats: Vec<StatEntry> = serde_json::from_value(fragment.clone())?;

        let mut failed = Vec::new();
        for stat in stats.iter().take(MAX_STATS) {
            if let Err(e) = accessor.set_stat(item, &stat.key, stat.value) {
                failed.push(format!("{}: {e}", stat.key));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(EngineError::OperationFailed(format!(
                "failed to restore stats: {}",
                failed.join("; ")
            )))
        }
    }
}
