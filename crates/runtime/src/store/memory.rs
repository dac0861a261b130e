//! In-memory meta store for tests and embedders without attribute storage.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use item_core::{EngineError, ItemAccessor, ItemMeta, Result, StableId, verify_embedded};
use tracing::warn;

use super::MetaStore;

/// Meta records keyed by stable id.
#[derive(Debug, Default)]
pub struct InMemoryMetaStore {
    records: RwLock<HashMap<StableId, ItemMeta>>,
    writes: AtomicU64,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw record as written, without checksum verification.
    pub fn get(&self, id: StableId) -> Option<ItemMeta> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(&id).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `record_meta` calls, including overwrites.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Replaces a stored record, e.g. to simulate corruption.
    pub fn insert(&self, id: StableId, meta: ItemMeta) -> Result<()> {
        self.records.write().map_err(|_| poisoned())?.insert(id, meta);
        Ok(())
    }
}

impl<A: ItemAccessor> MetaStore<A> for InMemoryMetaStore {
    fn record_meta(
        &self,
        accessor: &A,
        item: &A::Item,
        meta: &ItemMeta,
        _write_variables: bool,
    ) -> Result<()> {
        let id = accessor.stable_id(item);
        self.records
            .write()
            .map_err(|_| poisoned())?
            .insert(id, meta.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn try_extract_meta(&self, accessor: &A, item: &A::Item) -> Result<Option<ItemMeta>> {
        let id = accessor.stable_id(item);
        let records = self.records.read().map_err(|_| poisoned())?;
        let Some(meta) = records.get(&id).cloned() else {
            return Ok(None);
        };

        let mut meta = meta.normalize();
        if !verify_embedded(&mut meta) {
            warn!(
                target: "item_runtime::store",
                id = %id,
                "Embedded payload failed checksum, discarded"
            );
        }
        Ok(Some(meta))
    }
}

fn poisoned() -> EngineError {
    EngineError::OperationFailed("meta store lock was poisoned".into())
}
