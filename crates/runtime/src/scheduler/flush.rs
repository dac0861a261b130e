//! Single-item write-back.

use std::time::{Duration, Instant};

use item_core::{
    DirtyKind, FragmentMap, ItemAccessor, ItemMeta, ItemSnapshot, PersistenceConfig, Result,
    StableId, encode_payload, payload_checksum,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::extensions::ExtensionRegistry;
use crate::metrics::FlushMetrics;
use crate::store::{MetaStore, is_reserved_variable};

const SLOW_FLUSH: Duration = Duration::from_millis(200);

/// Outcome of writing back one item.
#[derive(Clone, Debug)]
pub struct FlushReport {
    pub id: StableId,
    pub kind: DirtyKind,
    /// The record handed to the store.
    pub meta: ItemMeta,
    /// UTF-8 bytes of the embedded payload before encoding; zero when none.
    pub payload_bytes: usize,
    pub extension_keys: usize,
    /// The payload exceeded `maxBlobBytes` and was left out.
    pub payload_dropped: bool,
    pub elapsed: Duration,
}

/// Everything a flush reads, borrowed from the engine for one call.
pub struct FlushContext<'a, A: ItemAccessor> {
    accessor: &'a A,
    store: &'a dyn MetaStore<A>,
    extensions: &'a ExtensionRegistry<A>,
    config: &'a PersistenceConfig,
    metrics: &'a FlushMetrics,
}

impl<'a, A: ItemAccessor + 'static> FlushContext<'a, A> {
    pub fn new(
        accessor: &'a A,
        store: &'a dyn MetaStore<A>,
        extensions: &'a ExtensionRegistry<A>,
        config: &'a PersistenceConfig,
        metrics: &'a FlushMetrics,
    ) -> Self {
        Self {
            accessor,
            store,
            extensions,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        self.config
    }

    pub fn stable_id(&self, item: &A::Item) -> StableId {
        self.accessor.stable_id(item)
    }

    /// Builds the meta record for `item` and hands it to the store.
    ///
    /// Failures are counted and logged, then returned; the caller decides
    /// whether anyone is listening.
    pub fn flush(&self, item: &A::Item, kind: DirtyKind) -> Result<FlushReport> {
        let started = Instant::now();
        let id = self.accessor.stable_id(item);

        let mut report = match self.write_back(id, item, kind) {
            Ok(report) => report,
            Err(error) => {
                self.metrics.record_failure();
                warn!(
                    target: "item_runtime::scheduler",
                    id = %id,
                    dirty = ?kind,
                    error = %error,
                    "Flush failed, entry retired"
                );
                return Err(error);
            }
        };

        report.elapsed = started.elapsed();
        self.metrics
            .record_success(report.elapsed, report.payload_bytes);

        if report.elapsed > SLOW_FLUSH {
            info!(
                target: "item_runtime::scheduler",
                id = %id,
                type_id = report.meta.type_id,
                name = %report.meta.name_key,
                dirty = ?kind,
                payload_bytes = report.payload_bytes,
                extension_keys = report.extension_keys,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Slow flush"
            );
        }
        Ok(report)
    }

    fn write_back(&self, id: StableId, item: &A::Item, kind: DirtyKind) -> Result<FlushReport> {
        let snapshot = ItemSnapshot::capture(self.accessor, item)?;
        let mut meta = ItemMeta::from_snapshot(&snapshot, &self.config.owner_id);

        let mut payload_bytes = 0;
        let mut payload_dropped = false;
        let mut extension_keys = 0;

        if self.config.embed_extra {
            let fragments = self.collect_fragments(item, &snapshot, kind)?;
            self.extensions
                .enrich(self.accessor, item, &mut meta, &fragments);
            extension_keys = fragments.len();

            if !fragments.is_empty() {
                let json = serde_json::to_string(&fragments)?;
                if json.len() > self.config.max_blob_bytes {
                    payload_dropped = true;
                    self.metrics.record_dropped_payload();
                    debug!(
                        target: "item_runtime::scheduler",
                        id = %id,
                        bytes = json.len(),
                        limit = self.config.max_blob_bytes,
                        "Embedded payload over limit, dropped"
                    );
                } else {
                    if self.config.enable_checksum {
                        meta.extra_checksum = Some(payload_checksum(&json));
                    }
                    payload_bytes = json.len();
                    meta.embedded_json =
                        Some(encode_payload(json, self.config.use_base64_encoding));
                }
            }
        }

        self.store.record_meta(
            self.accessor,
            item,
            &meta,
            self.config.write_redundant_variables,
        )?;

        if self.config.reapply_after_write
            && let Err(error) = self.accessor.reapply_modifiers(item)
        {
            debug!(
                target: "item_runtime::scheduler",
                id = %id,
                error = %error,
                "Reapplying modifiers after write failed"
            );
        }

        Ok(FlushReport {
            id,
            kind,
            meta,
            payload_bytes,
            extension_keys,
            payload_dropped,
            elapsed: Duration::ZERO,
        })
    }

    fn collect_fragments(
        &self,
        item: &A::Item,
        snapshot: &ItemSnapshot,
        kind: DirtyKind,
    ) -> Result<FragmentMap> {
        let mut fragments = FragmentMap::new();

        if kind.intersects(DirtyKind::VARIABLES | DirtyKind::CONSTANTS) {
            let variables: Vec<_> = snapshot
                .variables
                .iter()
                .filter(|entry| !is_reserved_variable(&entry.key))
                .collect();
            insert_collection(&mut fragments, "variables", &variables)?;
        }
        if kind.contains(DirtyKind::TAGS) {
            insert_collection(&mut fragments, "tags", &snapshot.tags)?;
        }
        if kind.contains(DirtyKind::MODIFIERS) {
            insert_collection(&mut fragments, "modifiers", &snapshot.modifiers)?;
        }
        if kind.contains(DirtyKind::SLOTS) {
            insert_collection(&mut fragments, "slots", &snapshot.slots)?;
        }

        self.extensions
            .contribute(self.accessor, item, snapshot, kind, &mut fragments);
        Ok(fragments)
    }
}

/// Dirty collections are written even when empty, so a cleared collection
/// replaces what was persisted before.
fn insert_collection<T: Serialize>(
    fragments: &mut FragmentMap,
    key: &str,
    entries: &[T],
) -> Result<()> {
    fragments.insert(key.to_owned(), serde_json::to_value(entries)?);
    Ok(())
}
