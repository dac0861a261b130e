//! Snapshot-based transactions over an attribute store without transactions.
//!
//! `begin` freezes the item into a snapshot; `rollback` replays that
//! snapshot through the protected write path. Rollback is best-effort
//! restoration: side effects other observers already saw are not retracted.

mod atomic;

use std::collections::HashMap;
use std::fmt;

use item_core::{EngineError, ItemAccessor, ItemSnapshot, Result, StableId, VarValue};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::write::{self, CoreFieldChanges};

/// Opaque handle for one open transaction. Unique per `begin` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxToken(Uuid);

impl TxToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TxToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct OpenTransaction {
    snapshot: ItemSnapshot,
    started_at: f64,
}

/// Open transactions keyed by `(stable id, token)`.
///
/// Any number of transactions may be open at once, including several on the
/// same item; each holds the snapshot taken at its own `begin`.
#[derive(Debug, Default)]
pub struct TransactionManager {
    open: HashMap<(StableId, TxToken), OpenTransaction>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of `item` and opens a transaction around it.
    pub fn begin<A: ItemAccessor>(
        &mut self,
        accessor: &A,
        item: &A::Item,
        now: f64,
    ) -> Result<TxToken> {
        let id = accessor.stable_id(item);
        let snapshot = ItemSnapshot::capture(accessor, item).map_err(|e| {
            EngineError::OperationFailed(format!("failed to snapshot item {id}: {e}"))
        })?;

        let token = TxToken::new();
        self.open.insert(
            (id, token),
            OpenTransaction {
                snapshot,
                started_at: now,
            },
        );
        debug!(target: "item_runtime::transaction", id = %id, token = %token, "Transaction opened");
        Ok(token)
    }

    /// Closes the transaction and drops its snapshot.
    pub fn commit(&mut self, id: StableId, token: TxToken) -> Result<()> {
        self.open
            .remove(&(id, token))
            .map(|_| ())
            .ok_or_else(|| not_found(id, token))
    }

    /// Closes the transaction and writes its snapshot back onto `item`.
    ///
    /// Core fields, variables (overwrite) and tags (replace) are restored;
    /// failures there are reported as `OperationFailed` after every facet has
    /// been attempted. Constants are restored best-effort and only logged.
    pub fn rollback<A: ItemAccessor>(
        &mut self,
        accessor: &A,
        item: &A::Item,
        token: TxToken,
    ) -> Result<()> {
        let id = accessor.stable_id(item);
        let open = self
            .open
            .remove(&(id, token))
            .ok_or_else(|| not_found(id, token))?;
        let snapshot = open.snapshot;

        let variables: Vec<(String, VarValue)> = snapshot
            .plain_variables()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect();
        let constants: Vec<(String, VarValue)> = snapshot
            .constants()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect();

        let results = [
            write::write_core_fields(accessor, item, &CoreFieldChanges::from_snapshot(&snapshot)),
            write::write_variables(accessor, item, &variables, true),
            write::write_tags(accessor, item, &snapshot.tags, false),
        ];

        if let Err(error) = write::write_constants(accessor, item, &constants, false) {
            warn!(
                target: "item_runtime::transaction",
                id = %id,
                error = %error,
                "Constants not fully restored"
            );
        }

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if !failures.is_empty() {
            warn!(
                target: "item_runtime::transaction",
                id = %id,
                token = %token,
                failures = failures.len(),
                "Rollback incomplete"
            );
            return Err(EngineError::OperationFailed(format!(
                "rollback of {id} incomplete: {}",
                failures.join("; ")
            )));
        }

        debug!(
            target: "item_runtime::transaction",
            id = %id,
            token = %token,
            started_at = open.started_at,
            "Transaction rolled back"
        );
        Ok(())
    }

    pub fn is_open(&self, id: StableId, token: TxToken) -> bool {
        self.open.contains_key(&(id, token))
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Time `begin` was called for an open transaction.
    pub fn started_at(&self, id: StableId, token: TxToken) -> Option<f64> {
        self.open.get(&(id, token)).map(|open| open.started_at)
    }
}

fn not_found(id: StableId, token: TxToken) -> EngineError {
    EngineError::NotFound(format!("no open transaction {token} for item {id}"))
}
