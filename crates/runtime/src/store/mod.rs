//! Persistence write-back contracts and adapters.
//!
//! The engine never owns storage. A [`MetaStore`] records the meta record
//! built at flush time and extracts it again on restore; where the bytes end
//! up is the store's business.

mod memory;
mod variable;

pub use memory::InMemoryMetaStore;
pub use variable::{META_MARKER, META_VARIABLE, SPLIT_PREFIX, VariableMetaStore};

use std::sync::Arc;

use item_core::{ItemAccessor, ItemMeta, Result};

/// Write-back target for flushed meta records.
pub trait MetaStore<A: ItemAccessor> {
    /// Persists `meta` for `item`. With `write_variables` the core fields are
    /// also written as individual attributes where the store supports it.
    fn record_meta(
        &self,
        accessor: &A,
        item: &A::Item,
        meta: &ItemMeta,
        write_variables: bool,
    ) -> Result<()>;

    /// Returns the last recorded meta, with an unverifiable payload removed.
    fn try_extract_meta(&self, accessor: &A, item: &A::Item) -> Result<Option<ItemMeta>>;
}

impl<A: ItemAccessor, S: MetaStore<A> + ?Sized> MetaStore<A> for Arc<S> {
    fn record_meta(
        &self,
        accessor: &A,
        item: &A::Item,
        meta: &ItemMeta,
        write_variables: bool,
    ) -> Result<()> {
        (**self).record_meta(accessor, item, meta, write_variables)
    }

    fn try_extract_meta(&self, accessor: &A, item: &A::Item) -> Result<Option<ItemMeta>> {
        (**self).try_extract_meta(accessor, item)
    }
}

/// Variables the stores write for their own bookkeeping.
///
/// They are never captured into the variables fragment, otherwise each flush
/// would embed the previous record.
pub fn is_reserved_variable(key: &str) -> bool {
    key == META_VARIABLE || key.starts_with(SPLIT_PREFIX)
}
