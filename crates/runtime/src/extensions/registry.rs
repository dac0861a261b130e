//! Registry of contributors, enrichers and appliers.

use std::sync::Arc;

use item_core::{
    DirtyKind, EngineError, FragmentMap, ItemAccessor, ItemMeta, ItemSnapshot, Result,
};
use tracing::{debug, warn};

use super::{
    ExtensionCriticality, MetaEnricher, RESERVED_KEYS, StateApplier, StateContributor,
    StatsExtension,
};

/// Extension registry owned by the engine context.
///
/// Registered once at startup and consulted on every flush and restore.
/// Contributors and enrichers run in priority order (lower first), ties in
/// registration order.
pub struct ExtensionRegistry<A: ItemAccessor> {
    contributors: Vec<Arc<dyn StateContributor<A>>>,
    enrichers: Vec<Arc<dyn MetaEnricher<A>>>,
    appliers: Vec<Arc<dyn StateApplier<A>>>,
}

impl<A: ItemAccessor + 'static> ExtensionRegistry<A> {
    pub fn new() -> Self {
        Self {
            contributors: Vec::new(),
            enrichers: Vec::new(),
            appliers: Vec::new(),
        }
    }

    /// Registry with the built-in stats extension.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let stats = Arc::new(StatsExtension);
        // Keys are unique in an empty registry.
        let _ = registry.register_contributor(Arc::clone(&stats) as Arc<dyn StateContributor<A>>);
        let _ = registry.register_applier(stats as Arc<dyn StateApplier<A>>);
        registry
    }

    pub fn register_contributor(&mut self, contributor: Arc<dyn StateContributor<A>>) -> Result<()> {
        let key = contributor.key().to_owned();
        check_key(&key)?;
        if self.contributors.iter().any(|c| c.key() == key) {
            return Err(EngineError::Conflict(format!(
                "contributor already registered for key '{key}'"
            )));
        }
        self.contributors.push(contributor);
        self.contributors.sort_by_key(|c| c.priority());
        Ok(())
    }

    pub fn register_enricher(&mut self, enricher: Arc<dyn MetaEnricher<A>>) {
        self.enrichers.push(enricher);
        self.enrichers.sort_by_key(|e| e.priority());
    }

    pub fn register_applier(&mut self, applier: Arc<dyn StateApplier<A>>) -> Result<()> {
        let key = applier.key().to_owned();
        check_key(&key)?;
        if self.appliers.iter().any(|a| a.key() == key) {
            return Err(EngineError::Conflict(format!(
                "applier already registered for key '{key}'"
            )));
        }
        self.appliers.push(applier);
        Ok(())
    }

    /// Removes the contributor and applier registered under `key`.
    pub fn unregister(&mut self, key: &str) -> bool {
        let before = self.contributors.len() + self.appliers.len();
        self.contributors.retain(|c| c.key() != key);
        self.appliers.retain(|a| a.key() != key);
        before != self.contributors.len() + self.appliers.len()
    }

    /// Runs every contributor whose mask intersects `kind`, each at most once.
    ///
    /// Returns the number of contributors invoked.
    pub fn contribute(
        &self,
        accessor: &A,
        item: &A::Item,
        snapshot: &ItemSnapshot,
        kind: DirtyKind,
        fragments: &mut FragmentMap,
    ) -> usize {
        let mut invoked = 0;
        for contributor in &self.contributors {
            if !contributor.kind_mask().intersects(kind) {
                continue;
            }
            invoked += 1;
            match contributor.try_capture(accessor, item, snapshot) {
                Ok(Some(fragment)) => {
                    fragments.insert(contributor.key().to_owned(), fragment);
                }
                Ok(None) => {}
                Err(error) => report(contributor.key(), contributor.criticality(), "capture", &error),
            }
        }
        invoked
    }

    pub fn enrich(&self, accessor: &A, item: &A::Item, meta: &mut ItemMeta, fragments: &FragmentMap) {
        for enricher in &self.enrichers {
            if let Err(error) = enricher.try_enrich(accessor, item, meta, fragments) {
                report(enricher.name(), ExtensionCriticality::Important, "enrich", &error);
            }
        }
    }

    /// Hands each fragment to the applier registered under its key.
    ///
    /// Fragments without an applier are ignored. Returns the number applied.
    pub fn apply(&self, accessor: &A, item: &A::Item, meta: &ItemMeta, fragments: &FragmentMap) -> usize {
        let mut applied = 0;
        for (key, fragment) in fragments {
            let Some(applier) = self.appliers.iter().find(|a| a.key() == key) else {
                continue;
            };
            match applier.try_apply(accessor, item, meta, fragment) {
                Ok(()) => applied += 1,
                Err(error) => report(key, applier.criticality(), "apply", &error),
            }
        }
        applied
    }

    pub fn contributor_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.contributors.iter().map(|c| c.key())
    }

    pub fn applier_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.appliers.iter().map(|a| a.key())
    }
}

impl<A: ItemAccessor + 'static> Default for ExtensionRegistry<A> {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(EngineError::InvalidArgument("extension key is empty".into()));
    }
    if RESERVED_KEYS.contains(&key) {
        return Err(EngineError::Conflict(format!(
            "extension key '{key}' is reserved for built-in collections"
        )));
    }
    Ok(())
}

fn report(key: &str, criticality: ExtensionCriticality, stage: &str, error: &EngineError) {
    match criticality {
        ExtensionCriticality::Important => warn!(
            target: "item_runtime::extensions",
            extension = key,
            stage,
            error = %error,
            "Extension failed, skipping"
        ),
        ExtensionCriticality::Optional => debug!(
            target: "item_runtime::extensions",
            extension = key,
            stage,
            error = %error,
            "Optional extension failed"
        ),
    }
}
