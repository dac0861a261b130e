use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use item_core::{AccessError, AccessResult};

use super::item::MemoryItem;
use crate::events::{ContainerLocator, ItemPopulation};

/// Shared, mutable list of items for the event sources to scan.
///
/// Clones share the same list, so a test can keep one handle and give the
/// engine another.
#[derive(Debug, Clone, Default)]
pub struct MemoryPopulation {
    items: Rc<RefCell<Vec<MemoryItem>>>,
    broken: Rc<Cell<bool>>,
}

impl MemoryPopulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: &MemoryItem) {
        self.items.borrow_mut().push(item.alias());
    }

    pub fn remove(&self, item: &MemoryItem) -> bool {
        let mut items = self.items.borrow_mut();
        let before = items.len();
        items.retain(|i| i.instance_id() != item.instance_id());
        items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// While set, enumeration fails.
    pub fn set_broken(&self, broken: bool) {
        self.broken.set(broken);
    }
}

impl ItemPopulation<MemoryItem> for MemoryPopulation {
    fn enumerate(&self) -> AccessResult<Vec<MemoryItem>> {
        if self.broken.get() {
            return Err(AccessError::Failed("population unavailable".into()));
        }
        Ok(self.items.borrow().clone())
    }
}

/// Set of items currently held by some container.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainers {
    contained: Rc<RefCell<HashSet<u64>>>,
}

impl MemoryContainers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, item: &MemoryItem) {
        self.contained.borrow_mut().insert(item.instance_id());
    }

    pub fn take(&self, item: &MemoryItem) {
        self.contained.borrow_mut().remove(&item.instance_id());
    }
}

impl ContainerLocator<MemoryItem> for MemoryContainers {
    fn is_contained(&self, item: &MemoryItem) -> bool {
        self.contained.borrow().contains(&item.instance_id())
    }
}
