use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use item_core::{ModifierEntry, SlotEntry, StatEntry, VarValue};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Mutable state behind a [`MemoryItem`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemRecord {
    pub name: String,
    pub raw_name: Option<String>,
    pub remark: Option<String>,
    pub type_id: i32,
    pub quality: i32,
    pub display_quality: i32,
    pub value: i32,
    pub variables: Vec<(String, VarValue)>,
    pub constants: Vec<(String, VarValue)>,
    pub modifiers: Vec<ModifierEntry>,
    pub slots: Vec<SlotEntry>,
    pub tags: Vec<String>,
    /// `None` means the item type has no stats capability.
    pub stats: Option<Vec<StatEntry>>,
    pub modifier_reapplies: u32,
}

impl ItemRecord {
    pub fn new(name: impl Into<String>, type_id: i32) -> Self {
        Self {
            name: name.into(),
            type_id,
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: i32) -> Self {
        self.quality = quality;
        self.display_quality = quality;
        self
    }

    pub fn with_value(mut self, value: i32) -> Self {
        self.value = value;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.variables.push((key.into(), value.into()));
        self
    }

    pub fn with_constant(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.constants.push((key.into(), value.into()));
        self
    }

    pub fn with_stats(mut self, stats: Vec<StatEntry>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn variable(&self, key: &str) -> Option<&VarValue> {
        self.variables
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

#[derive(Debug)]
struct Shared {
    instance: u64,
    record: RefCell<ItemRecord>,
}

/// Handle to an in-memory item. Clones alias the same record.
#[derive(Debug, Clone)]
pub struct MemoryItem(Rc<Shared>);

impl MemoryItem {
    pub fn new(record: ItemRecord) -> Self {
        Self(Rc::new(Shared {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            record: RefCell::new(record),
        }))
    }

    /// A second wrapper around the same underlying item.
    pub fn alias(&self) -> Self {
        Self(Rc::clone(&self.0))
    }

    pub fn instance_id(&self) -> u64 {
        self.0.instance
    }

    pub fn record(&self) -> Ref<'_, ItemRecord> {
        self.0.record.borrow()
    }

    /// Mutates the item behind the engine's back, as host code would.
    pub fn update(&self, f: impl FnOnce(&mut ItemRecord)) {
        f(&mut self.0.record.borrow_mut());
    }
}
