use std::cell::RefCell;
use std::collections::HashSet;

use item_core::{
    AccessError, AccessResult, ItemAccessor, ModifierEntry, SlotEntry, StableId, StatEntry,
    VarValue, VariableEntry,
};

use super::item::MemoryItem;

/// Accessor operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AccessOp {
    /// Every getter.
    Read,
    SetName,
    SetTypeId,
    SetQuality,
    SetDisplayQuality,
    SetValue,
    SetVariable,
    RemoveVariable,
    SetConstant,
    RemoveConstant,
    ReapplyModifiers,
    SetTags,
    SetStat,
}

/// [`ItemAccessor`] over [`MemoryItem`]s.
#[derive(Debug, Default)]
pub struct MemoryAccessor {
    faults: RefCell<HashSet<AccessOp>>,
}

impl MemoryAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `op` fail with [`AccessError::Failed`].
    pub fn inject_fault(&self, op: AccessOp) {
        self.faults.borrow_mut().insert(op);
    }

    pub fn clear_fault(&self, op: AccessOp) {
        self.faults.borrow_mut().remove(&op);
    }

    pub fn clear_faults(&self) {
        self.faults.borrow_mut().clear();
    }

    fn check(&self, op: AccessOp) -> AccessResult<()> {
        if self.faults.borrow().contains(&op) {
            Err(AccessError::Failed(format!("injected fault on {op}")))
        } else {
            Ok(())
        }
    }

    fn read<R>(&self, item: &MemoryItem, f: impl FnOnce(&super::ItemRecord) -> R) -> AccessResult<R> {
        self.check(AccessOp::Read)?;
        Ok(f(&item.record()))
    }

    fn write(
        &self,
        op: AccessOp,
        item: &MemoryItem,
        f: impl FnOnce(&mut super::ItemRecord),
    ) -> AccessResult<()> {
        self.check(op)?;
        item.update(f);
        Ok(())
    }
}

fn entries(list: &[(String, VarValue)], is_constant: bool) -> Vec<VariableEntry> {
    list.iter()
        .map(|(key, value)| VariableEntry {
            key: key.clone(),
            value: value.clone(),
            is_constant,
        })
        .collect()
}

fn upsert(list: &mut Vec<(String, VarValue)>, key: &str, value: &VarValue) {
    match list.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value.clone(),
        None => list.push((key.to_owned(), value.clone())),
    }
}

fn remove(list: &mut Vec<(String, VarValue)>, key: &str) -> bool {
    let before = list.len();
    list.retain(|(k, _)| k != key);
    list.len() != before
}

impl ItemAccessor for MemoryAccessor {
    type Item = MemoryItem;

    fn stable_id(&self, item: &MemoryItem) -> StableId {
        StableId(item.instance_id())
    }

    fn name(&self, item: &MemoryItem) -> AccessResult<String> {
        self.read(item, |r| r.name.clone())
    }

    fn set_name(&self, item: &MemoryItem, name: &str) -> AccessResult<()> {
        self.write(AccessOp::SetName, item, |r| r.name = name.to_owned())
    }

    fn raw_name(&self, item: &MemoryItem) -> AccessResult<Option<String>> {
        self.read(item, |r| r.raw_name.clone())
    }

    fn remark(&self, item: &MemoryItem) -> AccessResult<Option<String>> {
        self.read(item, |r| r.remark.clone())
    }

    fn type_id(&self, item: &MemoryItem) -> AccessResult<i32> {
        self.read(item, |r| r.type_id)
    }

    fn set_type_id(&self, item: &MemoryItem, type_id: i32) -> AccessResult<()> {
        self.write(AccessOp::SetTypeId, item, |r| r.type_id = type_id)
    }

    fn quality(&self, item: &MemoryItem) -> AccessResult<i32> {
        self.read(item, |r| r.quality)
    }

    fn set_quality(&self, item: &MemoryItem, quality: i32) -> AccessResult<()> {
        self.write(AccessOp::SetQuality, item, |r| r.quality = quality)
    }

    fn display_quality(&self, item: &MemoryItem) -> AccessResult<i32> {
        self.read(item, |r| r.display_quality)
    }

    fn set_display_quality(&self, item: &MemoryItem, quality: i32) -> AccessResult<()> {
        self.write(AccessOp::SetDisplayQuality, item, |r| {
            r.display_quality = quality
        })
    }

    fn value(&self, item: &MemoryItem) -> AccessResult<i32> {
        self.read(item, |r| r.value)
    }

    fn set_value(&self, item: &MemoryItem, value: i32) -> AccessResult<()> {
        self.write(AccessOp::SetValue, item, |r| r.value = value)
    }

    fn variables(&self, item: &MemoryItem) -> AccessResult<Vec<VariableEntry>> {
        self.read(item, |r| entries(&r.variables, false))
    }

    fn set_variable(&self, item: &MemoryItem, key: &str, value: &VarValue) -> AccessResult<()> {
        self.write(AccessOp::SetVariable, item, |r| {
            upsert(&mut r.variables, key, value)
        })
    }

    fn remove_variable(&self, item: &MemoryItem, key: &str) -> AccessResult<bool> {
        self.check(AccessOp::RemoveVariable)?;
        let mut removed = false;
        item.update(|r| removed = remove(&mut r.variables, key));
        Ok(removed)
    }

    fn constants(&self, item: &MemoryItem) -> AccessResult<Vec<VariableEntry>> {
        self.read(item, |r| entries(&r.constants, true))
    }

    fn set_constant(
        &self,
        item: &MemoryItem,
        key: &str,
        value: &VarValue,
        create_if_missing: bool,
    ) -> AccessResult<()> {
        self.check(AccessOp::SetConstant)?;
        let exists = item.record().constants.iter().any(|(k, _)| k == key);
        if !exists && !create_if_missing {
            return Err(AccessError::Missing(format!("constant {key}")));
        }
        item.update(|r| upsert(&mut r.constants, key, value));
        Ok(())
    }

    fn remove_constant(&self, item: &MemoryItem, key: &str) -> AccessResult<bool> {
        self.check(AccessOp::RemoveConstant)?;
        let mut removed = false;
        item.update(|r| removed = remove(&mut r.constants, key));
        Ok(removed)
    }

    fn modifiers(&self, item: &MemoryItem) -> AccessResult<Vec<ModifierEntry>> {
        self.read(item, |r| r.modifiers.clone())
    }

    fn reapply_modifiers(&self, item: &MemoryItem) -> AccessResult<()> {
        self.write(AccessOp::ReapplyModifiers, item, |r| {
            r.modifier_reapplies += 1
        })
    }

    fn slots(&self, item: &MemoryItem) -> AccessResult<Vec<SlotEntry>> {
        self.read(item, |r| r.slots.clone())
    }

    fn tags(&self, item: &MemoryItem) -> AccessResult<Vec<String>> {
        self.read(item, |r| r.tags.clone())
    }

    fn set_tags(&self, item: &MemoryItem, tags: &[String]) -> AccessResult<()> {
        self.write(AccessOp::SetTags, item, |r| r.tags = tags.to_vec())
    }

    fn stats(&self, item: &MemoryItem) -> AccessResult<Vec<StatEntry>> {
        self.read(item, |r| r.stats.clone())?
            .ok_or_else(|| AccessError::Unsupported("stats".into()))
    }

    fn set_stat(&self, item: &MemoryItem, key: &str, value: f64) -> AccessResult<()> {
        self.check(AccessOp::SetStat)?;
        if item.record().stats.is_none() {
            return Err(AccessError::Unsupported("stats".into()));
        }
        item.update(|r| {
            if let Some(stats) = r.stats.as_mut() {
                match stats.iter_mut().find(|s| s.key == key) {
                    Some(stat) => stat.value = value,
                    None => stats.push(StatEntry {
                        key: key.to_owned(),
                        value,
                    }),
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ItemRecord;

    #[test]
    fn test_aliases_share_identity() {
        let accessor = MemoryAccessor::new();
        let item = MemoryItem::new(ItemRecord::new("Lantern", 3));
        let alias = item.alias();
        let other = MemoryItem::new(ItemRecord::new("Lantern", 3));

        assert_eq!(accessor.stable_id(&item), accessor.stable_id(&alias));
        assert_ne!(accessor.stable_id(&item), accessor.stable_id(&other));

        accessor.set_quality(&alias, 4).unwrap();
        assert_eq!(accessor.quality(&item).unwrap(), 4);
    }

    #[test]
    fn test_injected_fault() {
        let accessor = MemoryAccessor::new();
        let item = MemoryItem::new(ItemRecord::new("Lantern", 3));

        accessor.inject_fault(AccessOp::SetTags);
        assert!(matches!(
            accessor.set_tags(&item, &["lit".into()]),
            Err(AccessError::Failed(_))
        ));
        accessor.clear_faults();
        accessor.set_tags(&item, &["lit".into()]).unwrap();
        assert_eq!(accessor.tags(&item).unwrap(), vec!["lit".to_string()]);
    }

    #[test]
    fn test_stats_capability() {
        let accessor = MemoryAccessor::new();
        let plain = MemoryItem::new(ItemRecord::new("Rock", 1));
        assert!(matches!(accessor.stats(&plain), Err(AccessError::Unsupported(_))));

        let gear = MemoryItem::new(ItemRecord::new("Helmet", 2).with_stats(Vec::new()));
        accessor.set_stat(&gear, "armor", 3.0).unwrap();
        assert_eq!(accessor.stats(&gear).unwrap()[0].value, 3.0);
    }
}
