//! Advisory per-item owner locks.

use std::collections::HashMap;

use item_core::{EngineError, Result, StableId};

/// Maps an item to the owner currently holding it.
///
/// Locks are advisory: the engine does not consult them before writing.
/// Callers that coordinate multi-step edits use them to keep two owners off
/// the same item.
#[derive(Debug, Default)]
pub struct OwnerLocks {
    holders: HashMap<StableId, String>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `owner`. Re-acquiring by the holder succeeds.
    pub fn try_lock(&mut self, id: StableId, owner: &str) -> Result<()> {
        if owner.is_empty() {
            return Err(EngineError::InvalidArgument("lock owner is empty".into()));
        }
        match self.holders.get(&id) {
            Some(holder) if holder != owner => Err(EngineError::Conflict(format!(
                "item {id} is locked by '{holder}'"
            ))),
            Some(_) => Ok(()),
            None => {
                self.holders.insert(id, owner.to_owned());
                Ok(())
            }
        }
    }

    /// Releases the lock if `owner` holds it. Returns whether it was released.
    pub fn unlock(&mut self, id: StableId, owner: &str) -> bool {
        if self.holders.get(&id).is_some_and(|holder| holder == owner) {
            self.holders.remove(&id);
            true
        } else {
            false
        }
    }

    pub fn holder(&self, id: StableId) -> Option<&str> {
        self.holders.get(&id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use item_core::ErrorCode;

    #[test]
    fn test_second_owner_conflicts() {
        let mut locks = OwnerLocks::new();
        let id = StableId(9);

        locks.try_lock(id, "crafting").unwrap();
        locks.try_lock(id, "crafting").unwrap();
        let err = locks.try_lock(id, "trade").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        assert!(!locks.unlock(id, "trade"));
        assert_eq!(locks.holder(id), Some("crafting"));
        assert!(locks.unlock(id, "crafting"));
        locks.try_lock(id, "trade").unwrap();
    }
}
