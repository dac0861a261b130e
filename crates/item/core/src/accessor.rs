//! Capability interface a host implements for each supported item type.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::AccessError;
use crate::snapshot::{ModifierEntry, SlotEntry, StatEntry, VariableEntry};

pub type AccessResult<T> = std::result::Result<T, AccessError>;

/// Identity of an item that survives aliasing wrappers.
///
/// Two handles that wrap the same underlying object must map to the same
/// `StableId`; the engine never compares handles by reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(pub u64);

impl StableId {
    /// Fallback identity for hosts without an instance id.
    pub fn from_hash(value: &impl Hash) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar stored in an item variable or constant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl VarValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for VarValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Reads and writes the attributes of an externally owned item.
///
/// `Item` is a cheap handle (typically reference counted) to an object the
/// engine never creates or destroys. All methods take `&self` and the handle
/// by reference; mutation happens through the host's own interior state.
///
/// Optional capabilities (`raw_name`, `remark`, `stats`) have defaults so a
/// host only implements what its item type actually supports.
pub trait ItemAccessor {
    type Item: Clone;

    fn stable_id(&self, item: &Self::Item) -> StableId;

    fn name(&self, item: &Self::Item) -> AccessResult<String>;
    fn set_name(&self, item: &Self::Item, name: &str) -> AccessResult<()>;

    /// Untranslated name key, preferred over the display name when persisting.
    fn raw_name(&self, _item: &Self::Item) -> AccessResult<Option<String>> {
        Ok(None)
    }

    fn remark(&self, _item: &Self::Item) -> AccessResult<Option<String>> {
        Ok(None)
    }

    fn type_id(&self, item: &Self::Item) -> AccessResult<i32>;
    fn set_type_id(&self, item: &Self::Item, type_id: i32) -> AccessResult<()>;

    fn quality(&self, item: &Self::Item) -> AccessResult<i32>;
    fn set_quality(&self, item: &Self::Item, quality: i32) -> AccessResult<()>;

    fn display_quality(&self, item: &Self::Item) -> AccessResult<i32>;
    fn set_display_quality(&self, item: &Self::Item, quality: i32) -> AccessResult<()>;

    fn value(&self, item: &Self::Item) -> AccessResult<i32>;
    fn set_value(&self, item: &Self::Item, value: i32) -> AccessResult<()>;

    fn variables(&self, item: &Self::Item) -> AccessResult<Vec<VariableEntry>>;
    fn set_variable(&self, item: &Self::Item, key: &str, value: &VarValue) -> AccessResult<()>;
    fn remove_variable(&self, item: &Self::Item, key: &str) -> AccessResult<bool>;

    fn variable(&self, item: &Self::Item, key: &str) -> AccessResult<Option<VarValue>> {
        Ok(self
            .variables(item)?
            .into_iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value))
    }

    fn constants(&self, item: &Self::Item) -> AccessResult<Vec<VariableEntry>>;
    fn set_constant(
        &self,
        item: &Self::Item,
        key: &str,
        value: &VarValue,
        create_if_missing: bool,
    ) -> AccessResult<()>;
    fn remove_constant(&self, item: &Self::Item, key: &str) -> AccessResult<bool>;

    fn constant(&self, item: &Self::Item, key: &str) -> AccessResult<Option<VarValue>> {
        Ok(self
            .constants(item)?
            .into_iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value))
    }

    fn modifiers(&self, item: &Self::Item) -> AccessResult<Vec<ModifierEntry>>;
    fn reapply_modifiers(&self, item: &Self::Item) -> AccessResult<()>;

    fn slots(&self, item: &Self::Item) -> AccessResult<Vec<SlotEntry>>;

    fn tags(&self, item: &Self::Item) -> AccessResult<Vec<String>>;
    fn set_tags(&self, item: &Self::Item, tags: &[String]) -> AccessResult<()>;

    fn stats(&self, _item: &Self::Item) -> AccessResult<Vec<StatEntry>> {
        Err(AccessError::Unsupported("stats".into()))
    }

    fn set_stat(&self, _item: &Self::Item, key: &str, _value: f64) -> AccessResult<()> {
        Err(AccessError::Unsupported(format!("stat {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_value_untagged_json() {
        let values: Vec<VarValue> = serde_json::from_str(r#"[3, 1.5, true, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                VarValue::Int(3),
                VarValue::Float(1.5),
                VarValue::Bool(true),
                VarValue::Text("x".into()),
            ]
        );
    }

    #[test]
    fn test_hash_identity_is_stable() {
        assert_eq!(StableId::from_hash(&"sword#1"), StableId::from_hash(&"sword#1"));
        assert_ne!(StableId::from_hash(&"sword#1"), StableId::from_hash(&"sword#2"));
    }
}
