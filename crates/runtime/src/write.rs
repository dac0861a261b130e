//! Attribute write path with per-call rollback protection.
//!
//! Each function captures the prior value of every attribute it is about to
//! touch. If any individual write fails, the writes already applied by the
//! same call are undone (best effort) and `OperationFailed` is returned, so
//! a call either lands completely or leaves the item as it found it.

use item_core::{
    AccessError, EngineError, ItemAccessor, ItemSnapshot, Result, VarValue,
};
use tracing::warn;

/// Core scalar fields to write. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoreFieldChanges {
    pub name: Option<String>,
    pub type_id: Option<i32>,
    pub quality: Option<i32>,
    pub display_quality: Option<i32>,
    pub value: Option<i32>,
}

impl CoreFieldChanges {
    /// Every core field of the snapshot.
    pub fn from_snapshot(snapshot: &ItemSnapshot) -> Self {
        Self {
            name: Some(snapshot.name.clone()),
            type_id: Some(snapshot.type_id),
            quality: Some(snapshot.quality),
            display_quality: Some(snapshot.display_quality),
            value: Some(snapshot.value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    fn fields(&self) -> Vec<CoreField> {
        let mut fields = Vec::with_capacity(5);
        if let Some(name) = &self.name {
            fields.push(CoreField::Name(name.clone()));
        }
        if let Some(v) = self.type_id {
            fields.push(CoreField::TypeId(v));
        }
        if let Some(v) = self.quality {
            fields.push(CoreField::Quality(v));
        }
        if let Some(v) = self.display_quality {
            fields.push(CoreField::DisplayQuality(v));
        }
        if let Some(v) = self.value {
            fields.push(CoreField::Value(v));
        }
        fields
    }
}

#[derive(Clone, Debug)]
enum CoreField {
    Name(String),
    TypeId(i32),
    Quality(i32),
    DisplayQuality(i32),
    Value(i32),
}

impl CoreField {
    fn label(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::TypeId(_) => "type id",
            Self::Quality(_) => "quality",
            Self::DisplayQuality(_) => "display quality",
            Self::Value(_) => "value",
        }
    }

    /// Current value of the same field on `item`.
    fn read<A: ItemAccessor>(&self, accessor: &A, item: &A::Item) -> Result<Self> {
        Ok(match self {
            Self::Name(_) => Self::Name(accessor.name(item)?),
            Self::TypeId(_) => Self::TypeId(accessor.type_id(item)?),
            Self::Quality(_) => Self::Quality(accessor.quality(item)?),
            Self::DisplayQuality(_) => Self::DisplayQuality(accessor.display_quality(item)?),
            Self::Value(_) => Self::Value(accessor.value(item)?),
        })
    }

    fn write<A: ItemAccessor>(&self, accessor: &A, item: &A::Item) -> std::result::Result<(), AccessError> {
        match self {
            Self::Name(v) => accessor.set_name(item, v),
            Self::TypeId(v) => accessor.set_type_id(item, *v),
            Self::Quality(v) => accessor.set_quality(item, *v),
            Self::DisplayQuality(v) => accessor.set_display_quality(item, *v),
            Self::Value(v) => accessor.set_value(item, *v),
        }
    }
}

pub fn write_core_fields<A: ItemAccessor>(
    accessor: &A,
    item: &A::Item,
    changes: &CoreFieldChanges,
) -> Result<()> {
    let fields = changes.fields();
    let previous = fields
        .iter()
        .map(|field| field.read(accessor, item))
        .collect::<Result<Vec<_>>>()?;

    for (index, field) in fields.iter().enumerate() {
        if let Err(error) = field.write(accessor, item) {
            for prior in previous[..=index].iter().rev() {
                if let Err(undo) = prior.write(accessor, item) {
                    warn_undo(prior.label(), &undo);
                }
            }
            return Err(EngineError::OperationFailed(format!(
                "failed to write {}: {error}",
                field.label()
            )));
        }
    }
    Ok(())
}

/// Writes variables. With `overwrite = false` existing keys are left alone.
pub fn write_variables<A: ItemAccessor>(
    accessor: &A,
    item: &A::Item,
    entries: &[(String, VarValue)],
    overwrite: bool,
) -> Result<()> {
    let previous = entries
        .iter()
        .map(|(key, _)| accessor.variable(item, key))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut applied: Vec<(&str, Option<VarValue>)> = Vec::new();
    for ((key, value), previous) in entries.iter().zip(previous) {
        if previous.is_some() && !overwrite {
            continue;
        }
        if let Err(error) = accessor.set_variable(item, key, value) {
            applied.push((key.as_str(), previous));
            for (prior_key, prior) in applied.iter().rev() {
                let undo = match prior {
                    Some(v) => accessor.set_variable(item, prior_key, v),
                    None => accessor.remove_variable(item, prior_key).map(|_| ()),
                };
                if let Err(undo) = undo {
                    warn_undo(prior_key, &undo);
                }
            }
            return Err(EngineError::OperationFailed(format!(
                "failed to write variable '{key}': {error}"
            )));
        }
        applied.push((key.as_str(), previous));
    }
    Ok(())
}

/// Writes constants. Missing keys are skipped unless `create_if_missing`.
pub fn write_constants<A: ItemAccessor>(
    accessor: &A,
    item: &A::Item,
    entries: &[(String, VarValue)],
    create_if_missing: bool,
) -> Result<()> {
    let previous = entries
        .iter()
        .map(|(key, _)| accessor.constant(item, key))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut applied: Vec<(&str, Option<VarValue>)> = Vec::new();
    for ((key, value), previous) in entries.iter().zip(previous) {
        if previous.is_none() && !create_if_missing {
            continue;
        }
        if let Err(error) = accessor.set_constant(item, key, value, create_if_missing) {
            applied.push((key.as_str(), previous));
            for (prior_key, prior) in applied.iter().rev() {
                let undo = match prior {
                    Some(v) => accessor.set_constant(item, prior_key, v, false),
                    None => accessor.remove_constant(item, prior_key).map(|_| ()),
                };
                if let Err(undo) = undo {
                    warn_undo(prior_key, &undo);
                }
            }
            return Err(EngineError::OperationFailed(format!(
                "failed to write constant '{key}': {error}"
            )));
        }
        applied.push((key.as_str(), previous));
    }
    Ok(())
}

/// Replaces the tag set, or unions with the existing tags when `merge`.
///
/// Duplicates are removed; first occurrence wins.
pub fn write_tags<A: ItemAccessor>(
    accessor: &A,
    item: &A::Item,
    tags: &[String],
    merge: bool,
) -> Result<()> {
    let previous = accessor.tags(item)?;

    let mut next: Vec<String> = if merge { previous.clone() } else { Vec::new() };
    for tag in tags {
        if !next.contains(tag) {
            next.push(tag.clone());
        }
    }

    if let Err(error) = accessor.set_tags(item, &next) {
        if let Err(undo) = accessor.set_tags(item, &previous) {
            warn_undo("tags", &undo);
        }
        return Err(EngineError::OperationFailed(format!(
            "failed to write tags: {error}"
        )));
    }
    Ok(())
}

fn warn_undo(what: &str, error: &AccessError) {
    warn!(
        target: "item_runtime::write",
        attribute = what,
        error = %error,
        "Failed to undo partial write"
    );
}
