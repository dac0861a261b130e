//! Frozen value copies of an item's state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::accessor::{AccessResult, ItemAccessor, VarValue};
use crate::error::AccessError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableEntry {
    pub key: String,
    pub value: VarValue,
    pub is_constant: bool,
}

impl VariableEntry {
    pub fn new(key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_constant: false,
        }
    }

    pub fn constant(key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        Self {
            is_constant: true,
            ..Self::new(key, value)
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModifierKind {
    Add,
    PercentageAdd,
    PercentageMultiply,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifierEntry {
    pub key: String,
    pub value: f64,
    pub kind: ModifierKind,
    pub is_percent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotEntry {
    pub key: String,
    pub occupied: bool,
    pub plug_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatEntry {
    pub key: String,
    pub value: f64,
}

/// Deep copy of an item's core fields and collections taken at one instant.
///
/// Nothing in a snapshot refers back into the item, so later mutations of
/// the item never show up here. `variables` holds both plain variables and
/// constants; the latter have `is_constant` set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub name: String,
    pub raw_name: Option<String>,
    pub remark: Option<String>,
    pub type_id: i32,
    pub quality: i32,
    pub display_quality: i32,
    pub value: i32,
    pub tags: Vec<String>,
    pub variables: Vec<VariableEntry>,
    pub modifiers: Vec<ModifierEntry>,
    pub slots: Vec<SlotEntry>,
}

impl ItemSnapshot {
    /// Captures the current state of `item`.
    ///
    /// Core fields, variables and tags are required. Collections the item
    /// type does not support (`Unsupported`) are captured as empty.
    pub fn capture<A: ItemAccessor>(accessor: &A, item: &A::Item) -> AccessResult<Self> {
        let mut variables: Vec<VariableEntry> = accessor
            .variables(item)?
            .into_iter()
            .map(|entry| VariableEntry {
                is_constant: false,
                ..entry
            })
            .collect();
        variables.extend(
            supported(accessor.constants(item))?
                .into_iter()
                .map(|entry| VariableEntry {
                    is_constant: true,
                    ..entry
                }),
        );

        Ok(Self {
            name: accessor.name(item)?,
            raw_name: accessor.raw_name(item)?,
            remark: accessor.remark(item)?,
            type_id: accessor.type_id(item)?,
            quality: accessor.quality(item)?,
            display_quality: accessor.display_quality(item)?,
            value: accessor.value(item)?,
            tags: accessor.tags(item)?,
            variables,
            modifiers: supported(accessor.modifiers(item))?,
            slots: supported(accessor.slots(item))?,
        })
    }

    pub fn plain_variables(&self) -> impl Iterator<Item = &VariableEntry> {
        self.variables.iter().filter(|entry| !entry.is_constant)
    }

    pub fn constants(&self) -> impl Iterator<Item = &VariableEntry> {
        self.variables.iter().filter(|entry| entry.is_constant)
    }
}

fn supported<T>(result: AccessResult<Vec<T>>) -> AccessResult<Vec<T>> {
    match result {
        Err(AccessError::Unsupported(_)) => Ok(Vec::new()),
        other => other,
    }
}

impl fmt::Display for ItemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} (type {}, quality {}/{}, value {})",
            self.raw_name.as_deref().unwrap_or(&self.name),
            self.type_id,
            self.quality,
            self.display_quality,
            self.value
        )?;
        if !self.tags.is_empty() {
            writeln!(f, "  tags: {}", self.tags.join(", "))?;
        }
        for entry in &self.variables {
            let marker = if entry.is_constant { "const" } else { "var" };
            writeln!(f, "  {marker} {} = {}", entry.key, entry.value)?;
        }
        for modifier in &self.modifiers {
            let unit = if modifier.is_percent { "%" } else { "" };
            writeln!(
                f,
                "  modifier {} {} {}{unit}",
                modifier.key, modifier.kind, modifier.value
            )?;
        }
        for slot in &self.slots {
            writeln!(
                f,
                "  slot {} [{}] {}",
                slot.key,
                if slot.occupied { "x" } else { " " },
                slot.plug_type.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }
}
