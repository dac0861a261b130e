//! The record persisted for each flushed item.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::snapshot::ItemSnapshot;

pub const META_VERSION: u32 = 1;
pub const FORMAT_VERSION: u32 = 1;

/// Named extension fragments embedded alongside the core fields.
///
/// Ordered so the serialized payload (and its checksum) is deterministic.
pub type FragmentMap = BTreeMap<String, serde_json::Value>;

/// Persisted meta record.
///
/// Always built fresh from a snapshot at flush time; never patched in place.
/// `embedded_json` holds the serialized [`FragmentMap`], raw or base64
/// encoded, and `extra_checksum` the CRC over the raw text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    #[serde(default)]
    pub meta_version: u32,
    #[serde(default)]
    pub format_version: u32,
    #[serde(default)]
    pub name_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark_key: Option<String>,
    #[serde(default)]
    pub type_id: i32,
    #[serde(default)]
    pub quality: i32,
    #[serde(default)]
    pub display_quality: i32,
    #[serde(default)]
    pub value: i32,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub embedded_json: Option<String>,
    #[serde(default)]
    pub extra_checksum: Option<String>,
}

impl ItemMeta {
    pub fn from_snapshot(snapshot: &ItemSnapshot, owner_id: &str) -> Self {
        Self {
            meta_version: META_VERSION,
            format_version: FORMAT_VERSION,
            name_key: snapshot
                .raw_name
                .clone()
                .filter(|raw| !raw.is_empty())
                .unwrap_or_else(|| snapshot.name.clone()),
            remark_key: snapshot.remark.clone(),
            type_id: snapshot.type_id,
            quality: snapshot.quality,
            display_quality: snapshot.display_quality,
            value: snapshot.value,
            owner_id: owner_id.to_owned(),
            embedded_json: None,
            extra_checksum: None,
        }
    }

    /// Records written before versioning carry zeros; treat them as version 1.
    pub fn normalize(mut self) -> Self {
        if self.meta_version == 0 {
            self.meta_version = META_VERSION;
        }
        if self.format_version == 0 {
            self.format_version = FORMAT_VERSION;
        }
        self
    }

    pub fn has_payload(&self) -> bool {
        self.embedded_json.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot() -> ItemSnapshot {
        ItemSnapshot {
            name: "Rusty Blade".into(),
            raw_name: Some("item_rusty_blade".into()),
            remark: None,
            type_id: 42,
            quality: 3,
            display_quality: 4,
            value: 120,
            tags: vec!["weapon".into()],
            variables: Vec::new(),
            modifiers: Vec::new(),
            slots: Vec::new(),
        }
    }

    #[test]
    fn test_name_key_prefers_raw_name() {
        let meta = ItemMeta::from_snapshot(&snapshot(), "player");
        assert_eq!(meta.name_key, "item_rusty_blade");
        assert_eq!(meta.owner_id, "player");
        assert_eq!(meta.meta_version, META_VERSION);

        let mut plain = snapshot();
        plain.raw_name = None;
        assert_eq!(ItemMeta::from_snapshot(&plain, "player").name_key, "Rusty Blade");
    }

    #[test]
    fn test_json_field_names() {
        let meta = ItemMeta::from_snapshot(&snapshot(), "player");
        let json: serde_json::Value = serde_json::to_value(&meta).unwrap();
        for field in [
            "metaVersion",
            "formatVersion",
            "nameKey",
            "typeId",
            "displayQuality",
            "ownerId",
            "embeddedJson",
            "extraChecksum",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_normalize_missing_versions() {
        let meta: ItemMeta = serde_json::from_str(r#"{"nameKey":"old","typeId":7}"#).unwrap();
        assert_eq!(meta.meta_version, 0);
        let meta = meta.normalize();
        assert_eq!(meta.meta_version, 1);
        assert_eq!(meta.format_version, 1);
        assert_eq!(meta.type_id, 7);
        assert!(!meta.has_payload());
    }
}
