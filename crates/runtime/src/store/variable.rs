//! Meta store that embeds the record in the item's own variables.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use item_core::{
    EngineError, ItemAccessor, ItemMeta, Result, VarValue, verify_embedded,
};
use tracing::{debug, warn};

use super::MetaStore;

/// Variable holding the marker-prefixed, base64-encoded meta record.
pub const META_VARIABLE: &str = "__item_meta";
pub const META_MARKER: &str = "IMETA1:";
/// Prefix of the redundant per-field variables.
pub const SPLIT_PREFIX: &str = "__meta.";

/// Stores meta records inside the item itself.
///
/// Survives wherever the host already persists item variables. With
/// `write_variables` the core fields are additionally written as
/// `__meta.<field>` variables, which extraction falls back to when the
/// embedded record is missing or unreadable.
#[derive(Debug, Default, Clone, Copy)]
pub struct VariableMetaStore;

impl VariableMetaStore {
    pub fn new() -> Self {
        Self
    }

    fn write_split<A: ItemAccessor>(accessor: &A, item: &A::Item, meta: &ItemMeta) -> Result<()> {
        let fields = [
            ("metaVersion", VarValue::Int(meta.meta_version.into())),
            ("formatVersion", VarValue::Int(meta.format_version.into())),
            ("nameKey", VarValue::Text(meta.name_key.clone())),
            ("typeId", VarValue::Int(meta.type_id.into())),
            ("quality", VarValue::Int(meta.quality.into())),
            ("displayQuality", VarValue::Int(meta.display_quality.into())),
            ("value", VarValue::Int(meta.value.into())),
            ("ownerId", VarValue::Text(meta.owner_id.clone())),
        ];
        for (field, value) in fields {
            accessor.set_variable(item, &format!("{SPLIT_PREFIX}{field}"), &value)?;
        }
        Ok(())
    }

    fn read_split<A: ItemAccessor>(accessor: &A, item: &A::Item) -> Result<Option<ItemMeta>> {
        let read = |field: &str| accessor.variable(item, &format!("{SPLIT_PREFIX}{field}"));
        let int = |field: &str| -> Result<Option<i64>> { Ok(read(field)?.and_then(|v| v.as_i64())) };
        let text = |field: &str| -> Result<Option<String>> {
            Ok(read(field)?.and_then(|v| v.as_str().map(str::to_owned)))
        };

        let Some(type_id) = int("typeId")? else {
            return Ok(None);
        };
        let narrow = |v: i64| i32::try_from(v).unwrap_or_default();

        Ok(Some(ItemMeta {
            meta_version: int("metaVersion")?.and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
            format_version: int("formatVersion")?.and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
            name_key: text("nameKey")?.unwrap_or_default(),
            remark_key: None,
            type_id: narrow(type_id),
            quality: int("quality")?.map(narrow).unwrap_or_default(),
            display_quality: int("displayQuality")?.map(narrow).unwrap_or_default(),
            value: int("value")?.map(narrow).unwrap_or_default(),
            owner_id: text("ownerId")?.unwrap_or_default(),
            embedded_json: None,
            extra_checksum: None,
        }))
    }
}

impl<A: ItemAccessor> MetaStore<A> for VariableMetaStore {
    fn record_meta(
        &self,
        accessor: &A,
        item: &A::Item,
        meta: &ItemMeta,
        write_variables: bool,
    ) -> Result<()> {
        let json = serde_json::to_string(meta)?;
        let encoded = format!("{META_MARKER}{}", STANDARD.encode(json.as_bytes()));
        accessor.set_variable(item, META_VARIABLE, &VarValue::Text(encoded))?;

        if write_variables {
            Self::write_split(accessor, item, meta)?;
        }
        Ok(())
    }

    fn try_extract_meta(&self, accessor: &A, item: &A::Item) -> Result<Option<ItemMeta>> {
        let embedded = match accessor.variable(item, META_VARIABLE)? {
            Some(VarValue::Text(text)) => decode_embedded(&text),
            _ => None,
        };

        let meta = match embedded {
            Some(meta) => Some(meta),
            None => Self::read_split(accessor, item)?,
        };
        let Some(meta) = meta else {
            return Ok(None);
        };

        let mut meta = meta.normalize();
        if !verify_embedded(&mut meta) {
            warn!(
                target: "item_runtime::store",
                id = %accessor.stable_id(item),
                "Embedded payload failed checksum, discarded"
            );
        }
        Ok(Some(meta))
    }
}

fn decode_embedded(text: &str) -> Option<ItemMeta> {
    let payload = text.strip_prefix(META_MARKER)?;
    let decoded = STANDARD
        .decode(payload)
        .map_err(|e| EngineError::InvalidArgument(e.to_string()))
        .and_then(|bytes| {
            String::from_utf8(bytes).map_err(|e| EngineError::InvalidArgument(e.to_string()))
        })
        .and_then(|json| serde_json::from_str::<ItemMeta>(&json).map_err(EngineError::from));

    match decoded {
        Ok(meta) => Some(meta),
        Err(error) => {
            debug!(
                target: "item_runtime::store",
                error = %error,
                "Embedded meta record unreadable, falling back to split variables"
            );
            None
        }
    }
}
