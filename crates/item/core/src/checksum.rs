//! Encoding and integrity checks for the embedded fragment payload.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{EngineError, Result};
use crate::meta::ItemMeta;

/// CRC32 of `text` as uppercase hex of its little-endian bytes.
pub fn payload_checksum(text: &str) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(text.as_bytes());
    hex::encode_upper(hasher.finalize().to_le_bytes())
}

pub fn encode_payload(json: String, base64: bool) -> String {
    if base64 {
        STANDARD.encode(json.as_bytes())
    } else {
        json
    }
}

/// Returns the raw JSON text of a stored payload.
///
/// Text that already looks like JSON is returned unchanged; anything else
/// is treated as base64 of UTF-8.
pub fn decode_payload(stored: &str) -> Result<String> {
    let trimmed = stored.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(stored.to_owned());
    }

    let bytes = STANDARD
        .decode(stored.trim())
        .map_err(|e| EngineError::InvalidArgument(format!("payload is not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| EngineError::InvalidArgument(format!("payload is not UTF-8: {e}")))
}

/// Verifies the embedded payload against its checksum.
///
/// On mismatch, or when the payload cannot be decoded, both the payload and
/// the checksum are discarded. Returns `false` in that case.
pub fn verify_embedded(meta: &mut ItemMeta) -> bool {
    let (Some(stored), Some(expected)) = (meta.embedded_json.as_deref(), meta.extra_checksum.as_deref())
    else {
        return true;
    };

    let valid = decode_payload(stored)
        .map(|text| payload_checksum(&text).eq_ignore_ascii_case(expected))
        .unwrap_or(false);

    if !valid {
        meta.embedded_json = None;
        meta.extra_checksum = None;
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_vector() {
        // CRC32("123456789") = 0xCBF43926
        assert_eq!(payload_checksum("123456789"), "2639F4CB");
    }

    #[test]
    fn test_decode_passthrough_and_base64() {
        let json = r#"{"tags":["a"]}"#.to_string();
        assert_eq!(decode_payload(&json).unwrap(), json);

        let encoded = encode_payload(json.clone(), true);
        assert_ne!(encoded, json);
        assert_eq!(decode_payload(&encoded).unwrap(), json);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_payload("not base64 at all!").is_err());
    }

    #[test]
    fn test_verify_discards_on_mismatch() {
        let mut meta: ItemMeta = serde_json::from_str("{}").unwrap();
        meta.embedded_json = Some(r#"{"a":1}"#.into());
        meta.extra_checksum = Some(payload_checksum(r#"{"a":1}"#).to_lowercase());
        assert!(verify_embedded(&mut meta));
        assert!(meta.embedded_json.is_some());

        meta.extra_checksum = Some("DEADBEEF".into());
        assert!(!verify_embedded(&mut meta));
        assert!(meta.embedded_json.is_none());
        assert!(meta.extra_checksum.is_none());
    }
}
