//! Deterministic content-derived vertex identifiers.
//!
//! The hash covers the schema name and every `field=literal` pair in record
//! order, so the same instance always lands on the same VID and re-inserting
//! it with `IF NOT EXISTS` is a no-op.

use crate::error::Result;
use crate::format::format_field;
use crate::naming::SchemaName;
use crate::types::Record;

/// Width of the default `FIXED_STRING(32)` vertex id type.
pub const DEFAULT_VID_WIDTH: usize = 32;

/// BLAKE3 content VID, hex-encoded and truncated to `DEFAULT_VID_WIDTH`.
pub fn content_vid(schema: &SchemaName, record: &Record) -> Result<String> {
    content_vid_with_width(schema, record, DEFAULT_VID_WIDTH)
}

/// BLAKE3 content VID truncated to `width` hex characters (at most 64).
pub fn content_vid_with_width(schema: &SchemaName, record: &Record, width: usize) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(schema.as_str().as_bytes());
    for (field, value) in record {
        hasher.update(&[0]);
        hasher.update(field.as_bytes());
        hasher.update(b"=");
        hasher.update(format_field(field, value)?.as_bytes());
    }
    let mut hex = hasher.finalize().to_hex().to_string();
    hex.truncate(width.min(hex.len()));
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::to_schema_name;
    use crate::types::Value;

    fn record(name: &str) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), Value::from(name));
        record
    }

    #[test]
    fn same_content_same_vid() {
        let schema = to_schema_name("LibNode").unwrap();
        let a = content_vid(&schema, &record("lib_a")).unwrap();
        let b = content_vid(&schema, &record("lib_a")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_VID_WIDTH);
    }

    #[test]
    fn schema_and_values_both_matter() {
        let lib = to_schema_name("LibNode").unwrap();
        let onto = to_schema_name("OntologyNode").unwrap();
        let base = content_vid(&lib, &record("x")).unwrap();
        assert_ne!(base, content_vid(&onto, &record("x")).unwrap());
        assert_ne!(base, content_vid(&lib, &record("y")).unwrap());
    }

    #[test]
    fn width_is_capped_at_full_digest() {
        let schema = to_schema_name("LibNode").unwrap();
        let full = content_vid_with_width(&schema, &record("x"), 500).unwrap();
        assert_eq!(full.len(), 64);
    }
}
