//! Bridging serde-serializable domain structs to ordered property records.
//!
//! The descriptor decides which fields become columns and which scalar kind
//! each value is read as. Nested entity fields never appear in a record.

use chrono::{DateTime, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MappingError, Result};
use crate::mapping::{project_columns, scalar_type_of, FieldMapping};
use crate::naming::{to_schema_name, SchemaName};
use crate::types::{EntityDescriptor, Record, RelationDescriptor, ScalarKind, Value};

/// A node type that can be stored as a tagged vertex.
pub trait Entity: Serialize + DeserializeOwned {
    fn descriptor() -> &'static EntityDescriptor;

    fn schema_name() -> Result<SchemaName> {
        to_schema_name(Self::descriptor().type_name())
    }

    fn to_record(&self) -> Result<Record> {
        encode_record(Self::descriptor(), self)
    }

    fn from_record(record: &Record) -> Result<Self> {
        decode_record(Self::descriptor(), record)
    }
}

/// A relation type that can be stored as an edge type.
pub trait Relation {
    fn descriptor() -> &'static RelationDescriptor;

    fn schema_name() -> Result<SchemaName> {
        to_schema_name(Self::descriptor().type_name())
    }
}

/// Serialize `value` and project it onto the descriptor's columns, in order.
pub fn encode_record<T: Serialize + ?Sized>(
    descriptor: &EntityDescriptor,
    value: &T,
) -> Result<Record> {
    let json = serde_json::to_value(value).map_err(|e| MappingError::Encode {
        entity: descriptor.type_name().to_string(),
        message: e.to_string(),
    })?;
    let serde_json::Value::Object(mut map) = json else {
        return Err(MappingError::Encode {
            entity: descriptor.type_name().to_string(),
            message: "entity did not serialize to a map".to_string(),
        });
    };

    let mut record = Record::with_capacity(descriptor.fields().len());
    for field in descriptor.fields() {
        let FieldMapping::Column(kind) = scalar_type_of(descriptor.type_name(), field)? else {
            continue;
        };
        let raw = map.remove(&field.name).unwrap_or(serde_json::Value::Null);
        record.insert(field.name.clone(), json_to_value(&field.name, kind, raw)?);
    }
    Ok(record)
}

/// How timestamps are rendered for serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampStyle {
    /// `2023-01-01T12:00:00`, read by `NaiveDateTime`.
    Naive,
    /// `2023-01-01T12:00:00Z`, read by `DateTime<Utc>`.
    Utc,
}

/// Rebuild a typed entity from a property record.
///
/// Stored timestamps carry no offset. They are offered to serde in naive
/// form first and, if that fails, as UTC, so both `NaiveDateTime` and
/// `DateTime<Utc>` fields decode. A type mixing the two is not supported.
pub fn decode_record<T: DeserializeOwned>(
    descriptor: &EntityDescriptor,
    record: &Record,
) -> Result<T> {
    let decode_error = |message: String| MappingError::Decode {
        entity: descriptor.type_name().to_string(),
        message,
    };

    match serde_json::from_value(record_to_json(descriptor, record, TimestampStyle::Naive)) {
        Ok(value) => Ok(value),
        Err(naive) if record.values().any(|v| matches!(v, Value::Timestamp(_))) => {
            serde_json::from_value(record_to_json(descriptor, record, TimestampStyle::Utc))
                .map_err(|utc| decode_error(format!("{naive} (with UTC timestamps: {utc})")))
        }
        Err(e) => Err(decode_error(e.to_string())),
    }
}

fn record_to_json(
    descriptor: &EntityDescriptor,
    record: &Record,
    style: TimestampStyle,
) -> serde_json::Value {
    let mut map = serde_json::Map::with_capacity(record.len());
    for field in descriptor.fields() {
        if let Some(value) = record.get(&field.name) {
            map.insert(field.name.clone(), value_to_json(value, style));
        }
    }
    serde_json::Value::Object(map)
}

/// Check that `record` satisfies every column of `descriptor`: required
/// columns are present and non-null, and each value matches its column kind.
pub fn validate_record(descriptor: &EntityDescriptor, record: &Record) -> Result<()> {
    let decode_error = |message: String| MappingError::Decode {
        entity: descriptor.type_name().to_string(),
        message,
    };

    for column in project_columns(descriptor)? {
        match record.get(&column.name) {
            None | Some(Value::Null) if !column.nullable => {
                return Err(decode_error(format!(
                    "required field {} is missing",
                    column.name
                )));
            }
            None | Some(Value::Null) => {}
            Some(value) => {
                let compatible = match (column.kind, value) {
                    (ScalarKind::Float, Value::Int(_)) => true,
                    (kind, value) => value.scalar_kind() == Some(kind),
                };
                if !compatible {
                    return Err(decode_error(format!(
                        "field {} expected {} but found {}",
                        column.name,
                        column.kind,
                        value.kind_name()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Parse the timestamp text produced by serde for `NaiveDateTime` or
/// `DateTime<Utc>` fields. Offsets are normalized to UTC.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

fn json_to_value(field: &str, kind: ScalarKind, raw: serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;

    let mismatch = |raw: &Json| {
        let found = match raw {
            Json::Array(_) => "list".to_string(),
            Json::Object(_) => "map".to_string(),
            other => other.to_string(),
        };
        MappingError::unsupported_value(Some(field), format!("{found} for {kind} column"))
    };

    match (kind, &raw) {
        (_, Json::Null) => Ok(Value::Null),
        (ScalarKind::Int, Json::Number(n)) => n.as_i64().map(Value::Int).ok_or_else(|| mismatch(&raw)),
        (ScalarKind::Float, Json::Number(n)) => {
            n.as_f64().map(Value::Float).ok_or_else(|| mismatch(&raw))
        }
        (ScalarKind::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (ScalarKind::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
        (ScalarKind::Timestamp, Json::String(s)) => {
            parse_timestamp(s).map(Value::Timestamp).ok_or_else(|| mismatch(&raw))
        }
        _ => Err(mismatch(&raw)),
    }
}

fn value_to_json(value: &Value, style: TimestampStyle) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::Timestamp(ts) => {
            let layout = match style {
                TimestampStyle::Naive => "%Y-%m-%dT%H:%M:%S%.f",
                TimestampStyle::Utc => "%Y-%m-%dT%H:%M:%S%.fZ",
            };
            Json::String(ts.format(layout).to_string())
        }
        Value::List(items) => Json::Array(items.iter().map(|v| value_to_json(v, style)).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v, style)))
                .collect(),
        ),
    }
}
