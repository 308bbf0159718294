//! Value → statement literal formatting.

use crate::error::{MappingError, Result};
use crate::types::Value;

/// Timestamp layout used inside `datetime("...")` literals.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format a value as a statement literal.
pub fn format_value(value: &Value) -> Result<String> {
    format_inner(None, value)
}

/// Format a value, naming `field` in the error if it is unsupported.
pub fn format_field(field: &str, value: &Value) -> Result<String> {
    format_inner(Some(field), value)
}

fn format_inner(field: Option<&str>, value: &Value) -> Result<String> {
    match value {
        Value::Timestamp(ts) => Ok(format!("datetime(\"{}\")", ts.format(TIMESTAMP_FORMAT))),
        Value::Float(f) => format_float(field, *f),
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::String(s) => Ok(quote(s)),
        Value::List(_) | Value::Map(_) => {
            Err(MappingError::unsupported_value(field, value.kind_name()))
        }
    }
}

fn format_float(field: Option<&str>, f: f64) -> Result<String> {
    if !f.is_finite() {
        return Err(MappingError::unsupported_value(field, format!("non-finite float {f}")));
    }
    // Display is the shortest text that round-trips; keep a decimal point so
    // the literal is not read back as an integer.
    let mut text = f.to_string();
    if !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }
    Ok(text)
}

/// Double-quote `s`, escaping backslashes, quotes, and control whitespace.
pub fn quote(s: &str) -> String {
    quote_with(s, '"')
}

/// Single-quote `s`, as used in `id(n) == '<vid>'` predicates.
pub fn quote_single(s: &str) -> String {
    quote_with(s, '\'')
}

fn quote_with(s: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}
