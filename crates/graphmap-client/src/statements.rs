//! nGQL statement text builders.
//!
//! Pure string synthesis. Identifiers are embedded as given, so callers
//! validate them with `ensure_identifier` first; values and vertex ids go
//! through the literal formatter.

use graphmap_core::format::{format_field, quote, quote_single};
use graphmap_core::{Column, MappingError, Record, Value, VidType};

// ── Namespaces ───────────────────────────────────────────────────

pub fn use_space(name: &str) -> String {
    format!("USE {name}")
}

pub fn create_space(name: &str, partition_num: u32, replica_factor: u32, vid_type: VidType) -> String {
    format!(
        "CREATE SPACE IF NOT EXISTS {name} (partition_num = {partition_num}, \
         replica_factor = {replica_factor}, vid_type = {vid_type})"
    )
}

pub fn show_spaces() -> &'static str {
    "SHOW SPACES"
}

pub fn drop_space(name: &str) -> String {
    format!("DROP SPACE {name}")
}

// ── Tags and Edge Types ──────────────────────────────────────────

pub fn create_tag(tag: &str, columns: &[Column]) -> String {
    let fields = columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.kind.type_name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TAG IF NOT EXISTS {tag} ({fields})")
}

pub fn show_tags() -> &'static str {
    "SHOW TAGS"
}

pub fn drop_tag(tag: &str) -> String {
    format!("DROP TAG IF EXISTS {tag}")
}

/// `CREATE EDGE`, propertyless or with `source_node`/`target_node` string
/// properties defaulting to the given type names.
pub fn create_edge(edge: &str, defaults: Option<(&str, &str)>) -> String {
    match defaults {
        None => format!("CREATE EDGE IF NOT EXISTS {edge}()"),
        Some((source, target)) => format!(
            "CREATE EDGE IF NOT EXISTS {edge}(source_node string DEFAULT {}, target_node string DEFAULT {})",
            quote(source),
            quote(target)
        ),
    }
}

// ── Indexes ──────────────────────────────────────────────────────

/// Tag index over the whole tag, or over a `length`-prefix of one property.
pub fn create_tag_index(index: &str, tag: &str, property: Option<(&str, u32)>) -> String {
    match property {
        None => format!("CREATE TAG INDEX IF NOT EXISTS {index} ON {tag}()"),
        Some((prop, length)) => {
            format!("CREATE TAG INDEX IF NOT EXISTS {index} ON {tag}({prop}({length}))")
        }
    }
}

pub fn create_edge_index(index: &str, edge: &str) -> String {
    format!("CREATE EDGE INDEX IF NOT EXISTS {index} ON {edge}()")
}

// ── Data ─────────────────────────────────────────────────────────

/// `INSERT VERTEX`; `if_not_exists` selects the idempotent form.
pub fn insert_vertex(
    tag: &str,
    vid: &str,
    record: &Record,
    if_not_exists: bool,
) -> Result<String, MappingError> {
    let (fields, values) = field_lists(record)?;
    let guard = if if_not_exists { " IF NOT EXISTS" } else { "" };
    Ok(format!(
        "INSERT VERTEX{guard} {tag} ({fields}) VALUES {}: ({values})",
        quote(vid)
    ))
}

pub fn insert_edge(
    edge: &str,
    src: &str,
    dst: &str,
    record: Option<&Record>,
) -> Result<String, MappingError> {
    let (fields, values) = match record {
        Some(record) => field_lists(record)?,
        None => (String::new(), String::new()),
    };
    Ok(format!(
        "INSERT EDGE IF NOT EXISTS {edge} ({fields}) VALUES {}->{}:({values})",
        quote(src),
        quote(dst)
    ))
}

pub fn update_vertex(
    tag: &str,
    vid: &str,
    field: &str,
    value: &Value,
) -> Result<String, MappingError> {
    Ok(format!(
        "UPDATE VERTEX ON {tag} {} SET {field} = {}",
        quote(vid),
        format_field(field, value)?
    ))
}

pub fn match_by_tag(tag: &str) -> String {
    format!("MATCH (n:{tag}) RETURN n")
}

pub fn match_by_id(vid: &str) -> String {
    format!("MATCH (n) WHERE id(n) == {} RETURN n", quote_single(vid))
}

fn field_lists(record: &Record) -> Result<(String, String), MappingError> {
    let mut fields = Vec::with_capacity(record.len());
    let mut values = Vec::with_capacity(record.len());
    for (field, value) in record {
        fields.push(field.as_str());
        values.push(format_field(field, value)?);
    }
    Ok((fields.join(", "), values.join(", ")))
}
