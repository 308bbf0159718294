//! Schema element naming.
//!
//! Type names become tag/edge names by a one-way PascalCase → snake_case
//! conversion: every uppercase letter opens a new `_`-prefixed lowercase
//! segment and leading underscores are trimmed. `PDFNode` therefore maps to
//! `p_d_f_node`. Uniqueness across types is enforced by the registry.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};

/// A tag or edge type name as it appears in statements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SchemaName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SchemaName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SchemaName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Derive the schema element name for an entity or relation type name.
pub fn to_schema_name(type_name: &str) -> Result<SchemaName> {
    if type_name.is_empty() {
        return Err(MappingError::InvalidName {
            name: String::new(),
            reason: "type name is empty",
        });
    }

    let mut out = String::with_capacity(type_name.len() + 4);
    for ch in type_name.chars() {
        if ch.is_uppercase() {
            out.push('_');
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    let trimmed = out.trim_start_matches('_');
    if trimmed.is_empty() {
        return Err(MappingError::InvalidName {
            name: type_name.to_string(),
            reason: "type name has no characters besides underscores",
        });
    }
    Ok(SchemaName(trimmed.to_string()))
}

/// Check that `name` can be embedded unquoted as a namespace, tag, edge,
/// index, or property identifier.
pub fn ensure_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start {
        return Err(MappingError::InvalidName {
            name: name.to_string(),
            reason: "identifiers must start with an ASCII letter or underscore",
        });
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MappingError::InvalidName {
            name: name.to_string(),
            reason: "identifiers may only contain ASCII letters, digits, and underscores",
        });
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_case_becomes_snake_case() {
        assert_eq!(to_schema_name("HasLib").unwrap(), "has_lib");
        assert_eq!(to_schema_name("RootNode").unwrap(), "root_node");
        assert_eq!(to_schema_name("Insan").unwrap(), "insan");
    }

    #[test]
    fn acronyms_split_per_letter() {
        assert_eq!(to_schema_name("PDFNode").unwrap(), "p_d_f_node");
        assert_eq!(to_schema_name("PdfNode").unwrap(), "pdf_node");
    }

    #[test]
    fn snake_case_input_is_unchanged() {
        let once = to_schema_name("HasGeneralDocumentInfo").unwrap();
        assert_eq!(once, "has_general_document_info");
        let twice = to_schema_name(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            to_schema_name(""),
            Err(MappingError::InvalidName { .. })
        ));
        assert!(to_schema_name("__").is_err());
    }

    #[test]
    fn identifier_rules() {
        assert!(ensure_identifier("knowledge_graph").is_ok());
        assert!(ensure_identifier("_t1").is_ok());
        assert!(ensure_identifier("1abc").is_err());
        assert!(ensure_identifier("a b").is_err());
        assert!(ensure_identifier("x;DROP SPACE y").is_err());
        assert!(ensure_identifier("").is_err());
    }
}
