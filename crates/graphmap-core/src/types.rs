//! Core descriptor and value types shared by the mapper and the client.
//!
//! Entity types are described explicitly: an [`EntityDescriptor`] is an
//! ordered list of field declarations, built once per type and usually held
//! in a `OnceLock` next to the type it describes.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::MappingError;

// ── Scalar Kinds ─────────────────────────────────────────────────

/// The scalar column types a tag property can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int,
    Float,
    String,
    Bool,
    Timestamp,
}

impl ScalarKind {
    /// The type keyword used in `CREATE TAG` property lists.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Timestamp => "datetime",
        }
    }

    /// Parse a type keyword as reported by the server.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" | "int64" => Some(Self::Int),
            "float" | "double" => Some(Self::Float),
            "string" => Some(Self::String),
            "bool" => Some(Self::Bool),
            "datetime" => Some(Self::Timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// ── Field Declarations ───────────────────────────────────────────

/// The declared type of an entity field, before projection onto a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarKind),
    /// `T | None`.
    Optional(Box<FieldType>),
    /// `A | B | ...`, alternatives in declaration order.
    Union(Vec<FieldType>),
    /// A nested structured entity, stored as a connected vertex rather than a column.
    Entity(String),
    /// The unit/null type inside a union.
    Null,
    /// A declared type with no scalar counterpart (lists, maps, decimals, ...).
    Unsupported(String),
}

impl FieldType {
    pub const INT: FieldType = FieldType::Scalar(ScalarKind::Int);
    pub const FLOAT: FieldType = FieldType::Scalar(ScalarKind::Float);
    pub const STRING: FieldType = FieldType::Scalar(ScalarKind::String);
    pub const BOOL: FieldType = FieldType::Scalar(ScalarKind::Bool);
    pub const TIMESTAMP: FieldType = FieldType::Scalar(ScalarKind::Timestamp);

    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn union(alternatives: impl IntoIterator<Item = FieldType>) -> Self {
        Self::Union(alternatives.into_iter().collect())
    }

    pub fn entity(type_name: impl Into<String>) -> Self {
        Self::Entity(type_name.into())
    }

    pub fn unsupported(declared: impl Into<String>) -> Self {
        Self::Unsupported(declared.into())
    }

    /// Whether a stored value of this field may be NULL.
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Optional(_) | Self::Null => true,
            Self::Union(alts) => alts.iter().any(FieldType::is_nullable),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Optional(inner) => write!(f, "{inner} | None"),
            Self::Union(alts) => {
                for (i, alt) in alts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{alt}")?;
                }
                Ok(())
            }
            Self::Entity(name) => f.write_str(name),
            Self::Null => f.write_str("None"),
            Self::Unsupported(name) => f.write_str(name),
        }
    }
}

/// One named field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: FieldType,
}

/// Ordered description of a node entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    type_name: String,
    fields: Vec<FieldDecl>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field. Declaration order is preserved in the tag schema.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Description of a relation type: its name plus the declared endpoint types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    type_name: String,
    source: Vec<String>,
    target: Vec<String>,
}

impl RelationDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            source: Vec::new(),
            target: Vec::new(),
        }
    }

    /// Declared source type(s). More than one means a union.
    pub fn source<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source = types.into_iter().map(Into::into).collect();
        self
    }

    /// Declared target type(s). More than one means a union.
    pub fn target<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn source_types(&self) -> &[String] {
        &self.source
    }

    pub fn target_types(&self) -> &[String] {
        &self.target
    }
}

// ── Runtime Values ───────────────────────────────────────────────

/// A runtime property value as written to or read from the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(NaiveDateTime),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Short kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Timestamp(_) => "datetime",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// The scalar column kind of this value, if it has one.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Self::Bool(_) => Some(ScalarKind::Bool),
            Self::Int(_) => Some(ScalarKind::Int),
            Self::Float(_) => Some(ScalarKind::Float),
            Self::String(_) => Some(ScalarKind::String),
            Self::Timestamp(_) => Some(ScalarKind::Timestamp),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Ordered field name → value mapping for one vertex or edge.
pub type Record = IndexMap<String, Value>;

// ── Namespace Parameters ─────────────────────────────────────────

/// Vertex identifier type of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VidType {
    Int64,
    FixedString(u32),
}

impl Default for VidType {
    fn default() -> Self {
        Self::FixedString(32)
    }
}

impl fmt::Display for VidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64 => f.write_str("INT64"),
            Self::FixedString(width) => write!(f, "FIXED_STRING({width})"),
        }
    }
}

impl FromStr for VidType {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        if normalized == "INT64" {
            return Ok(Self::Int64);
        }
        normalized
            .strip_prefix("FIXED_STRING(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|width| width.trim().parse::<u32>().ok())
            .filter(|width| *width > 0)
            .map(Self::FixedString)
            .ok_or_else(|| MappingError::InvalidName {
                name: s.to_string(),
                reason: "expected INT64 or FIXED_STRING(<width>)",
            })
    }
}
