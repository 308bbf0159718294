//! graphmap-core: typed entity descriptors and their mapping onto graph schema.
//!
//! This crate provides the pure, I/O-free half of graphmap:
//! - Entity and relation descriptors and the runtime [`Value`] model
//! - Schema element naming (PascalCase → snake_case)
//! - Field type projection onto tag column types
//! - Statement literal formatting
//! - Serde bridging between domain structs and property records
//! - The explicit type registry and the predefined document-graph models
//! - Connection and retry configuration

pub mod config;
pub mod entity;
pub mod error;
pub mod format;
pub mod mapping;
pub mod models;
pub mod naming;
pub mod registry;
pub mod types;
pub mod vid;

pub use config::{GraphConfig, RetryPolicy};
pub use entity::{Entity, Relation};
pub use error::MappingError;
pub use mapping::{project_columns, scalar_type_of, Column, FieldMapping};
pub use naming::{to_schema_name, SchemaName};
pub use registry::TypeRegistry;
pub use types::{
    EntityDescriptor, FieldDecl, FieldType, Record, RelationDescriptor, ScalarKind, Value, VidType,
};
