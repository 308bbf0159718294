//! Explicit schema name → type registry.
//!
//! Populated once at startup and read thereafter. Registration fails when two
//! different type names normalize to the same schema name.

use indexmap::IndexMap;

use crate::entity::{Entity, Relation};
use crate::error::{MappingError, Result};
use crate::mapping::{project_columns, Column};
use crate::naming::{to_schema_name, SchemaName};
use crate::types::{EntityDescriptor, RelationDescriptor};

/// A registered node type.
#[derive(Debug, Clone)]
pub struct RegisteredEntity {
    pub schema: SchemaName,
    pub descriptor: EntityDescriptor,
    pub columns: Vec<Column>,
}

/// A registered relation type.
#[derive(Debug, Clone)]
pub struct RegisteredRelation {
    pub schema: SchemaName,
    pub descriptor: RelationDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entities: IndexMap<SchemaName, RegisteredEntity>,
    relations: IndexMap<SchemaName, RegisteredRelation>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entity<T: Entity>(&mut self) -> Result<&mut Self> {
        self.register_descriptor(T::descriptor().clone())
    }

    pub fn register_relation<R: Relation>(&mut self) -> Result<&mut Self> {
        self.register_relation_descriptor(R::descriptor().clone())
    }

    /// Register a node descriptor. Re-registering the same type is a no-op.
    pub fn register_descriptor(&mut self, descriptor: EntityDescriptor) -> Result<&mut Self> {
        let schema = to_schema_name(descriptor.type_name())?;
        if let Some(existing) = self.entities.get(&schema) {
            if existing.descriptor.type_name() == descriptor.type_name() {
                return Ok(self);
            }
            return Err(MappingError::DuplicateSchemaName {
                schema: schema.into_string(),
                first: existing.descriptor.type_name().to_string(),
                second: descriptor.type_name().to_string(),
            });
        }

        let columns = project_columns(&descriptor)?;
        tracing::debug!(schema = %schema, type_name = descriptor.type_name(), "Registered entity type");
        self.entities.insert(
            schema.clone(),
            RegisteredEntity {
                schema,
                descriptor,
                columns,
            },
        );
        Ok(self)
    }

    /// Register a relation descriptor. Re-registering the same type is a no-op.
    pub fn register_relation_descriptor(
        &mut self,
        descriptor: RelationDescriptor,
    ) -> Result<&mut Self> {
        let schema = to_schema_name(descriptor.type_name())?;
        if let Some(existing) = self.relations.get(&schema) {
            if existing.descriptor.type_name() == descriptor.type_name() {
                return Ok(self);
            }
            return Err(MappingError::DuplicateSchemaName {
                schema: schema.into_string(),
                first: existing.descriptor.type_name().to_string(),
                second: descriptor.type_name().to_string(),
            });
        }

        tracing::debug!(schema = %schema, type_name = descriptor.type_name(), "Registered relation type");
        self.relations
            .insert(schema.clone(), RegisteredRelation { schema, descriptor });
        Ok(self)
    }

    /// Look up the node type stored under tag `schema`.
    pub fn entity(&self, schema: &str) -> Option<&RegisteredEntity> {
        self.entities.get(schema)
    }

    pub fn relation(&self, schema: &str) -> Option<&RegisteredRelation> {
        self.relations.get(schema)
    }

    /// Node types in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &RegisteredEntity> {
        self.entities.values()
    }

    /// Relation types in registration order.
    pub fn relations(&self) -> impl Iterator<Item = &RegisteredRelation> {
        self.relations.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}
