//! Projection of declared field types onto tag columns.
//!
//! Unknown scalar types are a hard error. There is no fallback to `string`.

use crate::error::{MappingError, Result};
use crate::types::{EntityDescriptor, FieldDecl, FieldType, ScalarKind};

/// How a declared field lands in the tag schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMapping {
    Column(ScalarKind),
    /// Nested entity: materialized as its own vertex, not as a column.
    Skip,
}

/// One projected tag column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
}

/// Resolve the column kind of `field` declared on entity `entity`.
///
/// Optional and union wrappers resolve to their first alternative that is
/// neither null nor a nested entity. A union made only of nested entities
/// (and null) is skipped.
pub fn scalar_type_of(entity: &str, field: &FieldDecl) -> Result<FieldMapping> {
    match resolve(&field.ty) {
        Resolution::Column(kind) => Ok(FieldMapping::Column(kind)),
        Resolution::Skip => Ok(FieldMapping::Skip),
        Resolution::Unresolved => Err(MappingError::UnsupportedType {
            entity: entity.to_string(),
            field: field.name.clone(),
            declared: field.ty.to_string(),
        }),
    }
}

/// The ordered `(field, type)` column list for an entity's tag.
pub fn project_columns(descriptor: &EntityDescriptor) -> Result<Vec<Column>> {
    let mut columns = Vec::with_capacity(descriptor.fields().len());
    for field in descriptor.fields() {
        if let FieldMapping::Column(kind) = scalar_type_of(descriptor.type_name(), field)? {
            columns.push(Column {
                name: field.name.clone(),
                kind,
                nullable: field.ty.is_nullable(),
            });
        }
    }
    Ok(columns)
}

enum Resolution {
    Column(ScalarKind),
    Skip,
    Unresolved,
}

fn resolve(ty: &FieldType) -> Resolution {
    match ty {
        FieldType::Scalar(kind) => Resolution::Column(*kind),
        FieldType::Entity(_) => Resolution::Skip,
        FieldType::Null | FieldType::Unsupported(_) => Resolution::Unresolved,
        FieldType::Optional(inner) => resolve(inner),
        FieldType::Union(alternatives) => {
            let mut saw_entity = false;
            for alt in alternatives {
                match alt {
                    FieldType::Null => continue,
                    FieldType::Entity(_) => saw_entity = true,
                    other => match resolve(other) {
                        Resolution::Skip => saw_entity = true,
                        resolved => return resolved,
                    },
                }
            }
            if saw_entity {
                Resolution::Skip
            } else {
                Resolution::Unresolved
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, ty: FieldType) -> FieldDecl {
        FieldDecl {
            name: name.to_string(),
            ty,
        }
    }

    #[test]
    fn optional_string_resolves_to_string() {
        let field = decl("field_2", FieldType::union([FieldType::STRING, FieldType::Null]));
        assert_eq!(
            scalar_type_of("TestNode", &field).unwrap(),
            FieldMapping::Column(ScalarKind::String)
        );
        let field = decl("field_2", FieldType::optional(FieldType::STRING));
        assert_eq!(
            scalar_type_of("TestNode", &field).unwrap(),
            FieldMapping::Column(ScalarKind::String)
        );
    }

    #[test]
    fn nested_entity_is_skipped() {
        let field = decl("adres", FieldType::entity("Adres"));
        assert_eq!(scalar_type_of("Insan", &field).unwrap(), FieldMapping::Skip);
        let field = decl("adres", FieldType::optional(FieldType::entity("Adres")));
        assert_eq!(scalar_type_of("Insan", &field).unwrap(), FieldMapping::Skip);
    }

    #[test]
    fn union_takes_first_scalar_alternative() {
        let field = decl(
            "value",
            FieldType::union([
                FieldType::entity("Adres"),
                FieldType::Null,
                FieldType::INT,
                FieldType::STRING,
            ]),
        );
        assert_eq!(
            scalar_type_of("Any", &field).unwrap(),
            FieldMapping::Column(ScalarKind::Int)
        );
    }

    #[test]
    fn unknown_types_fail_loudly() {
        let field = decl("tags", FieldType::unsupported("list[str]"));
        let err = scalar_type_of("Host", &field).unwrap_err();
        assert_eq!(
            err,
            MappingError::UnsupportedType {
                entity: "Host".into(),
                field: "tags".into(),
                declared: "list[str]".into(),
            }
        );

        let only_null = decl("nothing", FieldType::Null);
        assert!(scalar_type_of("Host", &only_null).is_err());

        let bad_union = decl(
            "value",
            FieldType::union([FieldType::Null, FieldType::unsupported("Decimal"), FieldType::INT]),
        );
        assert!(scalar_type_of("Host", &bad_union).is_err());
    }

    #[test]
    fn projection_keeps_declaration_order_and_drops_nested() {
        let descriptor = EntityDescriptor::new("Insan")
            .field("name", FieldType::STRING)
            .field("adres", FieldType::entity("Adres"))
            .field("age", FieldType::optional(FieldType::INT))
            .field("born", FieldType::TIMESTAMP);
        let columns = project_columns(&descriptor).unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["name", "age", "born"]);
        assert!(columns[1].nullable);
        assert_eq!(columns[2].kind, ScalarKind::Timestamp);
    }
}
