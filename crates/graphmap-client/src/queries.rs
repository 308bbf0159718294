//! Read operations for the graph.

use graphmap_core::entity::validate_record;
use graphmap_core::naming::ensure_identifier;
use graphmap_core::{Entity, Record, SchemaName, TypeRegistry};

use crate::client::{GraphClient, GraphError};
use crate::statements;
use crate::transport::{ResultSet, VertexData};

/// A vertex resolved against the type registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub vid: String,
    pub schema: SchemaName,
    /// Declared type name of the registered entity, e.g. `PdfNode`.
    pub type_name: String,
    pub properties: Record,
}

impl Vertex {
    /// Decode the properties as entity `T`.
    pub fn decode<T: Entity>(&self) -> Result<T, GraphError> {
        T::from_record(&self.properties).map_err(|e| GraphError::Read {
            operation: "decode vertex",
            target: format!("{:?} as {}", self.vid, T::descriptor().type_name()),
            message: e.to_string(),
        })
    }
}

fn vertices(result: &ResultSet) -> Result<Vec<&VertexData>, String> {
    let index = result
        .column_index("n")
        .ok_or_else(|| "result has no `n` column".to_string())?;
    result
        .rows()
        .iter()
        .map(|row| {
            row.get(index)
                .and_then(|cell| cell.as_vertex())
                .ok_or_else(|| "result row does not hold a vertex".to_string())
        })
        .collect()
}

impl GraphClient {
    /// Fetch the property records of every vertex tagged `tag`, with vids.
    pub async fn get_vertex_records(
        &self,
        namespace: &str,
        tag: &str,
    ) -> Result<Vec<(String, Record)>, GraphError> {
        ensure_identifier(tag)?;
        let target = format!("{tag} vertices in namespace {namespace}");
        let read_error = |message: String| GraphError::Read {
            operation: "fetch",
            target: target.clone(),
            message,
        };

        let mut session = self.session(Some(namespace)).await?;
        let result = session
            .execute_checked(&statements::match_by_tag(tag), read_error)
            .await?;

        vertices(&result)
            .map_err(read_error)?
            .into_iter()
            .map(|vertex| {
                vertex
                    .tags
                    .get(tag)
                    .cloned()
                    .map(|record| (vertex.vid.clone(), record))
                    .ok_or_else(|| read_error(format!("vertex {:?} lacks tag {tag}", vertex.vid)))
            })
            .collect()
    }

    /// Fetch every vertex of entity type `T` and decode it.
    ///
    /// Fails with `Read` if the query fails or any vertex's properties do
    /// not satisfy `T`'s descriptor.
    pub async fn get_vertices_by_type<T: Entity>(
        &self,
        namespace: &str,
    ) -> Result<Vec<T>, GraphError> {
        let tag = T::schema_name()?;
        let records = self.get_vertex_records(namespace, tag.as_str()).await?;

        let mut entities = Vec::with_capacity(records.len());
        for (vid, record) in records {
            let decoded = validate_record(T::descriptor(), &record).and_then(|()| T::from_record(&record));
            match decoded {
                Ok(entity) => entities.push(entity),
                Err(e) => {
                    return Err(GraphError::Read {
                        operation: "decode vertex",
                        target: format!("{vid:?} as {}", T::descriptor().type_name()),
                        message: e.to_string(),
                    })
                }
            }
        }
        tracing::debug!(namespace, tag = %tag, count = entities.len(), "Fetched vertices");
        Ok(entities)
    }

    /// Fetch one vertex by id and resolve its tag through `registry`.
    ///
    /// `NotFound` if no vertex has this id, `AmbiguousType` if it carries
    /// more than one tag, `Read` if the tag is unregistered or the properties
    /// do not satisfy the registered descriptor.
    pub async fn get_vertex_by_id(
        &self,
        namespace: &str,
        vid: &str,
        registry: &TypeRegistry,
    ) -> Result<Vertex, GraphError> {
        let target = format!("{vid:?} in namespace {namespace}");
        let read_error = |message: String| GraphError::Read {
            operation: "fetch vertex",
            target: target.clone(),
            message,
        };

        let mut session = self.session(Some(namespace)).await?;
        let result = session
            .execute_checked(&statements::match_by_id(vid), read_error)
            .await?;
        session.release();

        let found = vertices(&result).map_err(read_error)?;
        let Some(vertex) = found.first() else {
            return Err(GraphError::NotFound {
                namespace: namespace.to_string(),
                vid: vid.to_string(),
            });
        };

        let mut tags = vertex.tags.iter();
        let (tag, properties) = match (tags.next(), tags.next()) {
            (Some(only), None) => only,
            (None, _) => return Err(read_error("vertex carries no tag".to_string())),
            (Some(_), Some(_)) => {
                return Err(GraphError::AmbiguousType {
                    namespace: namespace.to_string(),
                    vid: vid.to_string(),
                    tags: vertex.tags.keys().cloned().collect(),
                })
            }
        };

        let registered = registry
            .entity(tag)
            .ok_or_else(|| read_error(format!("tag {tag} is not registered")))?;
        validate_record(&registered.descriptor, properties)
            .map_err(|e| read_error(e.to_string()))?;

        Ok(Vertex {
            vid: vertex.vid.clone(),
            schema: registered.schema.clone(),
            type_name: registered.descriptor.type_name().to_string(),
            properties: properties.clone(),
        })
    }
}
