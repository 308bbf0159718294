//! Write operations for the graph.
//!
//! Vertex and edge inserts use the `IF NOT EXISTS` form and run under the
//! configured retry policy. Vertices are identified by (namespace, vid).

use graphmap_core::naming::ensure_identifier;
use graphmap_core::vid::content_vid;
use graphmap_core::{Entity, Record, Relation, SchemaName, Value};

use crate::client::{GraphClient, GraphError};
use crate::statements;

fn vertex_target(namespace: &str, tag: &str, vid: &str) -> String {
    format!("{tag} {vid:?} in namespace {namespace}")
}

fn ensure_fields(record: &Record) -> Result<(), GraphError> {
    for field in record.keys() {
        ensure_identifier(field)?;
    }
    Ok(())
}

impl GraphClient {
    // ── Vertices ─────────────────────────────────────────────────

    /// Insert a vertex unless one with the same vid already carries `tag`.
    pub async fn insert_vertex(
        &self,
        namespace: &str,
        tag: &str,
        vid: &str,
        record: &Record,
    ) -> Result<(), GraphError> {
        ensure_identifier(tag)?;
        ensure_fields(record)?;
        let statement = statements::insert_vertex(tag, vid, record, true)?;

        let target = vertex_target(namespace, tag, vid);
        let mut session = self.session(Some(namespace)).await?;
        session
            .execute_retrying(&statement, &self.config().retry, |message| GraphError::Write {
                operation: "insert vertex",
                target: target.clone(),
                message,
            })
            .await?;

        tracing::debug!(namespace, tag, vid, "Inserted vertex");
        Ok(())
    }

    /// Insert a vertex, failing with a `Write` error if `vid` already exists.
    ///
    /// The existence check and the insert are two statements; a concurrent
    /// writer can still slip in between them.
    pub async fn insert_vertex_forced(
        &self,
        namespace: &str,
        tag: &str,
        vid: &str,
        record: &Record,
    ) -> Result<(), GraphError> {
        ensure_identifier(tag)?;
        ensure_fields(record)?;
        let statement = statements::insert_vertex(tag, vid, record, false)?;

        let target = vertex_target(namespace, tag, vid);
        let mut session = self.session(Some(namespace)).await?;
        let existing = session
            .execute_checked(&statements::match_by_id(vid), |message| GraphError::Read {
                operation: "look up vertex",
                target: target.clone(),
                message,
            })
            .await?;
        if !existing.is_empty() {
            return Err(GraphError::Write {
                operation: "insert vertex",
                target,
                message: format!("vertex {vid:?} already exists"),
            });
        }

        session
            .execute_retrying(&statement, &self.config().retry, |message| GraphError::Write {
                operation: "insert vertex",
                target: target.clone(),
                message,
            })
            .await?;

        tracing::debug!(namespace, tag, vid, "Inserted vertex (forced)");
        Ok(())
    }

    /// Insert a typed entity under its own tag. Returns the tag name.
    pub async fn insert_entity<T: Entity>(
        &self,
        namespace: &str,
        vid: &str,
        entity: &T,
    ) -> Result<SchemaName, GraphError> {
        let tag = T::schema_name()?;
        let record = entity.to_record()?;
        self.insert_vertex(namespace, tag.as_str(), vid, &record)
            .await?;
        Ok(tag)
    }

    /// Insert a typed entity under a vid derived from its content.
    /// Returns the vid; inserting the same content twice is a no-op.
    pub async fn insert_entity_by_content<T: Entity>(
        &self,
        namespace: &str,
        entity: &T,
    ) -> Result<String, GraphError> {
        let tag = T::schema_name()?;
        let record = entity.to_record()?;
        let vid = content_vid(&tag, &record)?;
        self.insert_vertex(namespace, tag.as_str(), &vid, &record)
            .await?;
        Ok(vid)
    }

    /// Set one property of an existing vertex.
    pub async fn update_field(
        &self,
        namespace: &str,
        tag: &str,
        vid: &str,
        field: &str,
        value: &Value,
    ) -> Result<(), GraphError> {
        ensure_identifier(tag)?;
        ensure_identifier(field)?;
        let statement = statements::update_vertex(tag, vid, field, value)?;

        let target = format!("{field} of {}", vertex_target(namespace, tag, vid));
        let mut session = self.session(Some(namespace)).await?;
        session
            .execute_retrying(&statement, &self.config().retry, |message| GraphError::Write {
                operation: "update",
                target: target.clone(),
                message,
            })
            .await?;

        tracing::debug!(namespace, tag, vid, field, "Updated vertex field");
        Ok(())
    }

    // ── Edges ────────────────────────────────────────────────────

    /// Insert the edge `src -> dst` of type `edge`. The same ordered pair
    /// under the same edge type is the same edge.
    pub async fn insert_edge(
        &self,
        namespace: &str,
        edge: &str,
        src: &str,
        dst: &str,
        record: Option<&Record>,
    ) -> Result<(), GraphError> {
        ensure_identifier(edge)?;
        if let Some(record) = record {
            ensure_fields(record)?;
        }
        let statement = statements::insert_edge(edge, src, dst, record)?;

        let target = format!("{edge} {src:?}->{dst:?} in namespace {namespace}");
        let mut session = self.session(Some(namespace)).await?;
        session
            .execute_retrying(&statement, &self.config().retry, |message| GraphError::Write {
                operation: "insert edge",
                target: target.clone(),
                message,
            })
            .await?;

        tracing::debug!(namespace, edge, src, dst, "Inserted edge");
        Ok(())
    }

    /// Insert a propertyless edge of relation type `R`.
    pub async fn insert_relation<R: Relation>(
        &self,
        namespace: &str,
        src: &str,
        dst: &str,
    ) -> Result<(), GraphError> {
        let edge = R::schema_name()?;
        self.insert_edge(namespace, edge.as_str(), src, dst, None)
            .await
    }
}
