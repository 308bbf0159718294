//! Namespace, tag, edge type, and index management.
//!
//! Every create uses the `IF NOT EXISTS` form, so repeating a call is a no-op.

use graphmap_core::naming::ensure_identifier;
use graphmap_core::{
    project_columns, to_schema_name, Entity, EntityDescriptor, Relation, RelationDescriptor,
    SchemaName, TypeRegistry, VidType,
};

use crate::client::{DropFailure, GraphClient, GraphError};
use crate::statements;
use crate::transport::{Cell, ResultSet};

/// Default indexed prefix length for string property indexes.
pub const DEFAULT_INDEX_LENGTH: u32 = 100;

/// Namespace creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceOptions {
    pub partition_num: u32,
    pub replica_factor: u32,
    pub vid_type: VidType,
}

impl Default for SpaceOptions {
    fn default() -> Self {
        Self {
            partition_num: 100,
            replica_factor: 1,
            vid_type: VidType::default(),
        }
    }
}

fn schema_error(operation: &'static str, target: impl Into<String>) -> impl FnOnce(String) -> GraphError {
    let target = target.into();
    move |message| GraphError::Schema {
        operation,
        target,
        message,
    }
}

fn in_namespace(name: &str, namespace: &str) -> String {
    format!("{name} in namespace {namespace}")
}

fn names(result: &ResultSet) -> Vec<String> {
    result
        .column("Name")
        .filter_map(Cell::as_str)
        .map(str::to_string)
        .collect()
}

impl GraphClient {
    // ── Namespaces ───────────────────────────────────────────────

    pub async fn create_namespace(&self, name: &str, options: SpaceOptions) -> Result<(), GraphError> {
        ensure_identifier(name)?;
        let statement = statements::create_space(
            name,
            options.partition_num,
            options.replica_factor,
            options.vid_type,
        );
        let mut session = self.session(None).await?;
        session
            .execute_checked(&statement, schema_error("create namespace", name))
            .await?;

        tracing::info!(
            namespace = name,
            partition_num = options.partition_num,
            replica_factor = options.replica_factor,
            vid_type = %options.vid_type,
            "Created namespace"
        );
        Ok(())
    }

    pub async fn list_namespaces(&self) -> Result<Vec<String>, GraphError> {
        let mut session = self.session(None).await?;
        let result = session
            .execute_checked(statements::show_spaces(), schema_error("list", "namespaces"))
            .await?;
        Ok(names(&result))
    }

    pub async fn delete_namespace(&self, name: &str) -> Result<(), GraphError> {
        ensure_identifier(name)?;
        let mut session = self.session(None).await?;
        session
            .execute_checked(&statements::drop_space(name), schema_error("drop namespace", name))
            .await?;
        tracing::info!(namespace = name, "Dropped namespace");
        Ok(())
    }

    /// Drop every namespace. Each drop is attempted independently; if any
    /// fails, the result is [`GraphError::PartialDrop`] listing every failure.
    /// Returns the dropped names on full success.
    pub async fn delete_all_namespaces(&self) -> Result<Vec<String>, GraphError> {
        let namespaces = self.list_namespaces().await?;
        let mut dropped = Vec::with_capacity(namespaces.len());
        let mut failures = Vec::new();

        for namespace in namespaces {
            match self.delete_namespace(&namespace).await {
                Ok(()) => dropped.push(namespace),
                Err(e) => {
                    tracing::warn!(namespace = %namespace, error = %e, "Failed to drop namespace");
                    failures.push(DropFailure {
                        message: e.server_message().map_or_else(|| e.to_string(), str::to_string),
                        namespace,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(dropped)
        } else {
            Err(GraphError::PartialDrop { dropped, failures })
        }
    }

    /// Wait until `namespace` can be selected, polling under the configured
    /// retry policy. Newly created namespaces take a heartbeat to appear.
    pub async fn wait_for_namespace(&self, namespace: &str) -> Result<(), GraphError> {
        let policy = &self.config().retry;
        let attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            match self.session(Some(namespace)).await {
                Ok(_) => return Ok(()),
                Err(e @ GraphError::NamespaceSelection { .. }) => {
                    if attempt >= attempts {
                        return Err(GraphError::RetriesExhausted {
                            attempts,
                            last: Box::new(e),
                        });
                    }
                    let delay = policy.delay_after(attempt);
                    tracing::debug!(namespace, attempt, delay_ms = delay.as_millis() as u64, "Namespace not ready yet");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── Tags ─────────────────────────────────────────────────────

    /// Create the tag projected from `descriptor`. Returns the tag name.
    pub async fn create_tag(
        &self,
        namespace: &str,
        descriptor: &EntityDescriptor,
    ) -> Result<SchemaName, GraphError> {
        let tag = to_schema_name(descriptor.type_name())?;
        ensure_identifier(tag.as_str())?;
        let columns = project_columns(descriptor)?;
        if columns.is_empty() {
            return Err(GraphError::Schema {
                operation: "create tag",
                target: in_namespace(tag.as_str(), namespace),
                message: format!("{} has no scalar fields", descriptor.type_name()),
            });
        }
        for column in &columns {
            ensure_identifier(&column.name)?;
        }

        let mut session = self.session(Some(namespace)).await?;
        session
            .execute_checked(
                &statements::create_tag(tag.as_str(), &columns),
                schema_error("create tag", in_namespace(tag.as_str(), namespace)),
            )
            .await?;

        tracing::info!(namespace, tag = %tag, columns = columns.len(), "Created tag");
        Ok(tag)
    }

    pub async fn create_tag_for<T: Entity>(&self, namespace: &str) -> Result<SchemaName, GraphError> {
        self.create_tag(namespace, T::descriptor()).await
    }

    pub async fn list_tags(&self, namespace: &str) -> Result<Vec<String>, GraphError> {
        let mut session = self.session(Some(namespace)).await?;
        let result = session
            .execute_checked(
                statements::show_tags(),
                schema_error("list tags", format!("in namespace {namespace}")),
            )
            .await?;
        Ok(names(&result))
    }

    pub async fn drop_tag(&self, namespace: &str, tag: &str) -> Result<(), GraphError> {
        ensure_identifier(tag)?;
        let mut session = self.session(Some(namespace)).await?;
        session
            .execute_checked(
                &statements::drop_tag(tag),
                schema_error("drop tag", in_namespace(tag, namespace)),
            )
            .await?;
        tracing::info!(namespace, tag, "Dropped tag");
        Ok(())
    }

    // ── Edge Types ───────────────────────────────────────────────

    /// Create the edge type for `relation`.
    ///
    /// With `with_properties`, the edge carries `source_node`/`target_node`
    /// string properties defaulting to the declared endpoint type names,
    /// alternatives joined with `" | "`.
    pub async fn create_edge_type(
        &self,
        namespace: &str,
        relation: &RelationDescriptor,
        with_properties: bool,
    ) -> Result<SchemaName, GraphError> {
        let edge = to_schema_name(relation.type_name())?;
        ensure_identifier(edge.as_str())?;

        let defaults = if with_properties {
            if relation.source_types().is_empty() || relation.target_types().is_empty() {
                return Err(GraphError::Schema {
                    operation: "create edge type",
                    target: in_namespace(edge.as_str(), namespace),
                    message: format!(
                        "{} does not declare both source and target types",
                        relation.type_name()
                    ),
                });
            }
            Some((
                relation.source_types().join(" | "),
                relation.target_types().join(" | "),
            ))
        } else {
            None
        };

        let statement = statements::create_edge(
            edge.as_str(),
            defaults.as_ref().map(|(s, t)| (s.as_str(), t.as_str())),
        );
        let mut session = self.session(Some(namespace)).await?;
        session
            .execute_checked(
                &statement,
                schema_error("create edge type", in_namespace(edge.as_str(), namespace)),
            )
            .await?;

        tracing::info!(namespace, edge = %edge, with_properties, "Created edge type");
        Ok(edge)
    }

    pub async fn create_edge_type_for<R: Relation>(
        &self,
        namespace: &str,
        with_properties: bool,
    ) -> Result<SchemaName, GraphError> {
        self.create_edge_type(namespace, R::descriptor(), with_properties)
            .await
    }

    // ── Indexes ──────────────────────────────────────────────────

    /// Index over the whole tag.
    pub async fn create_tag_index(
        &self,
        namespace: &str,
        tag: &str,
        index: &str,
    ) -> Result<(), GraphError> {
        self.run_index(
            namespace,
            index,
            tag,
            statements::create_tag_index(index, tag, None),
        )
        .await
    }

    /// Index over the whole edge type.
    pub async fn create_edge_type_index(
        &self,
        namespace: &str,
        edge: &str,
        index: &str,
    ) -> Result<(), GraphError> {
        self.run_index(
            namespace,
            index,
            edge,
            statements::create_edge_index(index, edge),
        )
        .await
    }

    /// Index over the first `length` characters of `property` on `tag`.
    /// Pass [`DEFAULT_INDEX_LENGTH`] for the usual prefix length.
    pub async fn create_index_on_property(
        &self,
        namespace: &str,
        tag: &str,
        index: &str,
        property: &str,
        length: u32,
    ) -> Result<(), GraphError> {
        ensure_identifier(property)?;
        self.run_index(
            namespace,
            index,
            tag,
            statements::create_tag_index(index, tag, Some((property, length))),
        )
        .await
    }

    async fn run_index(
        &self,
        namespace: &str,
        index: &str,
        schema: &str,
        statement: String,
    ) -> Result<(), GraphError> {
        ensure_identifier(index)?;
        ensure_identifier(schema)?;
        let mut session = self.session(Some(namespace)).await?;
        session
            .execute_checked(
                &statement,
                schema_error("create index", in_namespace(index, namespace)),
            )
            .await?;
        tracing::info!(namespace, index, schema, "Created index");
        Ok(())
    }

    // ── Bulk Setup ───────────────────────────────────────────────

    /// Create `namespace`, wait for it to become selectable, then create a
    /// tag for every registered entity and a property-carrying edge type for
    /// every registered relation.
    pub async fn create_defined_schemas(
        &self,
        namespace: &str,
        registry: &TypeRegistry,
        options: SpaceOptions,
    ) -> Result<(), GraphError> {
        self.create_namespace(namespace, options).await?;
        self.wait_for_namespace(namespace).await?;

        for entity in registry.entities() {
            self.create_tag(namespace, &entity.descriptor).await?;
        }
        for relation in registry.relations() {
            self.create_edge_type(namespace, &relation.descriptor, true)
                .await?;
        }

        tracing::info!(
            namespace,
            tags = registry.entities().count(),
            edge_types = registry.relations().count(),
            "Created defined schemas"
        );
        Ok(())
    }
}
