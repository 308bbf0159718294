//! Statement execution against the in-memory catalog.

use indexmap::IndexMap;

use graphmap_core::{Record, ScalarKind, Value, VidType};

use super::parser::{parse_statement, IndexField, PropertyDef, SchemaKind, Statement};
use crate::transport::{
    Cell, ResultSet, VertexData, E_EXECUTION_ERROR, E_SEMANTIC_ERROR, E_SYNTAX_ERROR,
};

struct Failure {
    code: i32,
    message: String,
}

fn execution(message: impl Into<String>) -> Failure {
    Failure {
        code: E_EXECUTION_ERROR,
        message: message.into(),
    }
}

fn semantic(message: impl Into<String>) -> Failure {
    Failure {
        code: E_SEMANTIC_ERROR,
        message: format!("SemanticError: {}", message.into()),
    }
}

fn space_not_found(name: &str) -> Failure {
    execution(format!("SpaceNotFound: SpaceName `{name}`"))
}

fn schema_not_found(kind: SchemaKind, name: &str) -> Failure {
    match kind {
        SchemaKind::Tag => execution(format!("TagNotFound: Tag `{name}`")),
        SchemaKind::Edge => execution(format!("EdgeNotFound: Edge `{name}`")),
    }
}

#[derive(Debug, Clone)]
pub struct IndexDef {
    pub kind: SchemaKind,
    pub schema: String,
    pub fields: Vec<IndexField>,
}

#[derive(Debug, Clone)]
pub struct Space {
    pub partition_num: u32,
    pub replica_factor: u32,
    pub vid_type: VidType,
    pub tags: IndexMap<String, Vec<PropertyDef>>,
    pub edges: IndexMap<String, Vec<PropertyDef>>,
    pub indexes: IndexMap<String, IndexDef>,
    /// vid → tag → properties
    pub vertices: IndexMap<String, IndexMap<String, Record>>,
    /// (edge, src, dst) → properties
    pub edge_data: IndexMap<(String, String, String), Record>,
}

impl Space {
    fn new(partition_num: u32, replica_factor: u32, vid_type: VidType) -> Self {
        Self {
            partition_num,
            replica_factor,
            vid_type,
            tags: IndexMap::new(),
            edges: IndexMap::new(),
            indexes: IndexMap::new(),
            vertices: IndexMap::new(),
            edge_data: IndexMap::new(),
        }
    }

    fn schemas(&self, kind: SchemaKind) -> &IndexMap<String, Vec<PropertyDef>> {
        match kind {
            SchemaKind::Tag => &self.tags,
            SchemaKind::Edge => &self.edges,
        }
    }

    fn schemas_mut(&mut self, kind: SchemaKind) -> &mut IndexMap<String, Vec<PropertyDef>> {
        match kind {
            SchemaKind::Tag => &mut self.tags,
            SchemaKind::Edge => &mut self.edges,
        }
    }

    fn check_vid(&self, vid: &str) -> Result<(), Failure> {
        let fits = match self.vid_type {
            VidType::FixedString(width) => vid.len() <= width as usize,
            VidType::Int64 => vid.parse::<i64>().is_ok(),
        };
        if fits {
            Ok(())
        } else {
            Err(execution(
                "Storage Error: The VID must be a 64-bit integer or a string fitting space vertex id length limit.",
            ))
        }
    }
}

/// All namespaces of one in-memory graph.
#[derive(Debug, Default)]
pub struct Catalog {
    pub spaces: IndexMap<String, Space>,
}

impl Catalog {
    /// Parse and apply `statement` in the context of the session's current
    /// space. Failures come back as a failed `ResultSet`.
    pub fn execute(&mut self, current: &mut Option<String>, statement: &str) -> ResultSet {
        let parsed = match parse_statement(statement) {
            Ok(parsed) => parsed,
            Err(message) => return ResultSet::failure(E_SYNTAX_ERROR, message),
        };
        self.apply(current, parsed)
            .unwrap_or_else(|f| ResultSet::failure(f.code, f.message))
    }

    fn space_mut(&mut self, current: &Option<String>) -> Result<&mut Space, Failure> {
        let name = current
            .as_deref()
            .ok_or_else(|| semantic("Space was not chosen."))?;
        self.spaces.get_mut(name).ok_or_else(|| space_not_found(name))
    }

    fn apply(&mut self, current: &mut Option<String>, statement: Statement) -> Result<ResultSet, Failure> {
        match statement {
            Statement::Use(name) => {
                if !self.spaces.contains_key(&name) {
                    return Err(space_not_found(&name));
                }
                *current = Some(name);
                Ok(ResultSet::empty())
            }

            Statement::CreateSpace {
                name,
                if_not_exists,
                partition_num,
                replica_factor,
                vid_type,
            } => {
                if self.spaces.contains_key(&name) {
                    return if if_not_exists {
                        Ok(ResultSet::empty())
                    } else {
                        Err(execution("Existed!"))
                    };
                }
                if partition_num == 0 || replica_factor == 0 {
                    return Err(semantic("partition_num and replica_factor must be positive"));
                }
                self.spaces
                    .insert(name, Space::new(partition_num, replica_factor, vid_type));
                Ok(ResultSet::empty())
            }

            Statement::ShowSpaces => Ok(names(self.spaces.keys())),

            Statement::DropSpace { name, if_exists } => {
                if self.spaces.shift_remove(&name).is_none() && !if_exists {
                    return Err(space_not_found(&name));
                }
                Ok(ResultSet::empty())
            }

            Statement::CreateSchema {
                kind,
                name,
                if_not_exists,
                properties,
            } => {
                let space = self.space_mut(current)?;
                let schemas = space.schemas_mut(kind);
                if schemas.contains_key(&name) {
                    return if if_not_exists {
                        Ok(ResultSet::empty())
                    } else {
                        Err(execution("Existed!"))
                    };
                }
                for (i, prop) in properties.iter().enumerate() {
                    if properties[..i].iter().any(|p| p.name == prop.name) {
                        return Err(semantic(format!("Duplicate column name `{}`", prop.name)));
                    }
                    if let Some(default) = &prop.default {
                        coerce(prop, default.clone())?;
                    }
                }
                schemas.insert(name, properties);
                Ok(ResultSet::empty())
            }

            Statement::ShowSchemas(kind) => {
                let space = self.space_mut(current)?;
                Ok(names(space.schemas(kind).keys()))
            }

            Statement::DropSchema {
                kind,
                name,
                if_exists,
            } => {
                let space = self.space_mut(current)?;
                if !space.schemas(kind).contains_key(&name) {
                    return if if_exists {
                        Ok(ResultSet::empty())
                    } else {
                        Err(schema_not_found(kind, &name))
                    };
                }
                if space
                    .indexes
                    .values()
                    .any(|idx| idx.kind == kind && idx.schema == name)
                {
                    return Err(execution("Conflict!"));
                }
                space.schemas_mut(kind).shift_remove(&name);
                match kind {
                    SchemaKind::Tag => {
                        for tags in space.vertices.values_mut() {
                            tags.shift_remove(&name);
                        }
                        space.vertices.retain(|_, tags| !tags.is_empty());
                    }
                    SchemaKind::Edge => space.edge_data.retain(|(edge, _, _), _| *edge != name),
                }
                Ok(ResultSet::empty())
            }

            Statement::CreateIndex {
                kind,
                name,
                if_not_exists,
                schema,
                fields,
            } => {
                let space = self.space_mut(current)?;
                let props = space
                    .schemas(kind)
                    .get(&schema)
                    .ok_or_else(|| schema_not_found(kind, &schema))?;
                if let Some(missing) = fields
                    .iter()
                    .find(|f| !props.iter().any(|p| p.name == f.name))
                {
                    return Err(semantic(format!("Key `{}` not found in `{schema}`", missing.name)));
                }
                if space.indexes.contains_key(&name) {
                    return if if_not_exists {
                        Ok(ResultSet::empty())
                    } else {
                        Err(execution("Existed!"))
                    };
                }
                space.indexes.insert(
                    name,
                    IndexDef {
                        kind,
                        schema,
                        fields,
                    },
                );
                Ok(ResultSet::empty())
            }

            Statement::InsertVertex {
                if_not_exists,
                tag,
                fields,
                rows,
            } => {
                let space = self.space_mut(current)?;
                let props = space
                    .tags
                    .get(&tag)
                    .ok_or_else(|| schema_not_found(SchemaKind::Tag, &tag))?;
                let mut prepared = Vec::with_capacity(rows.len());
                for (vid, values) in rows {
                    space.check_vid(&vid)?;
                    prepared.push((vid, build_record(props, &fields, values)?));
                }
                for (vid, record) in prepared {
                    let tags = space.vertices.entry(vid).or_default();
                    if if_not_exists && tags.contains_key(&tag) {
                        continue;
                    }
                    tags.insert(tag.clone(), record);
                }
                Ok(ResultSet::empty())
            }

            Statement::InsertEdge {
                if_not_exists,
                edge,
                fields,
                rows,
            } => {
                let space = self.space_mut(current)?;
                let props = space
                    .edges
                    .get(&edge)
                    .ok_or_else(|| schema_not_found(SchemaKind::Edge, &edge))?;
                let mut prepared = Vec::with_capacity(rows.len());
                for (src, dst, values) in rows {
                    space.check_vid(&src)?;
                    space.check_vid(&dst)?;
                    prepared.push(((edge.clone(), src, dst), build_record(props, &fields, values)?));
                }
                for (key, record) in prepared {
                    if if_not_exists && space.edge_data.contains_key(&key) {
                        continue;
                    }
                    space.edge_data.insert(key, record);
                }
                Ok(ResultSet::empty())
            }

            Statement::UpdateVertex {
                tag,
                vid,
                assignments,
            } => {
                let space = self.space_mut(current)?;
                let props = space
                    .tags
                    .get(&tag)
                    .ok_or_else(|| schema_not_found(SchemaKind::Tag, &tag))?;
                let mut updates = Vec::with_capacity(assignments.len());
                for (field, value) in assignments {
                    let prop = props
                        .iter()
                        .find(|p| p.name == field)
                        .ok_or_else(|| semantic(format!("Unknown column `{field}` in `{tag}`")))?;
                    updates.push((field, coerce(prop, value)?));
                }
                let record = space
                    .vertices
                    .get_mut(&vid)
                    .and_then(|tags| tags.get_mut(&tag))
                    .ok_or_else(|| execution("Storage Error: Vertex or edge not found."))?;
                for (field, value) in updates {
                    record.insert(field, value);
                }
                Ok(ResultSet::empty())
            }

            Statement::MatchTag(tag) => {
                let space = self.space_mut(current)?;
                if !space.tags.contains_key(&tag) {
                    return Err(semantic(format!("`{tag}': Unknown tag")));
                }
                let rows = space
                    .vertices
                    .iter()
                    .filter(|(_, tags)| tags.contains_key(&tag))
                    .map(|(vid, tags)| vec![vertex_cell(vid, tags)])
                    .collect();
                Ok(ResultSet::with_rows(vec!["n".to_string()], rows))
            }

            Statement::MatchId(vid) => {
                let space = self.space_mut(current)?;
                let rows = space
                    .vertices
                    .get(&vid)
                    .map(|tags| vec![vec![vertex_cell(&vid, tags)]])
                    .unwrap_or_default();
                Ok(ResultSet::with_rows(vec!["n".to_string()], rows))
            }
        }
    }
}

fn names<'a>(keys: impl Iterator<Item = &'a String>) -> ResultSet {
    let rows = keys
        .map(|name| vec![Cell::Value(Value::String(name.clone()))])
        .collect();
    ResultSet::with_rows(vec!["Name".to_string()], rows)
}

fn vertex_cell(vid: &str, tags: &IndexMap<String, Record>) -> Cell {
    Cell::Vertex(VertexData {
        vid: vid.to_string(),
        tags: tags.clone(),
    })
}

/// Lay `values` out in the schema's property order, filling unlisted
/// properties with their default or NULL.
fn build_record(props: &[PropertyDef], fields: &[String], values: Vec<Value>) -> Result<Record, Failure> {
    if fields.len() != values.len() {
        return Err(semantic("Column count doesn't match value count."));
    }
    if let Some(unknown) = fields.iter().find(|f| !props.iter().any(|p| &p.name == *f)) {
        return Err(semantic(format!("Unknown column `{unknown}`")));
    }

    let mut given: IndexMap<&str, Value> = fields.iter().map(String::as_str).zip(values).collect();
    let mut record = Record::with_capacity(props.len());
    for prop in props {
        let value = match given.shift_remove(prop.name.as_str()) {
            Some(value) => coerce(prop, value)?,
            None => prop.default.clone().unwrap_or(Value::Null),
        };
        record.insert(prop.name.clone(), value);
    }
    Ok(record)
}

fn coerce(prop: &PropertyDef, value: Value) -> Result<Value, Failure> {
    match (prop.kind, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ScalarKind::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (kind, value) if value.scalar_kind() == Some(kind) => Ok(value),
        (kind, value) => Err(semantic(format!(
            "property `{}` expects {kind}, got {}",
            prop.name,
            value.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(catalog: &mut Catalog, current: &mut Option<String>, statement: &str) -> ResultSet {
        catalog.execute(current, statement)
    }

    fn seeded() -> (Catalog, Option<String>) {
        let mut catalog = Catalog::default();
        let mut current = None;
        for stmt in [
            "CREATE SPACE IF NOT EXISTS ns1 (partition_num = 10, replica_factor = 1, vid_type = FIXED_STRING(8))",
            "USE ns1",
            "CREATE TAG IF NOT EXISTS person (name string, age int, score float)",
        ] {
            assert!(run(&mut catalog, &mut current, stmt).is_succeeded(), "{stmt}");
        }
        (catalog, current)
    }

    #[test]
    fn statements_need_a_space() {
        let mut catalog = Catalog::default();
        let rs = run(&mut catalog, &mut None, "SHOW TAGS");
        assert_eq!(rs.error_msg(), Some("SemanticError: Space was not chosen."));
        let rs = run(&mut catalog, &mut None, "USE missing");
        assert_eq!(rs.error().map(|e| e.code), Some(E_EXECUTION_ERROR));
    }

    #[test]
    fn insert_fills_defaults_and_coerces() {
        let (mut catalog, mut current) = seeded();
        let rs = run(
            &mut catalog,
            &mut current,
            "INSERT VERTEX person (name, score) VALUES \"p1\": (\"ada\", 3)",
        );
        assert!(rs.is_succeeded(), "{:?}", rs.error_msg());
        let record = &catalog.spaces["ns1"].vertices["p1"]["person"];
        assert_eq!(record["age"], Value::Null);
        assert_eq!(record["score"], Value::Float(3.0));
    }

    #[test]
    fn if_not_exists_keeps_first_write() {
        let (mut catalog, mut current) = seeded();
        run(&mut catalog, &mut current, "INSERT VERTEX person (name) VALUES \"p1\": (\"a\")");
        run(
            &mut catalog,
            &mut current,
            "INSERT VERTEX IF NOT EXISTS person (name) VALUES \"p1\": (\"b\")",
        );
        assert_eq!(
            catalog.spaces["ns1"].vertices["p1"]["person"]["name"],
            Value::from("a")
        );
        run(&mut catalog, &mut current, "INSERT VERTEX person (name) VALUES \"p1\": (\"c\")");
        assert_eq!(
            catalog.spaces["ns1"].vertices["p1"]["person"]["name"],
            Value::from("c")
        );
    }

    #[test]
    fn vid_width_is_enforced() {
        let (mut catalog, mut current) = seeded();
        let rs = run(
            &mut catalog,
            &mut current,
            "INSERT VERTEX person (name) VALUES \"much-too-long\": (\"a\")",
        );
        assert!(!rs.is_succeeded());
        assert!(catalog.spaces["ns1"].vertices.is_empty());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let (mut catalog, mut current) = seeded();
        let rs = run(
            &mut catalog,
            &mut current,
            "INSERT VERTEX person (age) VALUES \"p1\": (\"old\")",
        );
        assert_eq!(rs.error().map(|e| e.code), Some(E_SEMANTIC_ERROR));
    }

    #[test]
    fn indexed_tags_cannot_be_dropped() {
        let (mut catalog, mut current) = seeded();
        assert!(run(
            &mut catalog,
            &mut current,
            "CREATE TAG INDEX IF NOT EXISTS person_name ON person(name(10))"
        )
        .is_succeeded());
        let rs = run(&mut catalog, &mut current, "DROP TAG IF EXISTS person");
        assert_eq!(rs.error_msg(), Some("Conflict!"));
        let rs = run(&mut catalog, &mut current, "CREATE TAG INDEX bad ON person(height)");
        assert!(!rs.is_succeeded());
    }

    #[test]
    fn syntax_errors_are_reported() {
        let mut catalog = Catalog::default();
        let rs = run(&mut catalog, &mut None, "FETCH PROP ON x");
        assert_eq!(rs.error().map(|e| e.code), Some(E_SYNTAX_ERROR));
    }
}
