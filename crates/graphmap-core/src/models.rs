//! Predefined node and relation types of the document knowledge graph:
//! root → library → ontology → PDF.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Relation};
use crate::error::Result;
use crate::registry::TypeRegistry;
use crate::types::{EntityDescriptor, FieldType, RelationDescriptor};

// ── Nodes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyNode {
    pub name: String,
}

/// An uploaded PDF and its classification state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfNode {
    // Metadata
    pub user_id: String,
    pub node_id: String,
    pub pdf_file_hash: String,
    pub pdf_file_name: String,
    pub time_of_upload: NaiveDateTime,
    pub file_load_status: bool,
    pub kg_extraction_status: bool,

    // Model-suggested classification
    pub ai_lib_name: String,
    pub ai_ontology_name: String,
    pub ai_reasoning_for_classification: String,

    // User-chosen classification
    pub user_chosen_lib_name: String,
    pub user_chosen_ontology_name: String,
}

fn named_node(type_name: &str) -> EntityDescriptor {
    EntityDescriptor::new(type_name).field("name", FieldType::STRING)
}

impl Entity for RootNode {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| named_node("RootNode"))
    }
}

impl Entity for LibNode {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| named_node("LibNode"))
    }
}

impl Entity for OntologyNode {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| named_node("OntologyNode"))
    }
}

impl Entity for PdfNode {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::new("PdfNode")
                .field("user_id", FieldType::STRING)
                .field("node_id", FieldType::STRING)
                .field("pdf_file_hash", FieldType::STRING)
                .field("pdf_file_name", FieldType::STRING)
                .field("time_of_upload", FieldType::TIMESTAMP)
                .field("file_load_status", FieldType::BOOL)
                .field("kg_extraction_status", FieldType::BOOL)
                .field("ai_lib_name", FieldType::STRING)
                .field("ai_ontology_name", FieldType::STRING)
                .field("ai_reasoning_for_classification", FieldType::STRING)
                .field("user_chosen_lib_name", FieldType::STRING)
                .field("user_chosen_ontology_name", FieldType::STRING)
        })
    }
}

// ── Relations ────────────────────────────────────────────────────

pub struct HasLib;
pub struct HasOntology;
pub struct HasPdf;

impl Relation for HasLib {
    fn descriptor() -> &'static RelationDescriptor {
        static DESCRIPTOR: OnceLock<RelationDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            RelationDescriptor::new("HasLib")
                .source(["RootNode"])
                .target(["LibNode"])
        })
    }
}

impl Relation for HasOntology {
    fn descriptor() -> &'static RelationDescriptor {
        static DESCRIPTOR: OnceLock<RelationDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            RelationDescriptor::new("HasOntology")
                .source(["LibNode"])
                .target(["OntologyNode"])
        })
    }
}

impl Relation for HasPdf {
    fn descriptor() -> &'static RelationDescriptor {
        static DESCRIPTOR: OnceLock<RelationDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            RelationDescriptor::new("HasPdf")
                .source(["OntologyNode"])
                .target(["PdfNode"])
        })
    }
}

/// A registry holding every predefined node and relation type.
pub fn predefined_registry() -> Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .register_entity::<RootNode>()?
        .register_entity::<LibNode>()?
        .register_entity::<OntologyNode>()?
        .register_entity::<PdfNode>()?
        .register_relation::<HasLib>()?
        .register_relation::<HasOntology>()?
        .register_relation::<HasPdf>()?;
    Ok(registry)
}
