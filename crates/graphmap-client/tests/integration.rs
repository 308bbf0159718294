//! Integration tests for graphmap-client against the in-process `MemoryGraph`.
//!
//! Run with: cargo test --package graphmap-client --test integration

use std::time::Duration;

use chrono::NaiveDate;

use graphmap_client::memory::parse_literal;
use graphmap_client::{GraphClient, GraphError, MemoryGraph, SpaceOptions, DEFAULT_INDEX_LENGTH};
use graphmap_core::format::format_value;
use graphmap_core::models::{predefined_registry, HasLib, LibNode, PdfNode, RootNode};
use graphmap_core::{
    EntityDescriptor, FieldType, GraphConfig, Record, RelationDescriptor, RetryPolicy, Value,
    VidType,
};

fn fast_retry_config() -> GraphConfig {
    GraphConfig {
        retry: RetryPolicy {
            max_attempts: 10,
            initial_delay_ms: 1,
            multiplier: 2,
            max_delay_ms: Some(4),
        },
        ..GraphConfig::default()
    }
}

fn ns1_options() -> SpaceOptions {
    SpaceOptions {
        partition_num: 10,
        replica_factor: 1,
        vid_type: VidType::FixedString(32),
    }
}

fn name_record(name: &str) -> Record {
    let mut record = Record::new();
    record.insert("name".to_string(), Value::from(name));
    record
}

/// A client with namespace `ns1` and the `root_node` tag in place.
async fn setup(graph: &MemoryGraph, config: GraphConfig) -> GraphClient {
    let client = graph.client(config);
    client.create_namespace("ns1", ns1_options()).await.unwrap();
    client.create_tag_for::<RootNode>("ns1").await.unwrap();
    client
}

fn sample_pdf() -> PdfNode {
    PdfNode {
        user_id: "u-1".to_string(),
        node_id: "pdf-1".to_string(),
        pdf_file_hash: "9f86d081884c7d65".to_string(),
        pdf_file_name: "annual \"report\".pdf".to_string(),
        time_of_upload: NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 20, 30)
            .unwrap(),
        file_load_status: true,
        kg_extraction_status: false,
        ai_lib_name: "finance".to_string(),
        ai_ontology_name: "reports".to_string(),
        ai_reasoning_for_classification: "mentions revenue\nand costs".to_string(),
        user_chosen_lib_name: "finance".to_string(),
        user_chosen_ontology_name: "reports".to_string(),
    }
}

// ── End to End ───────────────────────────────────────────────────

#[tokio::test]
async fn test_root_node_round_trip() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;

    client
        .insert_entity("ns1", "root", &RootNode {
            name: "root".to_string(),
        })
        .await
        .unwrap();

    let roots: Vec<RootNode> = client.get_vertices_by_type("ns1").await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].name, "root");

    let executed = graph.executed();
    assert!(executed.contains(
        &"CREATE SPACE IF NOT EXISTS ns1 (partition_num = 10, replica_factor = 1, vid_type = FIXED_STRING(32))"
            .to_string()
    ));
    assert!(executed.contains(&"CREATE TAG IF NOT EXISTS root_node (name string)".to_string()));
    assert_eq!(graph.namespace_options("ns1"), Some(ns1_options()));
}

#[tokio::test]
async fn test_typed_pdf_round_trip() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    client.create_tag_for::<PdfNode>("ns1").await.unwrap();

    let pdf = sample_pdf();
    client.insert_entity("ns1", &pdf.node_id, &pdf).await.unwrap();

    let fetched: Vec<PdfNode> = client.get_vertices_by_type("ns1").await.unwrap();
    assert_eq!(fetched, vec![pdf]);
}

#[tokio::test]
async fn test_creates_are_idempotent() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;

    client.create_namespace("ns1", ns1_options()).await.unwrap();
    client.create_tag_for::<RootNode>("ns1").await.unwrap();
    for _ in 0..2 {
        client
            .create_edge_type_for::<HasLib>("ns1", false)
            .await
            .unwrap();
        client
            .insert_vertex("ns1", "root_node", "root", &name_record("root"))
            .await
            .unwrap();
    }
    client
        .insert_vertex("ns1", "root_node", "root", &name_record("other"))
        .await
        .unwrap();

    assert_eq!(graph.namespaces(), ["ns1"]);
    assert_eq!(graph.tags("ns1"), ["root_node"]);
    assert_eq!(graph.edge_types("ns1"), ["has_lib"]);
    let vertex = graph.vertex("ns1", "root").unwrap();
    assert_eq!(vertex["root_node"]["name"], Value::from("root"));
}

#[tokio::test]
async fn test_defined_schemas_and_relations() {
    let graph = MemoryGraph::new();
    let client = graph.client(fast_retry_config());
    let registry = predefined_registry().unwrap();

    client
        .create_defined_schemas("docs", &registry, SpaceOptions::default())
        .await
        .unwrap();
    assert_eq!(
        graph.tags("docs"),
        ["root_node", "lib_node", "ontology_node", "pdf_node"]
    );
    assert_eq!(
        graph.edge_types("docs"),
        ["has_lib", "has_ontology", "has_pdf"]
    );
    assert_eq!(
        graph.namespace_options("docs").map(|o| o.partition_num),
        Some(100)
    );

    client
        .insert_entity("docs", "root", &RootNode {
            name: "root".to_string(),
        })
        .await
        .unwrap();
    client
        .insert_entity("docs", "lib", &LibNode {
            name: "finance".to_string(),
        })
        .await
        .unwrap();
    client
        .insert_relation::<HasLib>("docs", "root", "lib")
        .await
        .unwrap();

    let edge = graph.edge("docs", "has_lib", "root", "lib").unwrap();
    assert_eq!(edge["source_node"], Value::from("RootNode"));
    assert_eq!(edge["target_node"], Value::from("LibNode"));
}

#[tokio::test]
async fn test_edge_properties_and_union_defaults() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    let relation = RelationDescriptor::new("Mentions")
        .source(["PdfNode"])
        .target(["LibNode", "OntologyNode"]);

    client
        .create_edge_type("ns1", &relation, true)
        .await
        .unwrap();
    assert!(graph.executed().contains(
        &"CREATE EDGE IF NOT EXISTS mentions(source_node string DEFAULT \"PdfNode\", target_node string DEFAULT \"LibNode | OntologyNode\")"
            .to_string()
    ));

    let mut props = Record::new();
    props.insert("source_node".to_string(), Value::from("PdfNode"));
    client
        .insert_edge("ns1", "mentions", "a", "b", Some(&props))
        .await
        .unwrap();
    let edge = graph.edge("ns1", "mentions", "a", "b").unwrap();
    assert_eq!(edge["target_node"], Value::from("LibNode | OntologyNode"));
}

#[tokio::test]
async fn test_indexes() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    client.create_tag_for::<PdfNode>("ns1").await.unwrap();
    client
        .create_edge_type_for::<HasLib>("ns1", true)
        .await
        .unwrap();

    client
        .create_index_on_property(
            "ns1",
            "pdf_node",
            "pdf_name_idx",
            "pdf_file_name",
            DEFAULT_INDEX_LENGTH,
        )
        .await
        .unwrap();
    client
        .create_tag_index("ns1", "root_node", "root_idx")
        .await
        .unwrap();
    client
        .create_edge_type_index("ns1", "has_lib", "has_lib_idx")
        .await
        .unwrap();

    let pdf_idx = graph.index("ns1", "pdf_name_idx").unwrap();
    assert_eq!(pdf_idx.schema, "pdf_node");
    assert_eq!(pdf_idx.fields[0].length, Some(100));
    assert!(graph.index("ns1", "root_idx").unwrap().fields.is_empty());
    assert!(graph.index("ns1", "has_lib_idx").is_some());

    let err = client
        .create_index_on_property("ns1", "pdf_node", "bad_idx", "no_such_field", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Schema { .. }), "{err}");
}

#[tokio::test]
async fn test_list_and_drop_tags() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    client.create_tag_for::<LibNode>("ns1").await.unwrap();

    assert_eq!(
        client.list_tags("ns1").await.unwrap(),
        ["root_node", "lib_node"]
    );
    client.drop_tag("ns1", "lib_node").await.unwrap();
    client.drop_tag("ns1", "lib_node").await.unwrap();
    assert_eq!(client.list_tags("ns1").await.unwrap(), ["root_node"]);
}

#[tokio::test]
async fn test_update_field() -> anyhow::Result<()> {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    client
        .insert_vertex("ns1", "root_node", "root", &name_record("root"))
        .await?;

    client
        .update_field("ns1", "root_node", "root", "name", &Value::from("renamed"))
        .await?;
    let roots: Vec<RootNode> = client.get_vertices_by_type("ns1").await?;
    assert_eq!(roots[0].name, "renamed");

    let err = client
        .update_field("ns1", "root_node", "ghost", "name", &Value::from("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Write { .. }), "{err}");
    assert_eq!(err.server_message(), Some("Storage Error: Vertex or edge not found."));
    assert_eq!(graph.executed_count("UPDATE VERTEX ON root_node \"ghost\""), 1);
    Ok(())
}

#[tokio::test]
async fn test_content_vids_deduplicate() -> anyhow::Result<()> {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    let root = RootNode {
        name: "root".to_string(),
    };

    let first = client.insert_entity_by_content("ns1", &root).await?;
    let second = client.insert_entity_by_content("ns1", &root).await?;
    assert_eq!(first, second);
    assert_eq!(first.len(), 32);
    let roots: Vec<RootNode> = client.get_vertices_by_type("ns1").await?;
    assert_eq!(roots.len(), 1);
    Ok(())
}

// ── Lookups ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_vertex_by_id() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    client.create_tag_for::<LibNode>("ns1").await.unwrap();
    let registry = predefined_registry().unwrap();

    client
        .insert_vertex("ns1", "root_node", "root", &name_record("root"))
        .await
        .unwrap();
    let vertex = client.get_vertex_by_id("ns1", "root", &registry).await.unwrap();
    assert_eq!(vertex.type_name, "RootNode");
    assert_eq!(vertex.schema, "root_node");
    let root: RootNode = vertex.decode().unwrap();
    assert_eq!(root.name, "root");

    let err = client
        .get_vertex_by_id("ns1", "nope", &registry)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::NotFound { ref vid, .. } if vid == "nope"), "{err}");

    client
        .insert_vertex("ns1", "lib_node", "root", &name_record("lib"))
        .await
        .unwrap();
    let err = client
        .get_vertex_by_id("ns1", "root", &registry)
        .await
        .unwrap_err();
    match err {
        GraphError::AmbiguousType { tags, .. } => assert_eq!(tags, ["root_node", "lib_node"]),
        other => panic!("expected AmbiguousType, got {other}"),
    }
}

#[tokio::test]
async fn test_undecodable_vertices_are_read_errors() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;
    let mut record = Record::new();
    record.insert("name".to_string(), Value::Null);
    client
        .insert_vertex("ns1", "root_node", "broken", &record)
        .await
        .unwrap();

    let err = client
        .get_vertices_by_type::<RootNode>("ns1")
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Read { .. }), "{err}");
    assert!(err.to_string().contains("broken"));
}

#[tokio::test]
async fn test_forced_insert_rejects_duplicates() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;

    client
        .insert_vertex_forced("ns1", "root_node", "root", &name_record("root"))
        .await
        .unwrap();
    let err = client
        .insert_vertex_forced("ns1", "root_node", "root", &name_record("again"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Write { .. }), "{err}");
    assert!(err.to_string().contains("already exists"));
    assert_eq!(graph.executed_count("INSERT VERTEX root_node"), 1);
}

// ── Schema Failures ──────────────────────────────────────────────

#[tokio::test]
async fn test_schema_preconditions() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;

    let nested_only = EntityDescriptor::new("Wrapper").field("inner", FieldType::entity("RootNode"));
    let err = client.create_tag("ns1", &nested_only).await.unwrap_err();
    assert!(matches!(err, GraphError::Schema { .. }), "{err}");

    let untyped = RelationDescriptor::new("Loose");
    let err = client
        .create_edge_type("ns1", &untyped, true)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Schema { .. }), "{err}");
    client.create_edge_type("ns1", &untyped, false).await.unwrap();

    graph.fail_statements("CREATE TAG", 1, "Storage Error: disk full");
    let err = client.create_tag_for::<LibNode>("ns1").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to create tag lib_node in namespace ns1: Storage Error: disk full"
    );
}

#[tokio::test]
async fn test_delete_all_collects_failures() {
    let graph = MemoryGraph::new();
    let client = graph.client(fast_retry_config());
    for ns in ["a", "b", "c"] {
        client.create_namespace(ns, SpaceOptions::default()).await.unwrap();
    }
    graph.fail_statements("DROP SPACE b", 1, "Busy");

    let err = client.delete_all_namespaces().await.unwrap_err();
    match err {
        GraphError::PartialDrop { dropped, failures } => {
            assert_eq!(dropped, ["a", "c"]);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].namespace, "b");
            assert_eq!(failures[0].message, "Busy");
        }
        other => panic!("expected PartialDrop, got {other}"),
    }
    assert_eq!(graph.namespaces(), ["b"]);

    assert_eq!(client.delete_all_namespaces().await.unwrap(), ["b"]);
    assert!(client.list_namespaces().await.unwrap().is_empty());
}

// ── Sessions ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_namespace_selection_failure_releases_once() {
    let graph = MemoryGraph::new();
    let client = graph.client(fast_retry_config());

    let err = client.session(Some("missing")).await.err().unwrap();
    match &err {
        GraphError::NamespaceSelection { namespace, message } => {
            assert_eq!(namespace, "missing");
            assert!(message.contains("SpaceNotFound"), "{message}");
        }
        other => panic!("expected NamespaceSelection, got {other}"),
    }
    let stats = graph.session_stats();
    assert_eq!((stats.opened, stats.released), (1, 1));

    client.create_namespace("ns1", ns1_options()).await.unwrap();
    graph.fail_statements("USE ns1", 1, "Leader changed");
    let err = client.session(Some("ns1")).await.err().unwrap();
    assert_eq!(err.server_message(), Some("Leader changed"));
    let stats = graph.session_stats();
    assert_eq!(stats.opened, stats.released);
    assert_eq!(stats.active(), 0);
}

#[tokio::test]
async fn test_session_guard_releases_on_drop() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, fast_retry_config()).await;

    {
        let mut session = client.session(Some("ns1")).await.unwrap();
        assert_eq!(session.namespace(), Some("ns1"));
        let result = session.execute("SHOW TAGS").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(graph.session_stats().active(), 1);
    }
    assert_eq!(graph.session_stats().active(), 0);

    let session = client.session(None).await.unwrap();
    session.release();
    let stats = graph.session_stats();
    assert_eq!(stats.opened, stats.released);
}

#[tokio::test]
async fn test_connect_failure() {
    let graph = MemoryGraph::new();
    graph.refuse_connections("connection refused");
    let client = graph.client(GraphConfig::default());

    assert!(!client.connect().await);
    assert!(!client.is_connected().await);
    let err = client.session(None).await.err().unwrap();
    assert!(matches!(err, GraphError::Connection(_)), "{err}");
    assert_eq!(graph.session_stats().opened, 0);

    graph.accept_connections();
    assert!(client.connect().await);
    assert!(client.connect().await);
    client.close().await;
    assert!(!client.is_connected().await);
    assert_eq!(graph.session_stats().closes, 1);

    // Reconnects lazily after close.
    assert!(client.list_namespaces().await.unwrap().is_empty());
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_pool_bounds_concurrent_sessions() {
    let graph = MemoryGraph::new();
    let config = GraphConfig {
        max_connection_pool_size: 2,
        ..fast_retry_config()
    };
    let client = setup(&graph, config).await;
    graph.set_latency(Duration::from_millis(5));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.list_tags("ns1").await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), ["root_node"]);
    }

    let stats = graph.session_stats();
    assert!(stats.peak_active <= 2, "peak was {}", stats.peak_active);
    assert_eq!(stats.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_statement_timeout_releases_session() {
    let graph = MemoryGraph::new();
    let config = GraphConfig {
        statement_timeout_ms: Some(50),
        ..fast_retry_config()
    };
    let client = setup(&graph, config).await;
    graph.set_latency(Duration::from_millis(200));

    let err = client
        .insert_vertex("ns1", "root_node", "root", &name_record("root"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Timeout { .. }), "{err}");
    assert_eq!(graph.session_stats().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_timeout() {
    let graph = MemoryGraph::new();
    let config = GraphConfig {
        max_connection_pool_size: 1,
        acquire_timeout_ms: 100,
        ..fast_retry_config()
    };
    let client = graph.client(config);

    let held = client.session(None).await.unwrap();
    let err = client.session(None).await.err().unwrap();
    assert!(matches!(err, GraphError::Timeout { .. }), "{err}");
    drop(held);
    assert!(client.session(None).await.is_ok());
}

// ── Retry ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_three_failures() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, GraphConfig::default()).await;
    graph.fail_statements("INSERT VERTEX", 3, "Storage Error: leader changed");

    let started = tokio::time::Instant::now();
    client
        .insert_vertex("ns1", "root_node", "root", &name_record("root"))
        .await
        .unwrap();

    assert_eq!(graph.executed_count("INSERT VERTEX"), 4);
    // 1 s + 2 s + 4 s of backoff.
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert!(graph.vertex("ns1", "root").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_ten_attempts() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, GraphConfig::default()).await;
    graph.fail_statements("INSERT VERTEX", 9, "Storage Error: leader changed");
    graph.fail_statements("INSERT VERTEX", 1, "Storage Error: still no leader");

    let err = client
        .insert_vertex("ns1", "root_node", "root", &name_record("root"))
        .await
        .unwrap_err();

    assert_eq!(graph.executed_count("INSERT VERTEX"), 10);
    match &err {
        GraphError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 10);
            assert!(matches!(**last, GraphError::Write { .. }));
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }
    assert_eq!(err.server_message(), Some("Storage Error: still no leader"));
    assert!(graph.vertex("ns1", "root").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failures_are_not_retried() {
    let graph = MemoryGraph::new();
    let client = setup(&graph, GraphConfig::default()).await;
    let mut record = Record::new();
    record.insert("name".to_string(), Value::Int(5));

    let started = tokio::time::Instant::now();
    let err = client
        .insert_vertex("ns1", "root_node", "root", &record)
        .await
        .unwrap_err();

    assert!(matches!(err, GraphError::Write { .. }), "{err}");
    assert!(err.server_message().unwrap().starts_with("SemanticError"), "{err}");
    assert_eq!(graph.executed_count("INSERT VERTEX"), 1);
    assert!(started.elapsed() < Duration::from_secs(1));

    let err = client
        .insert_vertex("ns1", "no_such_tag", "root", &name_record("root"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Write { .. }), "{err}");
    assert_eq!(graph.executed_count("INSERT VERTEX IF NOT EXISTS no_such_tag"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_namespace_gives_up() {
    let graph = MemoryGraph::new();
    let client = graph.client(GraphConfig::default());

    let err = client.wait_for_namespace("ghost").await.unwrap_err();
    assert!(matches!(err, GraphError::RetriesExhausted { attempts: 10, .. }), "{err}");
    assert_eq!(graph.executed_count("USE ghost"), 10);
    assert_eq!(graph.session_stats().active(), 0);
}

// ── Literals ─────────────────────────────────────────────────────

#[test]
fn test_literals_round_trip_through_the_parser() {
    let values = [
        Value::from("hello \"world\""),
        Value::from("tab\tand\\slash"),
        Value::Int(123),
        Value::Float(123.45),
        Value::Float(1.0),
        Value::Bool(true),
        Value::Null,
        Value::Timestamp(
            NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ),
    ];
    for value in values {
        let literal = format_value(&value).unwrap();
        assert_eq!(parse_literal(&literal).unwrap(), value, "literal {literal}");
    }
}
