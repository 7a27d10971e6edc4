// Dweve GraphStore - Property Graph Import Orchestration
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end tests for [`KuzuGraphStore`] over the in-memory engine.

use graphstore_core::{GraphDocument, GraphEngine, Node, SourceDocument, Value};
use graphstore_kuzu::{
    CypherStatement, EngineType, GraphStoreError, ImportOptions, KuzuGraphStore, StoreConfig,
    TypeConsistency, WriteStrategy,
};
use graphstore_kuzu::cypher::{relationship_table_name, table_name};
use graphstore_test::fixtures::{self, builders::DocumentBuilder};
use graphstore_test::MemoryEngine;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn open(engine: &Arc<MemoryEngine>) -> KuzuGraphStore {
    open_with(engine, StoreConfig::new().with_dangerous_requests())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_with(engine: &Arc<MemoryEngine>, config: StoreConfig) -> KuzuGraphStore {
    init_tracing();
    KuzuGraphStore::new(Arc::clone(engine) as Arc<dyn GraphEngine>, config).unwrap()
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_refuses_without_dangerous_requests() {
    let engine = Arc::new(MemoryEngine::new());
    let err = KuzuGraphStore::new(engine.clone() as Arc<dyn GraphEngine>, StoreConfig::new())
        .unwrap_err();
    assert!(matches!(err, GraphStoreError::Configuration(_)));
    assert!(engine.executed().is_empty());
}

#[test]
fn test_engine_tuned_on_open() {
    let engine = Arc::new(MemoryEngine::new());
    let config = StoreConfig::new()
        .with_dangerous_requests()
        .with_query_timeout(Duration::from_secs(7));
    let _store = open_with(&engine, config);
    assert_eq!(engine.timeout(), Some(Duration::from_secs(7)));
    assert!(engine.max_threads() > 0);
}

// ============================================================================
// Import
// ============================================================================

#[tokio::test]
async fn test_import_creates_each_table_once() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);

    let first = store
        .add_graph_documents(&[fixtures::alice_knows_bob()])
        .await
        .unwrap();
    let second = store
        .add_graph_documents(&[fixtures::alice_knows_bob()])
        .await
        .unwrap();

    assert_eq!(first.tables_created, 2);
    assert_eq!(second.tables_created, 0);
    assert_eq!(engine.count_executed("CREATE NODE TABLE IF NOT EXISTS Person"), 1);
    assert_eq!(
        engine.count_executed("CREATE REL TABLE IF NOT EXISTS KNOWS_Person_Person"),
        1
    );
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);

    for _ in 0..3 {
        store
            .add_graph_documents(&[fixtures::alice_knows_bob()])
            .await
            .unwrap();
    }

    assert_eq!(engine.node_count("Person"), 2);
    assert_eq!(
        engine.edges("KNOWS_Person_Person"),
        vec![("alice".to_string(), "bob".to_string())]
    );
    let stats = store.import_statistics();
    assert_eq!(stats.imports, 3);
    assert_eq!(stats.totals.nodes, 6);
}

#[tokio::test]
async fn test_properties_stored_as_text() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store
        .add_graph_documents(&[fixtures::alice_knows_bob(), fixtures::typed_properties()])
        .await
        .unwrap();

    let alice = engine.node("Person", "alice").unwrap();
    assert_eq!(alice.node_type, "Person");
    assert_eq!(alice.properties.get("name").map(String::as_str), Some("Alice"));

    let since = engine
        .edge_properties("KNOWS_Person_Person", "alice", "bob")
        .unwrap();
    assert_eq!(since.get("since").map(String::as_str), Some("2015"));

    let widget = engine.node("Product", "widget").unwrap();
    assert_eq!(widget.properties.get("stock").map(String::as_str), Some("120"));
    assert_eq!(widget.properties.get("launched").map(String::as_str), Some("2021-03-14"));
    assert!(!widget.properties.contains_key("discontinued"));
    let tags: serde_json::Value =
        serde_json::from_str(widget.properties.get("tags").unwrap()).unwrap();
    assert_eq!(tags, serde_json::json!(["tool", "metal"]));
}

#[tokio::test]
async fn test_reserved_keys_not_duplicated_into_properties() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let doc = DocumentBuilder::new("text")
        .node_with("x", "Thing", [("id", "shadow"), ("type", "shadow"), ("color", "red")])
        .build();
    store.add_graph_documents(&[doc]).await.unwrap();

    let node = engine.node("Thing", "x").unwrap();
    assert_eq!(node.node_type, "Thing");
    assert_eq!(node.properties.keys().collect::<Vec<_>>(), ["color"]);
}

#[tokio::test]
async fn test_batched_and_individual_agree() {
    let batched_engine = Arc::new(MemoryEngine::new());
    let individual_engine = Arc::new(MemoryEngine::new());
    let doc = fixtures::people_chain(25);

    open(&batched_engine)
        .add_graph_documents_with_options(
            &[doc.clone()],
            &ImportOptions::new()
                .with_strategy(WriteStrategy::Batched)
                .with_chunk_size(10),
        )
        .await
        .unwrap();
    open(&individual_engine)
        .add_graph_documents_with_options(
            &[doc],
            &ImportOptions::new().with_strategy(WriteStrategy::Individual),
        )
        .await
        .unwrap();

    assert_eq!(batched_engine.nodes("Person"), individual_engine.nodes("Person"));
    assert_eq!(
        batched_engine.edges("KNOWS_Person_Person"),
        individual_engine.edges("KNOWS_Person_Person")
    );
    assert_eq!(batched_engine.node_count("Person"), 25);
    assert_eq!(batched_engine.count_executed("UNWIND $rows AS row MERGE (n:Person"), 3);
    assert_eq!(individual_engine.count_executed("UNWIND"), 0);
}

#[tokio::test]
async fn test_auto_strategy_batches_above_threshold() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store
        .add_graph_documents(&[fixtures::alice_knows_bob(), fixtures::people_chain(11)])
        .await
        .unwrap();

    assert_eq!(engine.count_executed("UNWIND $rows AS row MERGE (n:Person"), 1);
    assert_eq!(engine.count_executed("MERGE (n:Person {id: $id})"), 2);
}

#[tokio::test]
async fn test_validation_rejects_batch_before_writes() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let bad = GraphDocument::new(SourceDocument::new("broken")).with_node(Node::new("", "Person"));

    let err = store
        .add_graph_documents(&[fixtures::alice_knows_bob(), bad])
        .await
        .unwrap_err();

    match err {
        GraphStoreError::Validation { document, .. } => assert_eq!(document, 1),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(engine.count_executed("CREATE"), 0);
    assert_eq!(engine.count_executed("MERGE"), 0);
}

#[tokio::test]
async fn test_type_consistency_policies() {
    let docs = vec![
        DocumentBuilder::new("one")
            .node_with("a", "Person", [("age", Value::Int64(30))])
            .build(),
        DocumentBuilder::new("two")
            .node_with("b", "Person", [("age", Value::from("thirty"))])
            .build(),
    ];

    let strict_engine = Arc::new(MemoryEngine::new());
    let err = open(&strict_engine)
        .add_graph_documents_with_options(
            &docs,
            &ImportOptions::new().with_type_consistency(TypeConsistency::Strict),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphStoreError::Validation { document: 1, .. }));
    assert_eq!(strict_engine.count_executed("MERGE"), 0);

    let coerce_engine = Arc::new(MemoryEngine::new());
    let report = open(&coerce_engine).add_graph_documents(&docs).await.unwrap();
    assert_eq!(report.type_conflicts, 1);
    assert_eq!(
        coerce_engine
            .node("Person", "b")
            .and_then(|n| n.properties.get("age").cloned()),
        Some("thirty".to_string())
    );
}

#[tokio::test]
async fn test_unmatched_endpoint_rolls_back_rows() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);

    let err = store
        .add_graph_documents(&[fixtures::dangling_relationship()])
        .await
        .unwrap_err();

    assert!(matches!(err, GraphStoreError::UnmatchedEndpoint(_)));
    assert_eq!(engine.node_count("Person"), 0);
    assert!(engine.has_table("Person"));
    assert_eq!(engine.count_executed("ROLLBACK"), 1);
}

#[tokio::test]
async fn test_keyword_labels_are_quoted() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store
        .add_graph_documents(&[fixtures::keyword_labels()])
        .await
        .unwrap();

    assert_eq!(engine.node_count("Order"), 1);
    assert_eq!(engine.node_count("Match"), 1);
    assert!(engine.count_executed("`Order`") > 0);
    assert_eq!(engine.edges("WHERE_Order_Match").len(), 1);
}

#[tokio::test]
async fn test_overlapping_labels_get_separate_relationship_tables() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let doc = DocumentBuilder::new("")
        .node("a", "X_Y")
        .node("b", "Z")
        .node("c", "Y")
        .relationship(("a", "X_Y"), "R", ("b", "Z"))
        .relationship(("c", "Y"), "R_X", ("b", "Z"))
        .build();

    let report = store.add_graph_documents(&[doc]).await.unwrap();
    assert_eq!(report.relationships, 2);

    let first = relationship_table_name("R", "X_Y", "Z");
    let second = relationship_table_name("R_X", "Y", "Z");
    assert_ne!(first, second);
    assert_eq!(engine.edges(&first), vec![("a".to_string(), "b".to_string())]);
    assert_eq!(engine.edges(&second), vec![("c".to_string(), "b".to_string())]);
}

#[tokio::test]
async fn test_labels_that_sanitize_alike_stay_apart() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let docs = vec![
        DocumentBuilder::new("x works at something").node("x", "works at").build(),
        DocumentBuilder::new("x works-at something").node("x", "works-at").build(),
        DocumentBuilder::new("x is a chunk").node("x", "Chunk").build(),
    ];

    store
        .add_graph_documents_with_options(&docs, &ImportOptions::new().with_source())
        .await
        .unwrap();

    assert_ne!(table_name("works at"), table_name("works-at"));
    assert_eq!(engine.node("works at", "x"), None);
    assert_eq!(engine.node(&table_name("works at"), "x").unwrap().node_type, "works at");
    assert_eq!(engine.node(&table_name("works-at"), "x").unwrap().node_type, "works-at");
    assert_eq!(engine.node(&table_name("Chunk"), "x").unwrap().node_type, "Chunk");

    let chunks = engine.nodes("Chunk");
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.node_type == "text_chunk"));
}

#[tokio::test]
async fn test_single_document_without_transaction() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let report = store
        .add_graph_document(&fixtures::org_chart())
        .await
        .unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.nodes, 4);
    assert_eq!(report.relationships, 4);
    assert_eq!(engine.count_executed("BEGIN"), 0);
    assert_eq!(engine.edges("EMPLOYS_Company_Person").len(), 3);
}

#[tokio::test]
async fn test_engine_without_transactions() {
    let engine = Arc::new(MemoryEngine::without_transactions());
    let store = open(&engine);
    store
        .add_graph_documents(&[fixtures::org_chart()])
        .await
        .unwrap();

    assert_eq!(engine.count_executed("BEGIN"), 0);
    assert_eq!(engine.count_executed("COMMIT"), 0);
    assert_eq!(engine.node_count("Person"), 3);
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let report = store.add_graph_documents(&[]).await.unwrap();
    assert_eq!(report.documents, 0);
    assert_eq!(engine.count_executed("CREATE"), 0);
}

// ============================================================================
// Source attribution
// ============================================================================

#[tokio::test]
async fn test_source_attribution_links_chunk() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let report = store
        .add_graph_documents_with_options(
            &[fixtures::alice_knows_bob()],
            &ImportOptions::new().with_source(),
        )
        .await
        .unwrap();

    assert_eq!(report.attribution_skipped, 0);
    let chunk = engine.node("Chunk", "doc-alice-bob").unwrap();
    assert_eq!(chunk.text.as_deref(), Some("Alice has known Bob since 2015."));
    assert_eq!(chunk.node_type, "text_chunk");
    assert_eq!(engine.edges("MENTIONS_Chunk_Person").len(), 2);
}

#[tokio::test]
async fn test_content_hash_chunk_id() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store
        .add_graph_documents_with_options(&[fixtures::org_chart()], &ImportOptions::new().with_source())
        .await
        .unwrap();

    let chunks = engine.nodes("Chunk");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].id.starts_with("doc_"));
    assert_eq!(chunks[0].id.len(), 20);
    assert_eq!(chunks[0].properties.get("source").map(String::as_str), Some("hr-export"));
}

#[tokio::test]
async fn test_attribution_failure_keeps_entities() {
    let engine = Arc::new(MemoryEngine::new());
    engine.fail_matching("MENTIONS_Chunk_Person");
    let store = open(&engine);

    let report = store
        .add_graph_documents_with_options(
            &[fixtures::alice_knows_bob()],
            &ImportOptions::new().with_source(),
        )
        .await
        .unwrap();

    assert_eq!(report.attribution_skipped, 1);
    assert_eq!(engine.node_count("Person"), 2);
    assert_eq!(engine.edges("KNOWS_Person_Person").len(), 1);
}

#[tokio::test]
async fn test_attribution_skipped_without_text() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let report = store
        .add_graph_documents_with_options(&[fixtures::untitled()], &ImportOptions::new().with_source())
        .await
        .unwrap();

    assert_eq!(report.attribution_skipped, 1);
    assert!(!engine.has_table("Chunk"));
    assert_eq!(engine.node_count("Thing"), 1);
}

// ============================================================================
// Schema
// ============================================================================

#[tokio::test]
async fn test_schema_reflects_imports() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let empty_version = store.schema_version().await.unwrap();

    store
        .add_graph_documents(&[fixtures::org_chart()])
        .await
        .unwrap();

    let snapshot = store.structured_schema().await.unwrap();
    let labels: Vec<_> = snapshot.node_types.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, ["Company", "Person"]);
    assert!(snapshot
        .relationship_types
        .iter()
        .any(|r| r.name == "REPORTS_TO" && r.source_type == "Person"));
    assert!(!snapshot.degraded);

    let text = store.schema().await.unwrap();
    assert!(text.contains("(:Company)-[:EMPLOYS]->(:Person)"));
    assert_ne!(store.schema_version().await.unwrap(), empty_version);
}

#[tokio::test]
async fn test_schema_validation_and_change_detection() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    assert!(store.validate_schema().await.is_err());

    store
        .add_graph_documents(&[fixtures::org_chart()])
        .await
        .unwrap();
    store.refresh_schema().await.unwrap();
    assert!(!store.schema_changed().await.unwrap());
    // Company, Person, EMPLOYS and REPORTS_TO
    assert_eq!(store.validate_schema().await.unwrap(), 4);

    store
        .add_graph_documents(&[fixtures::typed_properties()])
        .await
        .unwrap();
    assert!(store.schema_changed().await.unwrap());
}

#[tokio::test]
async fn test_degraded_schema_when_catalog_down() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store
        .add_graph_documents(&[fixtures::alice_knows_bob()])
        .await
        .unwrap();

    engine.fail_catalog(true);
    let snapshot = store.refresh_schema().await.unwrap();
    assert!(snapshot.degraded);
    assert!(snapshot.node_types.iter().any(|n| n.label == "Person"));

    engine.fail_catalog(false);
    assert!(!store.refresh_schema().await.unwrap().degraded);
}

// ============================================================================
// Queries and connection
// ============================================================================

#[tokio::test]
async fn test_query_count_and_typed() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store
        .add_graph_documents(&[fixtures::org_chart()])
        .await
        .unwrap();

    let count = store
        .query_count(CypherStatement::query("MATCH (n:Person) RETURN count(n) AS c"))
        .await
        .unwrap();
    assert_eq!(count, 3);

    let mut types = BTreeMap::new();
    types.insert("c".to_string(), EngineType::Int64);
    let rows = store
        .query_typed(CypherStatement::query("MATCH (n:Company) RETURN count(n) AS c"), &types)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("c"), Some(&Value::Int64(1)));
}

#[tokio::test]
async fn test_query_typed_rejects_narrowing_overflow() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store
        .add_graph_documents(&[fixtures::people_chain(300)])
        .await
        .unwrap();

    let mut types = BTreeMap::new();
    types.insert("c".to_string(), EngineType::Int8);
    let err = store
        .query_typed(CypherStatement::query("MATCH (n:Person) RETURN count(n) AS c"), &types)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphStoreError::Conversion { .. }));
}

#[tokio::test]
async fn test_statement_timeout() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open_with(
        &engine,
        StoreConfig::new()
            .with_dangerous_requests()
            .with_query_timeout(Duration::from_millis(20)),
    );
    engine.set_delay(Duration::from_millis(500));

    let err = store.health_check().await.unwrap_err();
    assert!(matches!(err, GraphStoreError::Timeout(_)));
    assert!(engine.was_interrupted());
}

#[tokio::test]
async fn test_query_with_retry_reconnects() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    engine.fail_connections(1);

    let result = store
        .query_with_retry(CypherStatement::query("RETURN 1 AS health_check"))
        .await
        .unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(engine.reconnect_count(), 1);
}

#[tokio::test]
async fn test_close_refuses_further_work() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    store.health_check().await.unwrap();

    store.close();
    assert!(!store.is_connected());
    assert!(store.health_check().await.is_err());
    assert!(store
        .add_graph_documents(&[fixtures::alice_knows_bob()])
        .await
        .is_err());
}

#[test]
fn test_validate_properties() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);
    let mut props = BTreeMap::new();
    props.insert("name".to_string(), Value::from("Alice"));
    props.insert("tags".to_string(), Value::from(vec!["a", "b"]));
    assert!(store.validate_properties(&props).is_ok());
}
