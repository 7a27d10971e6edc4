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

//! Imports and transactions racing on one store.

use graphstore_core::{EngineCapabilities, GraphEngine};
use graphstore_kuzu::{ImportReport, KuzuGraphStore, Result, StoreConfig, TransactionConfig};
use graphstore_test::fixtures::{self, builders::DocumentBuilder};
use graphstore_test::MemoryEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const WRITERS: usize = 8;

fn open(engine: &Arc<MemoryEngine>) -> Arc<KuzuGraphStore> {
    let store = KuzuGraphStore::new(
        Arc::clone(engine) as Arc<dyn GraphEngine>,
        StoreConfig::new().with_dangerous_requests(),
    )
    .unwrap();
    Arc::new(store)
}

fn spawn_writers(store: &Arc<KuzuGraphStore>) -> Vec<JoinHandle<Result<ImportReport>>> {
    (0..WRITERS)
        .map(|i| {
            let store = Arc::clone(store);
            tokio::spawn(async move {
                let doc = DocumentBuilder::new(format!("batch {}", i))
                    .nodes(&format!("w{}-", i), "Person", 3)
                    .build();
                if i % 2 == 0 {
                    store.add_graph_documents(&[doc]).await
                } else {
                    store.add_graph_document(&doc).await
                }
            })
        })
        .collect()
}

async fn join_all(handles: Vec<JoinHandle<Result<ImportReport>>>) {
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_imports_create_table_once() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);

    join_all(spawn_writers(&store)).await;

    assert_eq!(engine.count_executed("CREATE NODE TABLE IF NOT EXISTS Person"), 1);
    assert_eq!(engine.node_count("Person"), WRITERS * 3);
    assert!(!engine.in_transaction());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_imports_on_concurrent_engine() {
    let engine = Arc::new(MemoryEngine::with_capabilities(EngineCapabilities {
        transactions: false,
        concurrent_queries: true,
    }));
    let store = open(&engine);

    join_all(spawn_writers(&store)).await;

    assert_eq!(engine.count_executed("CREATE NODE TABLE IF NOT EXISTS Person"), 1);
    assert_eq!(engine.node_count("Person"), WRITERS * 3);
    assert_eq!(engine.count_executed("BEGIN"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_import_waits_for_open_transaction() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);

    let mut tx = store.begin_transaction(TransactionConfig::new()).await.unwrap();
    store
        .add_graph_documents_with_transaction(&mut tx, &[fixtures::org_chart()])
        .await
        .unwrap();

    let background = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.add_graph_document(&fixtures::alice_knows_bob()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!background.is_finished());
    assert!(engine.node("Person", "alice").is_none());

    tx.rollback().await.unwrap();
    let report = background.await.unwrap().unwrap();

    assert_eq!(report.nodes, 2);
    assert_eq!(engine.node_count("Person"), 2);
    assert!(engine.node("Person", "alice").is_some());
    assert!(engine.node("Person", "carol").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_transactions_both_commit() {
    let engine = Arc::new(MemoryEngine::new());
    let store = open(&engine);

    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.add_graph_documents(&[fixtures::org_chart()]).await })
    };
    let second = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.add_graph_documents(&[fixtures::alice_knows_bob()]).await })
    };
    let (first, second) = tokio::join!(first, second);
    first.unwrap().unwrap();
    second.unwrap().unwrap();

    assert_eq!(engine.count_executed("BEGIN TRANSACTION"), 2);
    assert_eq!(engine.count_executed("COMMIT"), 2);
    assert_eq!(engine.node_count("Person"), 5);
    assert!(!engine.in_transaction());
}
