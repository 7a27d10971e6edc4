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

//! Idempotent import of graph documents into an embedded Kuzu-style
//! property graph engine.
//!
//! The store turns application-level [`GraphDocument`]s into parameterized
//! Cypher, creating tables on first use and merging every node and
//! relationship by id so that re-importing a document changes nothing.
//!
//! # Storage Layout
//!
//! | Graph Concept | Engine Representation |
//! |---------------|-----------------------|
//! | Node type `T` | Node table `T` with `id`, `type`, `properties MAP(STRING, STRING)` |
//! | Node id | Primary key `id` |
//! | Node properties | `properties` map, composites as JSON text |
//! | Relationship `(S)-[R]->(T)` | Relationship table `R_S_T` with a `properties` map |
//! | Source text | `Chunk` node linked to its entities by `MENTIONS_Chunk_T` |
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`mapping`] | Host value to engine value conversion and back |
//! | [`schema`] | Lazy table creation, introspection, schema fingerprints |
//! | [`import`] | Validation, deduplication, individual and batched writes |
//! | [`transaction`] | Logical transaction state machine |
//! | [`store`] | The [`KuzuGraphStore`] facade |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use graphstore_core::{GraphDocument, GraphEngine, Node, Relationship, SourceDocument};
//! use graphstore_kuzu::{KuzuGraphStore, StoreConfig};
//!
//! async fn example(engine: Arc<dyn GraphEngine>) -> graphstore_kuzu::Result<()> {
//!     let config = StoreConfig::builder()
//!         .allow_dangerous_requests(true)
//!         .max_num_threads(2)
//!         .build();
//!     let store = KuzuGraphStore::new(engine, config)?;
//!
//!     let alice = Node::new("alice", "Person").with_property("age", 34i64);
//!     let bob = Node::new("bob", "Person");
//!     let doc = GraphDocument::new(SourceDocument::new("Alice knows Bob."))
//!         .with_node(alice.clone())
//!         .with_node(bob.clone())
//!         .with_relationship(Relationship::new(alice, "KNOWS", bob));
//!
//!     let report = store.add_graph_documents(&[doc]).await?;
//!     assert_eq!(report.nodes, 2);
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! The crate emits `tracing` events: `debug!` per statement, `info!` per
//! import and transaction outcome, `warn!` for skipped best-effort work.
//! Installing a subscriber is up to the application.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod connection;
pub mod cypher;
pub mod error;
pub mod executor;
pub mod import;
pub mod mapping;
pub mod schema;
pub mod store;
pub mod transaction;

// Re-export main types at crate root for convenience
pub use config::{
    ConverterConfig, ImportOptions, RetryPolicy, StoreConfig, StoreConfigBuilder,
    TransactionConfig, TypeConsistency, WriteStrategy, DEFAULT_BATCH_THRESHOLD,
    DEFAULT_CHUNK_SIZE, DEFAULT_QUERY_TIMEOUT,
};
pub use connection::Connection;
pub use cypher::{CypherStatement, StatementType};
pub use error::{ConversionError, ErrorKind, GraphStoreError, Result};
pub use executor::{DirectExecutor, Executor};
pub use import::{
    deduplicate_nodes, deduplicate_relationships, validate_documents, ImportPipeline,
    ImportReport, ImportStatistics,
};
pub use mapping::{EngineType, PropertyConverter, TypeConverter};
pub use schema::{SchemaManager, SchemaSnapshot};
pub use store::KuzuGraphStore;
pub use transaction::{Transaction, TransactionState};

pub use graphstore_core::{GraphDocument, Node, Relationship, SourceDocument, Value};
