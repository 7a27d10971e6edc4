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

//! Shared test fixtures and an in-memory engine for GraphStore.
//!
//! This crate provides canonical graph documents, a fluent document builder,
//! counting helpers, and [`MemoryEngine`], a [`GraphEngine`] that keeps
//! tables in memory and lets tests inject failures, delays and catalog
//! outages.
//!
//! # Quick Start
//!
//! ```rust
//! use graphstore_test::{fixtures, count_nodes, MemoryEngine};
//! use graphstore_test::fixtures::builders::DocumentBuilder;
//!
//! // Pre-built fixtures
//! let doc = fixtures::alice_knows_bob();
//! assert_eq!(count_nodes(&[doc]), 2);
//!
//! // Custom documents
//! let doc = DocumentBuilder::new("Acme hired Carol.")
//!     .node("acme", "Company")
//!     .node("carol", "Person")
//!     .relationship(("acme", "Company"), "EMPLOYS", ("carol", "Person"))
//!     .build();
//! assert_eq!(doc.relationships.len(), 1);
//!
//! // Engine for store tests
//! let engine = MemoryEngine::new();
//! assert!(!engine.has_table("Person"));
//! ```
//!
//! [`GraphEngine`]: graphstore_core::GraphEngine

mod counts;
mod engine;
pub mod fixtures;

pub use counts::{count_by_type, count_nodes, count_relationships, distinct_node_ids};
pub use engine::{MemoryEngine, StoredNode};

use graphstore_core::GraphDocument;

/// Type alias for a list of fixture functions (name, generator).
pub type FixtureList = Vec<(&'static str, fn() -> GraphDocument)>;
