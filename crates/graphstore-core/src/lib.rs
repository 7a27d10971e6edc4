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

//! Graph document model and engine seam for GraphStore.
//!
//! This crate defines the application-level input to the store:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`GraphDocument`] | Nodes and relationships extracted from one source text |
//! | [`Node`] | Typed entity, unique by `id` within its type |
//! | [`Relationship`] | Typed directed edge between two nodes |
//! | [`SourceDocument`] | The originating text and its metadata |
//! | [`Value`] | Tagged property value with explicit width and temporal intent |
//!
//! It also defines the [`GraphEngine`] seam: the blocking execution and
//! catalog interface every embedded engine adapter implements, together with
//! the [`EngineValue`] and [`QueryResult`] types crossing it.
//!
//! # Example
//!
//! ```rust
//! use graphstore_core::{GraphDocument, Node, Relationship, SourceDocument};
//!
//! let alice = Node::new("alice", "Person").with_property("age", 34i64);
//! let bob = Node::new("bob", "Person");
//! let doc = GraphDocument::new(SourceDocument::new("Alice knows Bob."))
//!     .with_node(alice.clone())
//!     .with_node(bob.clone())
//!     .with_relationship(Relationship::new(alice, "KNOWS", bob));
//!
//! assert_eq!(doc.nodes.len(), 2);
//! ```

#![deny(missing_docs)]

mod document;
pub mod engine;
mod value;

pub use document::{GraphDocument, Node, Relationship, SourceDocument};
pub use engine::{
    ColumnInfo, EngineCapabilities, EngineError, EngineValue, GraphEngine, QueryResult, Row,
    TableInfo, TableKind,
};
pub use value::Value;
