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

//! Graph documents produced by an extraction step.

use crate::Value;
use std::collections::BTreeMap;

/// A typed entity with a property bag.
///
/// `id` is unique within `node_type`; every write keyed on it is a merge.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Identifier, unique per type.
    pub id: String,
    /// The node label.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub node_type: String,
    /// Arbitrary typed properties.
    #[cfg_attr(feature = "serde", serde(default))]
    pub properties: BTreeMap<String, Value>,
}

impl Node {
    /// Create a node without properties.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a property by key.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A typed, directed edge between two nodes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relationship {
    /// Edge origin.
    pub source: Node,
    /// Edge destination.
    pub target: Node,
    /// The relationship label.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub rel_type: String,
    /// Arbitrary typed properties.
    #[cfg_attr(feature = "serde", serde(default))]
    pub properties: BTreeMap<String, Value>,
}

impl Relationship {
    /// Create a relationship `source -[rel_type]-> target`.
    pub fn new(source: Node, rel_type: impl Into<String>, target: Node) -> Self {
        Self {
            source,
            target,
            rel_type: rel_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Render as `(source:Type)-[REL]->(target:Type)`.
    pub fn describe(&self) -> String {
        format!(
            "({}:{})-[{}]->({}:{})",
            self.source.id, self.source.node_type, self.rel_type, self.target.id, self.target.node_type
        )
    }
}

/// The text a graph was extracted from.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceDocument {
    /// Raw text content.
    pub page_content: String,
    /// Free-form metadata. A string `id` entry names the chunk explicitly.
    #[cfg_attr(feature = "serde", serde(default))]
    pub metadata: BTreeMap<String, Value>,
}

impl SourceDocument {
    /// Create a source document from text.
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The explicit `id` metadata entry, if it is a non-empty string.
    pub fn explicit_id(&self) -> Option<&str> {
        self.metadata
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// Nodes and relationships extracted from one source document.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphDocument {
    /// Nodes, in extraction order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub nodes: Vec<Node>,
    /// Relationships, in extraction order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub relationships: Vec<Relationship>,
    /// The originating text.
    #[cfg_attr(feature = "serde", serde(default))]
    pub source: SourceDocument,
}

impl GraphDocument {
    /// Create an empty graph document for a source.
    pub fn new(source: SourceDocument) -> Self {
        Self {
            nodes: Vec::new(),
            relationships: Vec::new(),
            source,
        }
    }

    /// Append a node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append a relationship.
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Returns true if the document carries no nodes and no relationships.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}
