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

//! Fluent builder for [`GraphDocument`] fixtures.

use graphstore_core::{GraphDocument, Node, Relationship, SourceDocument, Value};
use std::collections::BTreeMap;

/// Builder for creating customizable [`GraphDocument`] fixtures.
///
/// Nodes are declared once and referenced by `(id, type)` from
/// relationships, so endpoints carry the same properties as the node list.
///
/// # Examples
///
/// ```
/// use graphstore_test::fixtures::builders::DocumentBuilder;
///
/// let doc = DocumentBuilder::new("Alice knows Bob.")
///     .metadata("id", "doc-1")
///     .node_with("alice", "Person", [("age", 30)])
///     .node("bob", "Person")
///     .relationship(("alice", "Person"), "KNOWS", ("bob", "Person"))
///     .build();
///
/// assert_eq!(doc.source.explicit_id(), Some("doc-1"));
/// assert_eq!(doc.nodes.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    source: SourceDocument,
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new("")
    }
}

impl DocumentBuilder {
    /// Creates a builder over the given source text.
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            source: SourceDocument::new(page_content),
            nodes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Adds a metadata entry to the source document.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.source = self.source.with_metadata(key, value);
        self
    }

    /// Adds a node without properties.
    pub fn node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.nodes.push(Node::new(id, node_type));
        self
    }

    /// Adds a node with properties.
    pub fn node_with<K, V>(
        mut self,
        id: impl Into<String>,
        node_type: impl Into<String>,
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let node = properties
            .into_iter()
            .fold(Node::new(id, node_type), |node, (k, v)| node.with_property(k, v));
        self.nodes.push(node);
        self
    }

    /// Adds `count` nodes of one type with ids `{prefix}{i}`.
    pub fn nodes(mut self, prefix: &str, node_type: &str, count: usize) -> Self {
        for i in 0..count {
            self.nodes.push(
                Node::new(format!("{}{}", prefix, i), node_type).with_property("index", i as i64),
            );
        }
        self
    }

    /// Adds a relationship without properties.
    pub fn relationship(
        self,
        source: (&str, &str),
        rel_type: impl Into<String>,
        target: (&str, &str),
    ) -> Self {
        self.relationship_with(source, rel_type, target, std::iter::empty::<(String, Value)>())
    }

    /// Adds a relationship with properties.
    ///
    /// Endpoints reuse declared nodes when present.
    pub fn relationship_with<K, V>(
        mut self,
        source: (&str, &str),
        rel_type: impl Into<String>,
        target: (&str, &str),
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let source = self.endpoint(source);
        let target = self.endpoint(target);
        let rel = properties
            .into_iter()
            .fold(Relationship::new(source, rel_type, target), |rel, (k, v)| {
                rel.with_property(k, v)
            });
        self.relationships.push(rel);
        self
    }

    fn endpoint(&self, (id, node_type): (&str, &str)) -> Node {
        self.nodes
            .iter()
            .find(|n| n.id == id && n.node_type == node_type)
            .cloned()
            .unwrap_or_else(|| Node::new(id, node_type))
    }

    /// Builds the document.
    pub fn build(self) -> GraphDocument {
        GraphDocument {
            nodes: self.nodes,
            relationships: self.relationships,
            source: self.source,
        }
    }
}

/// Builds a property map from pairs.
pub fn properties<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, Value>
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
