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

//! Pre-built graph documents.

use super::builders::{properties, DocumentBuilder};
use chrono::NaiveDate;
use graphstore_core::{GraphDocument, Value};

/// Two people and one `KNOWS` edge, with an explicit source id.
pub fn alice_knows_bob() -> GraphDocument {
    DocumentBuilder::new("Alice has known Bob since 2015.")
        .metadata("id", "doc-alice-bob")
        .node_with("alice", "Person", [("name", "Alice")])
        .node_with("bob", "Person", [("name", "Bob")])
        .relationship_with(("alice", "Person"), "KNOWS", ("bob", "Person"), [("since", 2015)])
        .build()
}

/// A company with three employees and a reporting line.
pub fn org_chart() -> GraphDocument {
    DocumentBuilder::new("Acme employs Carol, Dave and Erin. Dave reports to Carol.")
        .metadata("source", "hr-export")
        .node_with("acme", "Company", [("industry", "manufacturing")])
        .node("carol", "Person")
        .node("dave", "Person")
        .node("erin", "Person")
        .relationship(("acme", "Company"), "EMPLOYS", ("carol", "Person"))
        .relationship(("acme", "Company"), "EMPLOYS", ("dave", "Person"))
        .relationship(("acme", "Company"), "EMPLOYS", ("erin", "Person"))
        .relationship(("dave", "Person"), "REPORTS_TO", ("carol", "Person"))
        .build()
}

/// One node carrying every property shape the converters handle.
pub fn typed_properties() -> GraphDocument {
    let launched = NaiveDate::from_ymd_opt(2021, 3, 14).map(Value::Date).unwrap_or(Value::Null);
    DocumentBuilder::new("Product sheet for the Widget.")
        .node_with(
            "widget",
            "Product",
            [
                ("name", Value::from("Widget")),
                ("price", Value::Float64(9.5)),
                ("stock", Value::Int64(120)),
                ("active", Value::Bool(true)),
                ("launched", launched),
                ("tags", Value::from(vec!["tool", "metal"])),
                ("dimensions", Value::from(properties([("w", 3), ("h", 4)]))),
                ("discontinued", Value::Null),
            ],
        )
        .build()
}

/// A document without source text; attribution has nothing to record.
pub fn untitled() -> GraphDocument {
    DocumentBuilder::default().node("solo", "Thing").build()
}

/// Labels that collide with query keywords.
pub fn keyword_labels() -> GraphDocument {
    DocumentBuilder::new("Order o1 matches Match m1.")
        .node("o1", "Order")
        .node("m1", "Match")
        .relationship(("o1", "Order"), "WHERE", ("m1", "Match"))
        .build()
}

/// A relationship whose target was never declared as a node.
pub fn dangling_relationship() -> GraphDocument {
    DocumentBuilder::new("Alice knows someone.")
        .node("alice", "Person")
        .relationship(("alice", "Person"), "KNOWS", ("ghost", "Person"))
        .build()
}

/// `count` people in one document, each knowing the next.
pub fn people_chain(count: usize) -> GraphDocument {
    let mut builder = DocumentBuilder::new(format!("A chain of {} people.", count))
        .nodes("p", "Person", count);
    for i in 1..count {
        let source = format!("p{}", i - 1);
        let target = format!("p{}", i);
        builder = builder.relationship((source.as_str(), "Person"), "KNOWS", (target.as_str(), "Person"));
    }
    builder.build()
}

/// `count` single-node documents with distinct texts.
pub fn many_documents(count: usize) -> Vec<GraphDocument> {
    (0..count)
        .map(|i| {
            DocumentBuilder::new(format!("Note number {}.", i))
                .node(format!("n{}", i), "Note")
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_people_chain_shape() {
        let doc = people_chain(4);
        assert_eq!(doc.nodes.len(), 4);
        assert_eq!(doc.relationships.len(), 3);
        assert_eq!(doc.relationships[2].target.id, "p3");
    }

    #[test]
    fn test_dangling_target_is_undeclared() {
        let doc = dangling_relationship();
        assert!(doc.nodes.iter().all(|n| n.id != "ghost"));
    }

    #[test]
    fn test_typed_properties_include_null() {
        let doc = typed_properties();
        assert_eq!(doc.nodes[0].property("discontinued"), Some(&Value::Null));
        assert!(matches!(doc.nodes[0].property("launched"), Some(Value::Date(_))));
    }
}
