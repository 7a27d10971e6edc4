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

//! Cypher statement types.

use super::escape::{escape_identifier, quote_string};
use graphstore_core::EngineValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Render an engine value as Cypher literal syntax.
pub fn to_cypher_literal(value: &EngineValue) -> String {
    match value {
        EngineValue::Null => "null".to_string(),
        EngineValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        EngineValue::Int(i) => i.to_string(),
        EngineValue::UInt(u) => u.to_string(),
        EngineValue::Float(f) => {
            if f.is_nan() {
                "0.0/0.0".to_string()
            } else if f.is_infinite() {
                if *f > 0.0 {
                    "1.0/0.0".to_string()
                } else {
                    "-1.0/0.0".to_string()
                }
            } else {
                let s = f.to_string();
                if s.contains('.') || s.contains('e') || s.contains('E') {
                    s
                } else {
                    format!("{}.0", s)
                }
            }
        }
        EngineValue::String(s) => quote_string(s),
        EngineValue::List(items) => {
            let inner: Vec<String> = items.iter().map(to_cypher_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        EngineValue::Struct(fields) => {
            let pairs: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{}: {}", escape_identifier(k), to_cypher_literal(v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
    }
}

/// The kind of statement, used for logging and read-only enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementType {
    /// Table creation.
    Schema,
    /// Node merge.
    UpsertNode,
    /// Relationship merge.
    UpsertRelationship,
    /// Chunk merge or mentions link.
    Attribution,
    /// `BEGIN`, `COMMIT` or `ROLLBACK`.
    TransactionControl,
    /// Caller-supplied statement.
    Query,
}

impl StatementType {
    /// Statement types that always modify the database.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::Schema | Self::UpsertNode | Self::UpsertRelationship | Self::Attribution
        )
    }
}

/// Clauses that modify data or schema.
const WRITE_CLAUSES: &[&str] = &[
    "CREATE", "MERGE", "SET", "DELETE", "REMOVE", "DROP", "ALTER", "COPY",
];

/// A single Cypher statement with parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CypherStatement {
    /// The Cypher query text.
    pub query: String,
    /// Parameters referenced as `$name` in the query.
    pub parameters: BTreeMap<String, EngineValue>,
    /// Type of statement.
    pub statement_type: StatementType,
    /// Optional comment describing the statement.
    pub comment: Option<String>,
}

impl CypherStatement {
    /// Create a new Cypher statement.
    pub fn new(query: impl Into<String>, statement_type: StatementType) -> Self {
        Self {
            query: query.into(),
            parameters: BTreeMap::new(),
            statement_type,
            comment: None,
        }
    }

    /// Create a general query statement.
    pub fn query(query: impl Into<String>) -> Self {
        Self::new(query, StatementType::Query)
    }

    /// Add a parameter to this statement.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<EngineValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Add multiple parameters to this statement.
    pub fn with_params(
        mut self,
        params: impl IntoIterator<Item = (String, EngineValue)>,
    ) -> Self {
        self.parameters.extend(params);
        self
    }

    /// Add a comment to this statement.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Check if this statement has parameters.
    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Whether the statement modifies the database.
    ///
    /// Typed statements answer from their type. Caller-supplied queries are
    /// scanned for write clauses.
    pub fn is_write(&self) -> bool {
        if self.statement_type.is_write() {
            return true;
        }
        if self.statement_type != StatementType::Query {
            return false;
        }
        self.query
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .any(|word| {
                WRITE_CLAUSES
                    .iter()
                    .any(|clause| word.eq_ignore_ascii_case(clause))
            })
    }

    /// Render this statement with parameter values inlined.
    ///
    /// For diagnostics only; execution always sends parameters separately.
    pub fn render_inline(&self) -> String {
        let mut params: Vec<(&String, &EngineValue)> = self.parameters.iter().collect();
        params.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));

        let mut result = self.query.clone();
        for (name, value) in params {
            let placeholder = format!("${}", name);
            result = result.replace(&placeholder, &to_cypher_literal(value));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(to_cypher_literal(&EngineValue::Null), "null");
        assert_eq!(to_cypher_literal(&EngineValue::Bool(true)), "true");
        assert_eq!(to_cypher_literal(&EngineValue::Int(42)), "42");
        assert_eq!(to_cypher_literal(&EngineValue::UInt(7)), "7");
        assert_eq!(to_cypher_literal(&EngineValue::Float(3.25)), "3.25");
        assert_eq!(to_cypher_literal(&EngineValue::Float(2.0)), "2.0");
        assert_eq!(to_cypher_literal(&EngineValue::from("it's")), "'it\\'s'");
    }

    #[test]
    fn test_float_edge_cases() {
        assert_eq!(to_cypher_literal(&EngineValue::Float(f64::NAN)), "0.0/0.0");
        assert_eq!(to_cypher_literal(&EngineValue::Float(f64::INFINITY)), "1.0/0.0");
        assert_eq!(
            to_cypher_literal(&EngineValue::Float(f64::NEG_INFINITY)),
            "-1.0/0.0"
        );
    }

    #[test]
    fn test_composite_literals() {
        let list = EngineValue::List(vec![EngineValue::Int(1), EngineValue::Int(2)]);
        assert_eq!(to_cypher_literal(&list), "[1, 2]");

        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), EngineValue::from("Alice"));
        fields.insert("age".to_string(), EngineValue::Int(30));
        assert_eq!(
            to_cypher_literal(&EngineValue::Struct(fields)),
            "{age: 30, name: 'Alice'}"
        );
    }

    #[test]
    fn test_statement_with_params() {
        let stmt = CypherStatement::query("MATCH (n {id: $id}) RETURN n").with_param("id", "alice");
        assert!(stmt.has_parameters());
        assert_eq!(stmt.parameters.get("id"), Some(&EngineValue::from("alice")));
        assert_eq!(stmt.statement_type, StatementType::Query);
    }

    #[test]
    fn test_render_inline_prefers_longer_names() {
        let stmt = CypherStatement::query("RETURN $id, $id_suffix")
            .with_param("id", "a")
            .with_param("id_suffix", "b");
        assert_eq!(stmt.render_inline(), "RETURN 'a', 'b'");
    }

    #[test]
    fn test_typed_statements_classify_writes() {
        assert!(StatementType::Schema.is_write());
        assert!(StatementType::UpsertNode.is_write());
        assert!(!StatementType::TransactionControl.is_write());
        assert!(!StatementType::Query.is_write());
    }

    #[test]
    fn test_query_write_detection() {
        assert!(CypherStatement::query("MATCH (n) SET n.x = 1").is_write());
        assert!(CypherStatement::query("merge (n:Person {id: 'a'})").is_write());
        assert!(!CypherStatement::query("MATCH (n) RETURN n.created_at").is_write());
        assert!(!CypherStatement::query("RETURN 1 AS health_check").is_write());
    }

    #[test]
    fn test_comment() {
        let stmt = CypherStatement::query("RETURN 1").with_comment("liveness");
        assert_eq!(stmt.comment.as_deref(), Some("liveness"));
    }
}
