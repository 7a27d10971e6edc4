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

//! The seam between the store and an embedded graph engine.
//!
//! The engine is a black box that executes parameterized Cypher-dialect
//! statements and exposes its catalog. Calls are blocking; the store moves
//! them off the async runtime and races them against cancellation.

use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// A value crossing the engine boundary, as a parameter or a result cell.
///
/// Width and temporal intent are not carried here; they travel separately as
/// the declared column type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum EngineValue {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer of any width.
    Int(i64),
    /// Unsigned integer of any width.
    UInt(u64),
    /// Floating-point number of any width.
    Float(f64),
    /// Text, also used for formatted dates and timestamps.
    String(String),
    /// List.
    List(Vec<EngineValue>),
    /// Struct with named fields.
    Struct(BTreeMap<String, EngineValue>),
}

impl EngineValue {
    /// Returns true for [`EngineValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Try to get as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(n) => Some(*n),
            Self::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Try to get as a float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            Self::UInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Try to get as a list.
    pub fn as_list(&self) -> Option<&[EngineValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get as a struct.
    pub fn as_struct(&self) -> Option<&BTreeMap<String, EngineValue>> {
        match self {
            Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Look up a struct field.
    pub fn get(&self, field: &str) -> Option<&EngineValue> {
        self.as_struct().and_then(|fields| fields.get(field))
    }
}

impl From<bool> for EngineValue {
    fn from(v: bool) -> Self {
        EngineValue::Bool(v)
    }
}

impl From<i64> for EngineValue {
    fn from(v: i64) -> Self {
        EngineValue::Int(v)
    }
}

impl From<i32> for EngineValue {
    fn from(v: i32) -> Self {
        EngineValue::Int(i64::from(v))
    }
}

impl From<u64> for EngineValue {
    fn from(v: u64) -> Self {
        EngineValue::UInt(v)
    }
}

impl From<f64> for EngineValue {
    fn from(v: f64) -> Self {
        EngineValue::Float(v)
    }
}

impl From<String> for EngineValue {
    fn from(v: String) -> Self {
        EngineValue::String(v)
    }
}

impl From<&str> for EngineValue {
    fn from(v: &str) -> Self {
        EngineValue::String(v.to_string())
    }
}

impl<T: Into<EngineValue>> From<Vec<T>> for EngineValue {
    fn from(v: Vec<T>) -> Self {
        EngineValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<EngineValue>> From<Option<T>> for EngineValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(x) => x.into(),
            None => EngineValue::Null,
        }
    }
}

/// A result row keyed by column name.
pub type Row = BTreeMap<String, EngineValue>;

/// Rows and timings returned by one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Result rows in engine order.
    pub rows: Vec<Row>,
    /// Execution time reported by the engine.
    pub execution_time_ms: f64,
    /// Compilation time reported by the engine.
    pub compile_time_ms: f64,
}

impl QueryResult {
    /// A result holding the given rows and zero timings.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Number of rows returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Value of `column` in the first row.
    pub fn scalar(&self, column: &str) -> Option<&EngineValue> {
        self.first().and_then(|row| row.get(column))
    }
}

/// Catalog kind of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    /// A node table.
    Node,
    /// A relationship table with its endpoint node tables.
    Relationship {
        /// Source node table.
        from: String,
        /// Target node table.
        to: String,
    },
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Node or relationship table.
    pub kind: TableKind,
}

impl TableInfo {
    /// A node table entry.
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::Node,
        }
    }

    /// A relationship table entry.
    pub fn relationship(
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::Relationship {
                from: from.into(),
                to: to.into(),
            },
        }
    }
}

/// A declared column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Engine type as the catalog prints it, e.g. `MAP(STRING, STRING)`.
    pub data_type: String,
}

impl ColumnInfo {
    /// Create a column entry.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Optional engine features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineCapabilities {
    /// `BEGIN TRANSACTION` / `COMMIT` / `ROLLBACK` are honored.
    pub transactions: bool,
    /// Statements may run concurrently on one connection.
    pub concurrent_queries: bool,
}

/// Failure reported by the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine is unreachable or not initialized. Worth a reconnect.
    #[error("connection unavailable: {0}")]
    Connection(String),

    /// The engine rejected or failed the statement.
    #[error("{0}")]
    Query(String),

    /// The statement was stopped by [`GraphEngine::interrupt`].
    #[error("query interrupted")]
    Interrupted,
}

/// A blocking, embedded property-graph engine.
pub trait GraphEngine: Send + Sync {
    /// Execute one parameterized statement.
    fn execute(
        &self,
        query: &str,
        params: &BTreeMap<String, EngineValue>,
    ) -> Result<QueryResult, EngineError>;

    /// List every table in the catalog.
    fn list_tables(&self) -> Result<Vec<TableInfo>, EngineError>;

    /// List the declared columns of one table.
    fn table_properties(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError>;

    /// Ask the in-flight statement to stop.
    fn interrupt(&self) {}

    /// Bound the engine's worker threads.
    fn set_max_threads(&self, _threads: usize) {}

    /// Set the engine-side statement timeout.
    fn set_timeout(&self, _timeout: Duration) {}

    /// Re-establish the underlying connection.
    fn reconnect(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Optional features this engine supports.
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_value_accessors() {
        assert_eq!(EngineValue::UInt(5).as_i64(), Some(5));
        assert_eq!(EngineValue::Int(-1).as_u64(), None);
        assert_eq!(EngineValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(EngineValue::from("x").as_str(), Some("x"));
        assert!(EngineValue::from(None::<i64>).is_null());
    }

    #[test]
    fn test_struct_field_lookup() {
        let mut fields = BTreeMap::new();
        fields.insert("merged".to_string(), EngineValue::Int(3));
        let value = EngineValue::Struct(fields);
        assert_eq!(value.get("merged"), Some(&EngineValue::Int(3)));
        assert_eq!(value.get("other"), None);
        assert_eq!(EngineValue::Int(1).get("merged"), None);
    }

    #[test]
    fn test_query_result_scalar() {
        let mut row = Row::new();
        row.insert("count".to_string(), EngineValue::Int(7));
        let result = QueryResult::with_rows(vec![row]);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.scalar("count"), Some(&EngineValue::Int(7)));
        assert_eq!(QueryResult::default().scalar("count"), None);
    }

    #[test]
    fn test_table_info_constructors() {
        let table = TableInfo::relationship("KNOWS_Person_Person", "Person", "Person");
        assert_eq!(
            table.kind,
            TableKind::Relationship {
                from: "Person".to_string(),
                to: "Person".to_string()
            }
        );
        assert_eq!(TableInfo::node("Person").kind, TableKind::Node);
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(
            EngineError::Connection("closed".into()).to_string(),
            "connection unavailable: closed"
        );
        assert_eq!(EngineError::Query("bad".into()).to_string(), "bad");
    }
}
