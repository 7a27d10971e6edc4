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

//! Error types for the Kuzu graph store.

use crate::transaction::TransactionState;
use graphstore_core::EngineError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a [`GraphStoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Store options forbid the operation.
    Configuration,
    /// Engine unreachable or closed. Retryable.
    Connection,
    /// Malformed input document. Nothing was written.
    Validation,
    /// A value has no engine representation.
    Conversion,
    /// DDL failed for a required table.
    Schema,
    /// The engine rejected or failed a statement.
    QueryExecution,
    /// Explicit cancellation or an expired deadline.
    Cancellation,
    /// Transaction state machine violation.
    Transaction,
    /// JSON encoding or decoding failed.
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "ConfigurationError"),
            Self::Connection => write!(f, "ConnectionError"),
            Self::Validation => write!(f, "ValidationError"),
            Self::Conversion => write!(f, "ConversionError"),
            Self::Schema => write!(f, "SchemaError"),
            Self::QueryExecution => write!(f, "QueryExecutionError"),
            Self::Cancellation => write!(f, "CancellationError"),
            Self::Transaction => write!(f, "TransactionError"),
            Self::Serialization => write!(f, "SerializationError"),
        }
    }
}

/// A value could not be mapped between host and engine representations.
///
/// `path` names the offending location inside the value, e.g. `tags[2]` or
/// `address.city`. It is empty when the top-level value itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    path: String,
    message: String,
}

impl ConversionError {
    /// Create an error at the root of the value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
        }
    }

    /// Prefix the path with a map key or struct field.
    pub fn at_key(mut self, key: &str) -> Self {
        self.path = if self.path.is_empty() {
            key.to_string()
        } else if self.path.starts_with('[') {
            format!("{}{}", key, self.path)
        } else {
            format!("{}.{}", key, self.path)
        };
        self
    }

    /// Prefix the path with a list index.
    pub fn at_index(mut self, index: usize) -> Self {
        self.path = if self.path.is_empty() || self.path.starts_with('[') {
            format!("[{}]{}", index, self.path)
        } else {
            format!("[{}].{}", index, self.path)
        };
        self
    }

    /// Location of the failure inside the value.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// What went wrong.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "at '{}': {}", self.path, self.message)
        }
    }
}

impl std::error::Error for ConversionError {}

/// Error type for graph store operations.
#[derive(Debug, Error)]
pub enum GraphStoreError {
    /// The store options do not allow the operation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The engine is unreachable, uninitialized or closed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A document failed validation; the batch was rejected before any write.
    #[error("invalid document {document}: {message}")]
    Validation {
        /// Index of the offending document in the batch.
        document: usize,
        /// Description of the violation.
        message: String,
    },

    /// A property value could not be converted.
    #[error("failed to convert {context}: {source}")]
    Conversion {
        /// The entity and key being converted.
        context: String,
        /// Underlying conversion failure.
        source: ConversionError,
    },

    /// DDL for a required table failed, or a table failed validation.
    #[error("schema error on table '{table}': {message}")]
    Schema {
        /// Table at fault.
        table: String,
        /// Engine message.
        message: String,
    },

    /// The engine rejected or failed a statement.
    #[error("query failed: {message}")]
    QueryExecution {
        /// Statement text.
        query: String,
        /// Engine message.
        message: String,
    },

    /// A relationship write matched fewer endpoint pairs than it carried.
    #[error("relationship endpoints not found: {0}")]
    UnmatchedEndpoint(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The transaction is not in a state that permits the operation.
    #[error("cannot {operation} transaction {id} in state {state}")]
    InvalidTransactionState {
        /// Transaction id.
        id: Uuid,
        /// Current state.
        state: TransactionState,
        /// Rejected operation.
        operation: &'static str,
    },

    /// A write was issued through a read-only transaction.
    #[error("transaction {0} is read-only")]
    ReadOnlyTransaction(Uuid),

    /// A transactional callback failed and the rollback failed too.
    #[error("function failed: {source}, rollback failed: {rollback}")]
    RollbackFailed {
        /// The callback's error.
        source: Box<GraphStoreError>,
        /// The rollback's error.
        rollback: Box<GraphStoreError>,
    },

    /// Serialization error from serde_json.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphStoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conversion { .. } => ErrorKind::Conversion,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::QueryExecution { .. } | Self::UnmatchedEndpoint(_) => ErrorKind::QueryExecution,
            Self::Cancelled | Self::Timeout(_) => ErrorKind::Cancellation,
            Self::InvalidTransactionState { .. } | Self::ReadOnlyTransaction(_) => {
                ErrorKind::Transaction
            }
            Self::RollbackFailed { source, .. } => source.kind(),
            Self::Json(_) => ErrorKind::Serialization,
        }
    }

    /// Connection-class failures are worth a reconnect and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Wrap a conversion failure with the entity it happened in.
    pub fn conversion(context: impl Into<String>, source: ConversionError) -> Self {
        Self::Conversion {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn from_engine(err: EngineError, query: &str) -> Self {
        match err {
            EngineError::Connection(message) => Self::Connection(message),
            EngineError::Query(message) => Self::QueryExecution {
                query: query.to_string(),
                message,
            },
            EngineError::Interrupted => Self::Cancelled,
        }
    }
}

/// Result type alias for graph store operations.
pub type Result<T> = std::result::Result<T, GraphStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_path_building() {
        let err = ConversionError::new("inconsistent types")
            .at_index(2)
            .at_key("tags");
        assert_eq!(err.path(), "tags[2]");

        let err = ConversionError::new("bad").at_key("city").at_key("address");
        assert_eq!(err.path(), "address.city");

        let err = ConversionError::new("bad").at_key("name").at_index(0);
        assert_eq!(err.path(), "[0].name");

        let err = ConversionError::new("bad").at_index(1).at_index(0);
        assert_eq!(err.path(), "[0][1]");
    }

    #[test]
    fn test_conversion_display() {
        assert_eq!(ConversionError::new("boom").to_string(), "boom");
        assert_eq!(
            ConversionError::new("boom").at_key("age").to_string(),
            "at 'age': boom"
        );
    }

    #[test]
    fn test_error_display_validation() {
        let err = GraphStoreError::Validation {
            document: 1,
            message: "node at index 0 has empty id".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("document 1"));
        assert!(msg.contains("empty id"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(GraphStoreError::Cancelled.kind(), ErrorKind::Cancellation);
        assert_eq!(
            GraphStoreError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Cancellation
        );
        assert_eq!(
            GraphStoreError::UnmatchedEndpoint("x".into()).kind(),
            ErrorKind::QueryExecution
        );
        assert_eq!(
            GraphStoreError::Configuration("x".into()).kind().to_string(),
            "ConfigurationError"
        );
    }

    #[test]
    fn test_only_connection_errors_retry() {
        assert!(GraphStoreError::Connection("gone".into()).is_retryable());
        assert!(!GraphStoreError::QueryExecution {
            query: "RETURN 1".into(),
            message: "syntax".into()
        }
        .is_retryable());
        assert!(!GraphStoreError::Cancelled.is_retryable());
    }

    #[test]
    fn test_from_engine_mapping() {
        let err = GraphStoreError::from_engine(EngineError::Query("bad".into()), "RETURN x");
        match err {
            GraphStoreError::QueryExecution { query, message } => {
                assert_eq!(query, "RETURN x");
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            GraphStoreError::from_engine(EngineError::Interrupted, ""),
            GraphStoreError::Cancelled
        ));
    }

    #[test]
    fn test_rollback_failed_keeps_source_kind() {
        let err = GraphStoreError::RollbackFailed {
            source: Box::new(GraphStoreError::Validation {
                document: 0,
                message: "bad".into(),
            }),
            rollback: Box::new(GraphStoreError::Connection("gone".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("rollback failed"));
    }

    #[test]
    fn test_error_from_json_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: GraphStoreError = json_err.into();
        assert!(matches!(err, GraphStoreError::Json(_)));
    }
}
