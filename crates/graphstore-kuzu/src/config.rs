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

//! Configuration types for the graph store.

use crate::error::{GraphStoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Documents with more nodes or relationships than this use the batched path.
pub const DEFAULT_BATCH_THRESHOLD: usize = 10;

/// Maximum rows per list-parameterized upsert.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Default per-statement and per-transaction timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// chrono format used to recognize and render dates.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// chrono format used to recognize and render timestamps (RFC 3339).
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%+";

/// Configuration for [`TypeConverter`](crate::mapping::TypeConverter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Require homogeneous list element types (default: false).
    pub strict: bool,

    /// Format for dates (default: `%Y-%m-%d`).
    pub date_format: String,

    /// Format for timestamps (default: `%+`, RFC 3339).
    pub timestamp_format: String,

    /// Promote strings that parse as dates, timestamps or JSON (default: true).
    ///
    /// Precedence is date, then timestamp, then JSON object or array. Any
    /// parse failure leaves the value a plain string.
    pub infer_string_types: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            strict: false,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            infer_string_types: true,
        }
    }
}

impl ConverterConfig {
    /// Create a permissive configuration with string inference enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Homogeneous lists, no string sniffing.
    pub fn strict() -> Self {
        Self {
            strict: true,
            infer_string_types: false,
            ..Self::default()
        }
    }

    /// Set the date format.
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Set the timestamp format.
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// Disable string promotion.
    pub fn without_string_inference(mut self) -> Self {
        self.infer_string_types = false;
        self
    }
}

/// Which write path a document takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteStrategy {
    /// Batched above the threshold, individual otherwise.
    #[default]
    Auto,
    /// One statement per node and per relationship.
    Individual,
    /// One `UNWIND` statement per type group and chunk.
    Batched,
}

/// What to do when one property key carries different types across the
/// nodes (or relationships) of one label within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeConsistency {
    /// Store every value as text and log the conflict.
    #[default]
    Coerce,
    /// Reject the batch before any write.
    Strict,
}

/// Options for one import call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Link every imported node to a chunk node for its source text (default: false).
    pub include_source: bool,

    /// Node or relationship count above which `Auto` batches (default: 10).
    pub batch_threshold: usize,

    /// Rows per batched statement (default: 100).
    pub chunk_size: usize,

    /// Write path selection (default: `Auto`).
    pub strategy: WriteStrategy,

    /// Drop repeated nodes and relationships within a document (default: true).
    pub deduplicate: bool,

    /// Policy for inconsistent property types (default: `Coerce`).
    pub type_consistency: TypeConsistency,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            include_source: false,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            strategy: WriteStrategy::Auto,
            deduplicate: true,
            type_consistency: TypeConsistency::Coerce,
        }
    }
}

impl ImportOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable source attribution.
    pub fn with_source(mut self) -> Self {
        self.include_source = true;
        self
    }

    /// Force a write path.
    pub fn with_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the batching threshold.
    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    /// Set the chunk size for batched statements.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Keep duplicate nodes and relationships.
    pub fn without_deduplication(mut self) -> Self {
        self.deduplicate = false;
        self
    }

    /// Set the type consistency policy.
    pub fn with_type_consistency(mut self, policy: TypeConsistency) -> Self {
        self.type_consistency = policy;
        self
    }
}

/// Configuration for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Reject write statements (default: false).
    pub read_only: bool,

    /// Deadline measured from begin (default: 30s).
    pub timeout: Duration,

    /// Reconnect-and-retry attempts for connection failures (default: 0).
    pub retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            timeout: DEFAULT_QUERY_TIMEOUT,
            retries: 0,
        }
    }
}

impl TransactionConfig {
    /// Create a read-write configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only transaction.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Set the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Exponential backoff for connection-class failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3).
    pub max_retries: u32,

    /// Delay before the first retry, doubled per attempt (default: 100ms).
    pub base_delay: Duration,

    /// Upper bound for a single delay (default: 5s).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Same delays, different budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Configuration for [`KuzuGraphStore`](crate::KuzuGraphStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Acknowledge that callers may issue arbitrary statements (default: false).
    ///
    /// The store refuses to open unless this is set.
    pub allow_dangerous_requests: bool,

    /// Per-statement timeout (default: 30s).
    pub query_timeout: Duration,

    /// Engine worker threads (default: 4).
    pub max_num_threads: usize,

    /// Backoff for connection failures outside transactions.
    pub retry: RetryPolicy,

    /// Value conversion settings.
    pub converter: ConverterConfig,

    /// Default import options.
    pub import: ImportOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            allow_dangerous_requests: false,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_num_threads: 4,
            retry: RetryPolicy::default(),
            converter: ConverterConfig::default(),
            import: ImportOptions::default(),
        }
    }
}

impl StoreConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for StoreConfig.
    ///
    /// # Examples
    ///
    /// ```
    /// # use graphstore_kuzu::StoreConfig;
    /// let config = StoreConfig::builder()
    ///     .allow_dangerous_requests(true)
    ///     .max_num_threads(2)
    ///     .build();
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Acknowledge arbitrary statement execution.
    pub fn with_dangerous_requests(mut self) -> Self {
        self.allow_dangerous_requests = true;
        self
    }

    /// Set the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the converter configuration.
    pub fn with_converter(mut self, converter: ConverterConfig) -> Self {
        self.converter = converter;
        self
    }

    /// Set the default import options.
    pub fn with_import(mut self, import: ImportOptions) -> Self {
        self.import = import;
        self
    }

    /// Check the configuration before opening a store.
    pub fn validate(&self) -> Result<()> {
        if !self.allow_dangerous_requests {
            return Err(GraphStoreError::Configuration(
                "allow_dangerous_requests must be set: the store executes caller-supplied \
                 statements against the engine"
                    .to_string(),
            ));
        }
        if self.import.chunk_size == 0 {
            return Err(GraphStoreError::Configuration(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.query_timeout.is_zero() {
            return Err(GraphStoreError::Configuration(
                "query_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for StoreConfig.
///
/// All unset fields fall back to their defaults.
#[derive(Debug, Default)]
pub struct StoreConfigBuilder {
    allow_dangerous_requests: Option<bool>,
    query_timeout: Option<Duration>,
    max_num_threads: Option<usize>,
    retry: Option<RetryPolicy>,
    converter: Option<ConverterConfig>,
    import: Option<ImportOptions>,
}

impl StoreConfigBuilder {
    /// Create a new builder with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether arbitrary statement execution is acknowledged.
    pub fn allow_dangerous_requests(mut self, allow: bool) -> Self {
        self.allow_dangerous_requests = Some(allow);
        self
    }

    /// Set the per-statement timeout.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Set the engine worker thread count.
    pub fn max_num_threads(mut self, threads: usize) -> Self {
        self.max_num_threads = Some(threads);
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the converter configuration.
    pub fn converter(mut self, converter: ConverterConfig) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Set the default import options.
    pub fn import(mut self, import: ImportOptions) -> Self {
        self.import = Some(import);
        self
    }

    /// Build the StoreConfig instance.
    pub fn build(self) -> StoreConfig {
        let defaults = StoreConfig::default();
        StoreConfig {
            allow_dangerous_requests: self
                .allow_dangerous_requests
                .unwrap_or(defaults.allow_dangerous_requests),
            query_timeout: self.query_timeout.unwrap_or(defaults.query_timeout),
            max_num_threads: self.max_num_threads.unwrap_or(defaults.max_num_threads),
            retry: self.retry.unwrap_or(defaults.retry),
            converter: self.converter.unwrap_or(defaults.converter),
            import: self.import.unwrap_or(defaults.import),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_defaults() {
        let options = ImportOptions::default();
        assert!(!options.include_source);
        assert_eq!(options.batch_threshold, 10);
        assert_eq!(options.chunk_size, 100);
        assert_eq!(options.strategy, WriteStrategy::Auto);
        assert!(options.deduplicate);
        assert_eq!(options.type_consistency, TypeConsistency::Coerce);
    }

    #[test]
    fn test_import_fluent() {
        let options = ImportOptions::new()
            .with_source()
            .with_strategy(WriteStrategy::Individual)
            .with_chunk_size(5)
            .without_deduplication()
            .with_type_consistency(TypeConsistency::Strict);
        assert!(options.include_source);
        assert_eq!(options.strategy, WriteStrategy::Individual);
        assert_eq!(options.chunk_size, 5);
        assert!(!options.deduplicate);
        assert_eq!(options.type_consistency, TypeConsistency::Strict);
    }

    #[test]
    fn test_converter_strict_disables_inference() {
        let config = ConverterConfig::strict();
        assert!(config.strict);
        assert!(!config.infer_string_types);
        assert_eq!(config.date_format, DEFAULT_DATE_FORMAT);

        let config = ConverterConfig::default();
        assert!(!config.strict);
        assert!(config.infer_string_types);
    }

    #[test]
    fn test_transaction_defaults() {
        let config = TransactionConfig::default();
        assert!(!config.read_only);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 0);
        assert!(TransactionConfig::read_only().read_only);
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_store_config_requires_dangerous_requests() {
        let err = StoreConfig::default().validate().unwrap_err();
        assert!(matches!(err, GraphStoreError::Configuration(_)));
        assert!(StoreConfig::default().with_dangerous_requests().validate().is_ok());
    }

    #[test]
    fn test_store_config_rejects_zero_chunk() {
        let config = StoreConfig::default()
            .with_dangerous_requests()
            .with_import(ImportOptions::default().with_chunk_size(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_fills_defaults() {
        let config = StoreConfig::builder()
            .allow_dangerous_requests(true)
            .max_num_threads(8)
            .build();
        assert!(config.allow_dangerous_requests);
        assert_eq!(config.max_num_threads, 8);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = StoreConfig::default().with_dangerous_requests();
        let json = serde_json::to_string(&config).unwrap();
        let back: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
