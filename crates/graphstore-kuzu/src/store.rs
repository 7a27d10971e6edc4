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

//! The [`KuzuGraphStore`] facade.

use crate::config::{ImportOptions, StoreConfig, TransactionConfig};
use crate::connection::{Connection, TransactionClaim};
use crate::cypher::CypherStatement;
use crate::error::{GraphStoreError, Result};
use crate::executor::DirectExecutor;
use crate::import::{self, ImportPipeline, ImportReport, ImportStatistics};
use crate::mapping::{EngineType, PropertyConverter, TypeConverter};
use crate::schema::{SchemaManager, SchemaSnapshot};
use crate::transaction::Transaction;
use futures::future::BoxFuture;
use graphstore_core::{GraphDocument, GraphEngine, Node, QueryResult, Relationship, Row, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Graph document store over an embedded Kuzu-style engine.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use graphstore_core::{GraphDocument, GraphEngine, Node, Relationship, SourceDocument};
/// use graphstore_kuzu::{KuzuGraphStore, StoreConfig};
///
/// async fn load(engine: Arc<dyn GraphEngine>) -> graphstore_kuzu::Result<()> {
///     let store = KuzuGraphStore::new(engine, StoreConfig::new().with_dangerous_requests())?;
///
///     let alice = Node::new("alice", "Person");
///     let bob = Node::new("bob", "Person");
///     let doc = GraphDocument::new(SourceDocument::new("Alice knows Bob."))
///         .with_node(alice.clone())
///         .with_node(bob.clone())
///         .with_relationship(Relationship::new(alice, "KNOWS", bob));
///
///     store.add_graph_documents(&[doc]).await?;
///     println!("{}", store.schema().await?);
///     Ok(())
/// }
/// ```
pub struct KuzuGraphStore {
    config: StoreConfig,
    connection: Arc<Connection>,
    schema: Arc<SchemaManager>,
    properties: PropertyConverter,
    statistics: Mutex<ImportStatistics>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for KuzuGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KuzuGraphStore")
            .field("connection", &self.connection)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KuzuGraphStore {
    /// Open a store over `engine`.
    ///
    /// Fails with a configuration error unless `allow_dangerous_requests` is
    /// set.
    pub fn new(engine: Arc<dyn GraphEngine>, config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let connection = Arc::new(Connection::new(engine, config.query_timeout, config.retry));
        connection.set_max_threads(config.max_num_threads);
        connection.set_timeout(config.query_timeout);

        let schema = Arc::new(SchemaManager::new(Arc::clone(&connection)));
        let properties = PropertyConverter::new(TypeConverter::new(config.converter.clone()));

        info!(
            threads = config.max_num_threads,
            timeout_ms = config.query_timeout.as_millis() as u64,
            "graph store opened"
        );
        Ok(Self {
            config,
            connection,
            schema,
            properties,
            statistics: Mutex::new(ImportStatistics::default()),
            cancel: CancellationToken::new(),
        })
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The schema manager.
    pub fn schema_manager(&self) -> &SchemaManager {
        &self.schema
    }

    // --- Import ---------------------------------------------------------

    /// Import one document without a transaction.
    ///
    /// On an engine with native transactions this waits, up to the query
    /// timeout, for any open transaction to end first.
    pub async fn add_graph_document(&self, document: &GraphDocument) -> Result<ImportReport> {
        let mut exec = DirectExecutor::acquire(&self.connection, self.cancel.child_token()).await?;
        let pipeline = ImportPipeline::new(&self.schema, &self.properties, &self.config.import);
        let report = pipeline
            .import(std::slice::from_ref(document), &mut exec)
            .await?;
        self.statistics.lock().record(&report);
        Ok(report)
    }

    /// Import documents inside one transaction with the store's import
    /// options.
    pub async fn add_graph_documents(&self, documents: &[GraphDocument]) -> Result<ImportReport> {
        self.add_graph_documents_with_options(documents, &self.config.import)
            .await
    }

    /// Import documents inside one transaction.
    pub async fn add_graph_documents_with_options(
        &self,
        documents: &[GraphDocument],
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let config = TransactionConfig::new().with_timeout(self.config.query_timeout);
        let mut tx = self.begin_transaction(config).await?;
        let result = self.import_into(&mut tx, documents, options).await;
        finish(&mut tx, result).await
    }

    /// Import documents through a caller-owned transaction.
    ///
    /// The transaction is neither committed nor rolled back here.
    pub async fn add_graph_documents_with_transaction(
        &self,
        tx: &mut Transaction,
        documents: &[GraphDocument],
    ) -> Result<ImportReport> {
        self.import_into(tx, documents, &self.config.import).await
    }

    async fn import_into(
        &self,
        tx: &mut Transaction,
        documents: &[GraphDocument],
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let pipeline = ImportPipeline::new(&self.schema, &self.properties, options);
        let report = pipeline.import(documents, tx).await?;
        self.statistics.lock().record(&report);
        Ok(report)
    }

    /// Totals across every import so far.
    pub fn import_statistics(&self) -> ImportStatistics {
        self.statistics.lock().clone()
    }

    /// First node per id, order preserved.
    pub fn deduplicate_nodes(&self, nodes: &[Node]) -> Vec<Node> {
        import::deduplicate_nodes(nodes)
    }

    /// First relationship per endpoint triple and ids, order preserved.
    pub fn deduplicate_relationships(&self, relationships: &[Relationship]) -> Vec<Relationship> {
        import::deduplicate_relationships(relationships)
    }

    // --- Transactions ---------------------------------------------------

    /// Begin a transaction cancelled when the store closes.
    ///
    /// On an engine with native transactions only one transaction is open at
    /// a time; this waits, up to the transaction timeout, for the current one
    /// to end.
    pub async fn begin_transaction(&self, config: TransactionConfig) -> Result<Transaction> {
        self.begin_transaction_with_cancel(config, &self.cancel).await
    }

    /// Begin a transaction cancelled with `cancel`.
    pub async fn begin_transaction_with_cancel(
        &self,
        config: TransactionConfig,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        if !self.connection.is_connected() {
            return Err(GraphStoreError::Connection("store is closed".to_string()));
        }
        Transaction::begin(
            Arc::clone(&self.connection),
            Arc::clone(&self.schema),
            config,
            cancel,
        )
        .await
    }

    /// Run `f` in a transaction: commit on success, roll back on error.
    ///
    /// When the rollback fails too the error carries both failures.
    ///
    /// ```no_run
    /// # use graphstore_kuzu::{KuzuGraphStore, TransactionConfig, CypherStatement};
    /// # async fn example(store: &KuzuGraphStore) -> graphstore_kuzu::Result<()> {
    /// let rows = store
    ///     .run_in_transaction(TransactionConfig::new(), |tx| {
    ///         Box::pin(async move {
    ///             let result = tx.query(CypherStatement::query("MATCH (n) RETURN n")).await?;
    ///             Ok(result.row_count())
    ///         })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_in_transaction<T, F>(&self, config: TransactionConfig, f: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T>> + Send,
    {
        let mut tx = self.begin_transaction(config).await?;
        let result = f(&mut tx).await;
        finish(&mut tx, result).await
    }

    // --- Schema ---------------------------------------------------------

    /// Re-read the schema from the engine.
    pub async fn refresh_schema(&self) -> Result<SchemaSnapshot> {
        self.schema.refresh_schema(&self.cancel).await
    }

    /// Human-readable schema.
    pub async fn schema(&self) -> Result<String> {
        self.schema.schema(&self.cancel).await
    }

    /// Structured schema.
    pub async fn structured_schema(&self) -> Result<SchemaSnapshot> {
        self.schema.structured_schema(&self.cancel).await
    }

    /// Schema fingerprint.
    pub async fn schema_version(&self) -> Result<String> {
        self.schema.schema_version(&self.cancel).await
    }

    /// Whether the engine schema changed since it was last cached.
    pub async fn schema_changed(&self) -> Result<bool> {
        self.schema.schema_changed(&self.cancel).await
    }

    /// Check every table answers a count query.
    pub async fn validate_schema(&self) -> Result<usize> {
        self.schema.validate_schema(&self.cancel).await
    }

    // --- Queries --------------------------------------------------------
    //
    // Statements here run outside any transaction, so each one first waits
    // for an open native transaction to end.

    async fn claim(&self) -> Result<Option<TransactionClaim>> {
        self.connection
            .claim(&self.cancel, self.config.query_timeout)
            .await
    }

    /// Execute a statement.
    pub async fn query(&self, statement: CypherStatement) -> Result<QueryResult> {
        let _claim = self.claim().await?;
        self.connection
            .execute(&statement, &self.cancel, self.config.query_timeout)
            .await
    }

    /// Execute a statement, retrying connection failures with backoff.
    pub async fn query_with_retry(&self, statement: CypherStatement) -> Result<QueryResult> {
        let _claim = self.claim().await?;
        self.connection
            .query_with_retry(
                &statement,
                &self.cancel,
                self.config.query_timeout,
                self.config.retry,
            )
            .await
    }

    /// First row of the result.
    pub async fn query_single(&self, statement: CypherStatement) -> Result<Row> {
        let _claim = self.claim().await?;
        self.connection
            .query_single(&statement, &self.cancel, self.config.query_timeout)
            .await
    }

    /// The count a counting query returns.
    pub async fn query_count(&self, statement: CypherStatement) -> Result<u64> {
        let _claim = self.claim().await?;
        self.connection
            .query_count(&statement, &self.cancel, self.config.query_timeout)
            .await
    }

    /// Execute and convert every column back to host values.
    ///
    /// Columns missing from `types` are converted by inference.
    pub async fn query_typed(
        &self,
        statement: CypherStatement,
        types: &BTreeMap<String, EngineType>,
    ) -> Result<Vec<BTreeMap<String, Value>>> {
        let result = self.query(statement).await?;
        let converter = self.properties.type_converter();
        result
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, value)| {
                        let declared = types.get(column).copied().unwrap_or(EngineType::Any);
                        converter
                            .from_engine_value(value, declared)
                            .map(|converted| (column.clone(), converted))
                            .map_err(|e| GraphStoreError::conversion(format!("column '{}'", column), e))
                    })
                    .collect()
            })
            .collect()
    }

    // --- Connection -----------------------------------------------------

    /// Probe the engine.
    pub async fn health_check(&self) -> Result<()> {
        self.connection.health_check(&self.cancel).await
    }

    /// False after [`close`](Self::close).
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Ask the engine to reconnect and drop cached schema.
    pub fn reconnect(&self) -> Result<()> {
        self.connection.reconnect()?;
        self.schema.invalidate_cache();
        Ok(())
    }

    /// Cancel in-flight work and refuse further statements.
    pub fn close(&self) {
        self.cancel.cancel();
        self.connection.close();
        info!("graph store closed");
    }

    // --- Conversion -----------------------------------------------------

    /// Check that every property converts under the store's converter.
    pub fn validate_properties(&self, properties: &BTreeMap<String, Value>) -> Result<()> {
        self.properties
            .validate_property_types(properties)
            .map_err(|e| GraphStoreError::conversion("properties", e))
    }

    /// The store's type converter.
    pub fn type_converter(&self) -> &TypeConverter {
        self.properties.type_converter()
    }

    /// The store's property converter.
    pub fn property_converter(&self) -> &PropertyConverter {
        &self.properties
    }
}

/// Commit on success; roll back on failure, combining both errors when the
/// rollback fails too.
async fn finish<T>(tx: &mut Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => match tx.commit().await {
            Ok(()) => Ok(value),
            Err(commit) => match tx.close().await {
                Ok(()) => Err(commit),
                Err(rollback) => Err(GraphStoreError::RollbackFailed {
                    source: Box::new(commit),
                    rollback: Box::new(rollback),
                }),
            },
        },
        Err(err) => match tx.close().await {
            Ok(()) => Err(err),
            Err(rollback) => {
                warn!(id = %tx.id(), error = %rollback, "rollback failed");
                Err(GraphStoreError::RollbackFailed {
                    source: Box::new(err),
                    rollback: Box::new(rollback),
                })
            }
        },
    }
}
