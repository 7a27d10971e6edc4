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

//! Serialized, cancellable access to the engine.
//!
//! Engine calls are synchronous. Each one runs on the blocking pool and is
//! raced against its cancellation token and deadline; whichever loses is
//! interrupted. Engines that do not report concurrent-query support are
//! driven through a single gate so at most one statement runs at a time.
//!
//! An engine with native transactions has one transaction scope per
//! connection. [`Connection::claim`] hands that scope to one owner at a time:
//! a transaction from `BEGIN` until it ends, or a caller running statements
//! outside any transaction.

use crate::config::RetryPolicy;
use crate::cypher::{templates, CypherStatement};
use crate::error::{GraphStoreError, Result};
use graphstore_core::{ColumnInfo, EngineCapabilities, GraphEngine, QueryResult, Row, TableInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Exclusive hold on a connection's transaction scope. Released on drop.
pub type TransactionClaim = OwnedMutexGuard<()>;

/// Shared handle to one engine connection.
pub struct Connection {
    engine: Arc<dyn GraphEngine>,
    gate: Arc<Mutex<()>>,
    serialized: bool,
    scope: Arc<tokio::sync::Mutex<()>>,
    native_transactions: bool,
    closed: AtomicBool,
    default_timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("serialized", &self.serialized)
            .field("native_transactions", &self.native_transactions)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Connection {
    /// Wrap an engine.
    pub fn new(engine: Arc<dyn GraphEngine>, default_timeout: Duration, retry: RetryPolicy) -> Self {
        let capabilities = engine.capabilities();
        Self {
            engine,
            gate: Arc::new(Mutex::new(())),
            serialized: !capabilities.concurrent_queries,
            scope: Arc::new(tokio::sync::Mutex::new(())),
            native_transactions: capabilities.transactions,
            closed: AtomicBool::new(false),
            default_timeout,
            retry,
        }
    }

    /// Per-statement timeout used when the caller has none.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Backoff used outside transactions.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// What the engine supports.
    pub fn capabilities(&self) -> EngineCapabilities {
        self.engine.capabilities()
    }

    /// False once [`close`](Self::close) has been called.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Refuse further statements.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("connection closed");
        }
    }

    /// Wait up to `wait` for exclusive use of the transaction scope.
    ///
    /// Returns `None` without waiting when the engine has no native
    /// transactions, since statements then never run inside another
    /// caller's transaction.
    pub async fn claim(
        &self,
        cancel: &CancellationToken,
        wait: Duration,
    ) -> Result<Option<TransactionClaim>> {
        if !self.native_transactions {
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(GraphStoreError::Cancelled);
        }
        self.ensure_open()?;

        let scope = Arc::clone(&self.scope);
        tokio::select! {
            guard = scope.lock_owned() => Ok(Some(guard)),
            _ = cancel.cancelled() => Err(GraphStoreError::Cancelled),
            _ = tokio::time::sleep(wait) => {
                warn!(?wait, "timed out waiting for the open transaction to finish");
                Err(GraphStoreError::Timeout(wait))
            }
        }
    }

    /// Ask the engine to re-establish its connection.
    pub fn reconnect(&self) -> Result<()> {
        self.ensure_open()?;
        self.engine
            .reconnect()
            .map_err(|e| GraphStoreError::from_engine(e, ""))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(GraphStoreError::Connection("connection is closed".to_string()))
        }
    }

    async fn run_blocking<T, F>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        timeout: Duration,
        op: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GraphEngine) -> Result<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(GraphStoreError::Cancelled);
        }
        self.ensure_open()?;

        let engine = Arc::clone(&self.engine);
        let gate = self.serialized.then(|| Arc::clone(&self.gate));
        let mut task = tokio::task::spawn_blocking(move || {
            let _guard = gate.as_ref().map(|g| g.lock());
            op(engine.as_ref())
        });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) => Err(GraphStoreError::QueryExecution {
                    query: what.to_string(),
                    message: format!("engine task failed: {}", e),
                }),
            },
            _ = cancel.cancelled() => {
                debug!(query = what, "cancelled, interrupting engine");
                self.engine.interrupt();
                Err(GraphStoreError::Cancelled)
            }
            _ = tokio::time::sleep(timeout) => {
                warn!(query = what, ?timeout, "statement timed out, interrupting engine");
                self.engine.interrupt();
                Err(GraphStoreError::Timeout(timeout))
            }
        }
    }

    /// Execute one statement.
    pub async fn execute(
        &self,
        statement: &CypherStatement,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<QueryResult> {
        trace!(statement = %statement.render_inline(), "executing");
        let query = statement.query.clone();
        let params = statement.parameters.clone();
        let started = Instant::now();

        let result = self
            .run_blocking(&statement.query, cancel, timeout, move |engine| {
                engine
                    .execute(&query, &params)
                    .map_err(|e| GraphStoreError::from_engine(e, &query))
            })
            .await;

        match &result {
            Ok(r) => debug!(
                kind = ?statement.statement_type,
                rows = r.row_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "statement executed"
            ),
            Err(e) => debug!(kind = ?statement.statement_type, error = %e, "statement failed"),
        }
        result
    }

    /// Execute, reconnecting and retrying connection-class failures.
    pub async fn query_with_retry(
        &self,
        statement: &CypherStatement,
        cancel: &CancellationToken,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<QueryResult> {
        let mut attempt = 0;
        loop {
            match self.execute(statement, cancel, timeout).await {
                Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                    let delay = retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = retry.max_retries,
                        ?delay,
                        error = %err,
                        "connection failure, reconnecting"
                    );
                    if let Err(e) = self.reconnect() {
                        warn!(error = %e, "reconnect failed");
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(GraphStoreError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    /// First row of the result, or an error when there is none.
    pub async fn query_single(
        &self,
        statement: &CypherStatement,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<Row> {
        let result = self.execute(statement, cancel, timeout).await?;
        result
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| GraphStoreError::QueryExecution {
                query: statement.query.clone(),
                message: "query returned no rows".to_string(),
            })
    }

    /// The single non-negative integer a counting query returns.
    pub async fn query_count(
        &self,
        statement: &CypherStatement,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<u64> {
        let row = self.query_single(statement, cancel, timeout).await?;
        row.values()
            .next()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| GraphStoreError::QueryExecution {
                query: statement.query.clone(),
                message: "query did not return a count".to_string(),
            })
    }

    /// Run the liveness check.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<()> {
        let statement = templates::health_check();
        let row = self
            .query_single(&statement, cancel, self.default_timeout)
            .await?;
        match row.get("health_check").and_then(|v| v.as_i64()) {
            Some(1) => Ok(()),
            _ => Err(GraphStoreError::Connection(
                "health check returned an unexpected value".to_string(),
            )),
        }
    }

    /// Tables in the engine catalog.
    pub async fn list_tables(&self, cancel: &CancellationToken) -> Result<Vec<TableInfo>> {
        self.run_blocking("CALL show_tables()", cancel, self.default_timeout, |engine| {
            engine
                .list_tables()
                .map_err(|e| GraphStoreError::from_engine(e, "CALL show_tables()"))
        })
        .await
    }

    /// Columns of one table.
    pub async fn table_properties(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ColumnInfo>> {
        let owned = table.to_string();
        let what = format!("CALL table_info('{}')", table);
        let query = what.clone();
        self.run_blocking(&what, cancel, self.default_timeout, move |engine| {
            engine
                .table_properties(&owned)
                .map_err(|e| GraphStoreError::from_engine(e, &query))
        })
        .await
    }

    pub(crate) fn set_max_threads(&self, threads: usize) {
        self.engine.set_max_threads(threads);
    }

    pub(crate) fn set_timeout(&self, timeout: Duration) {
        self.engine.set_timeout(timeout);
    }
}
