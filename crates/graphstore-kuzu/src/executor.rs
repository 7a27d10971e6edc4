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

//! The seam through which import and schema writes reach the engine.
//!
//! Outside a transaction statements go straight to the [`Connection`] with
//! retry; inside one they go through the [`Transaction`](crate::Transaction)
//! handle so its state machine and operation log see every write.
//!
//! A [`DirectExecutor`] claims the connection's transaction scope before its
//! first statement (or on construction, through [`DirectExecutor::acquire`])
//! and keeps it until dropped, so its writes never land inside, or get rolled
//! back with, another caller's open transaction.

use crate::config::RetryPolicy;
use crate::connection::{Connection, TransactionClaim};
use crate::cypher::CypherStatement;
use crate::error::Result;
use async_trait::async_trait;
use graphstore_core::QueryResult;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Executes statements on behalf of the import pipeline.
#[async_trait]
pub trait Executor: Send {
    /// Execute a statement whose failure aborts the caller.
    async fn execute(&mut self, statement: CypherStatement) -> Result<QueryResult>;

    /// Execute a statement whose failure is logged and ignored.
    async fn execute_best_effort(&mut self, statement: CypherStatement) -> Option<QueryResult>;
}

/// Non-transactional executor.
#[derive(Debug)]
pub struct DirectExecutor<'a> {
    connection: &'a Connection,
    cancel: CancellationToken,
    timeout: Duration,
    retry: RetryPolicy,
    claimed: bool,
    claim: Option<TransactionClaim>,
}

impl<'a> DirectExecutor<'a> {
    /// Execute through `connection` with its default timeout and retry policy.
    pub fn new(connection: &'a Connection, cancel: CancellationToken) -> Self {
        Self {
            connection,
            cancel,
            timeout: connection.default_timeout(),
            retry: connection.retry_policy(),
            claimed: false,
            claim: None,
        }
    }

    /// Like [`new`](Self::new), but claims the transaction scope up front.
    ///
    /// Callers that touch the schema cache before their first statement use
    /// this, so they never hold a cache lock while waiting for the scope.
    pub async fn acquire(connection: &'a Connection, cancel: CancellationToken) -> Result<Self> {
        let mut exec = Self::new(connection, cancel);
        exec.claim().await?;
        Ok(exec)
    }

    async fn claim(&mut self) -> Result<()> {
        if !self.claimed {
            self.claim = self.connection.claim(&self.cancel, self.timeout).await?;
            self.claimed = true;
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> Executor for DirectExecutor<'a> {
    async fn execute(&mut self, statement: CypherStatement) -> Result<QueryResult> {
        self.claim().await?;
        self.connection
            .query_with_retry(&statement, &self.cancel, self.timeout, self.retry)
            .await
    }

    async fn execute_best_effort(&mut self, statement: CypherStatement) -> Option<QueryResult> {
        let result = match self.claim().await {
            Ok(()) => {
                self.connection
                    .execute(&statement, &self.cancel, self.timeout)
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(
                    kind = ?statement.statement_type,
                    error = %e,
                    "best-effort statement failed"
                );
                None
            }
        }
    }
}
