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

//! Logical transactions over an engine whose native support may be absent.
//!
//! A [`Transaction`] enforces its state machine and keeps an operation log
//! whether or not the engine understands `BEGIN`/`COMMIT`. When the engine
//! reports no native transactions the guarantees are logical only: rollback
//! stops further writes through the handle but cannot undo earlier ones.
//!
//! A native transaction owns the connection's transaction scope from `BEGIN`
//! until commit, rollback or drop, so concurrent handles on one store run one
//! after another. Its statements are never retried: a reconnect would drop
//! the engine-side transaction and let later writes commit on their own.
//!
//! ```text
//! Idle --begin--> Active --commit--> Committed
//!                   |  \--rollback--> RolledBack
//!                   \--failure--> Failed --rollback--> RolledBack
//! ```

use crate::config::{RetryPolicy, TransactionConfig};
use crate::connection::{Connection, TransactionClaim};
use crate::cypher::{templates, CypherStatement, StatementType};
use crate::error::{GraphStoreError, Result};
use crate::executor::Executor;
use crate::schema::SchemaManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use graphstore_core::{QueryResult, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Created, not yet begun.
    Idle,
    /// Accepting statements.
    Active,
    /// Committed. Terminal.
    Committed,
    /// Rolled back. Terminal.
    RolledBack,
    /// A statement failed; only rollback is allowed.
    Failed,
}

impl TransactionState {
    /// Committed or rolled back.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Whether `next` is a legal successor.
    pub fn can_transition_to(self, next: TransactionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Active)
                | (Self::Active, Self::Committed)
                | (Self::Active, Self::RolledBack)
                | (Self::Active, Self::Failed)
                | (Self::Failed, Self::RolledBack)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A transaction handle.
///
/// Every state-changing call takes `&mut self`. Dropping an active or failed
/// handle rolls it back.
pub struct Transaction {
    id: Uuid,
    state: TransactionState,
    transitions: Vec<TransactionState>,
    config: TransactionConfig,
    started: Instant,
    started_at: DateTime<Utc>,
    deadline: Instant,
    cancel: CancellationToken,
    operations: Vec<String>,
    native: bool,
    issued_ddl: bool,
    claim: Option<TransactionClaim>,
    connection: Arc<Connection>,
    schema: Arc<SchemaManager>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("native", &self.native)
            .field("read_only", &self.config.read_only)
            .field("operations", &self.operations.len())
            .finish()
    }
}

impl Transaction {
    pub(crate) async fn begin(
        connection: Arc<Connection>,
        schema: Arc<SchemaManager>,
        config: TransactionConfig,
        parent: &CancellationToken,
    ) -> Result<Self> {
        let cancel = parent.child_token();
        let claim = connection.claim(&cancel, config.timeout).await?;
        let started = Instant::now();
        let native = connection.capabilities().transactions;
        let mut tx = Self {
            id: Uuid::new_v4(),
            state: TransactionState::Idle,
            transitions: vec![TransactionState::Idle],
            deadline: started + config.timeout,
            started,
            started_at: Utc::now(),
            cancel,
            operations: Vec::new(),
            native,
            issued_ddl: false,
            claim,
            config,
            connection,
            schema,
        };

        if native {
            let statement = templates::begin_transaction(tx.config.read_only);
            tx.connection
                .query_with_retry(&statement, &tx.cancel, tx.statement_timeout(), tx.retry_policy())
                .await?;
        }
        tx.set_state(TransactionState::Active);
        info!(
            id = %tx.id,
            native,
            read_only = tx.config.read_only,
            "transaction started"
        );
        Ok(tx)
    }

    fn set_state(&mut self, next: TransactionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(id = %self.id, from = %self.state, to = %next, "transaction state");
        self.state = next;
        self.transitions.push(next);
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.connection
            .retry_policy()
            .with_max_retries(self.config.retries)
    }

    fn statement_timeout(&self) -> Duration {
        self.remaining().min(self.connection.default_timeout())
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn invalid(&self, operation: &'static str) -> GraphStoreError {
        GraphStoreError::InvalidTransactionState {
            id: self.id,
            state: self.state,
            operation,
        }
    }

    fn fail(&mut self, err: &GraphStoreError) {
        if self.state == TransactionState::Active {
            warn!(id = %self.id, error = %err, "transaction failed");
            self.set_state(TransactionState::Failed);
        }
    }

    /// Check cancellation and deadline, returning the statement timeout.
    fn admit(&mut self, statement: &CypherStatement, operation: &'static str) -> Result<Duration> {
        if self.state != TransactionState::Active {
            return Err(self.invalid(operation));
        }
        if self.config.read_only && statement.is_write() {
            return Err(GraphStoreError::ReadOnlyTransaction(self.id));
        }
        if self.cancel.is_cancelled() {
            let err = GraphStoreError::Cancelled;
            self.fail(&err);
            return Err(err);
        }
        let timeout = self.statement_timeout();
        if timeout.is_zero() {
            let err = GraphStoreError::Timeout(self.config.timeout);
            self.fail(&err);
            return Err(err);
        }

        self.operations.push(statement.query.clone());
        if statement.statement_type == StatementType::Schema {
            self.issued_ddl = true;
        }
        Ok(timeout)
    }

    /// Execute a statement inside the transaction.
    ///
    /// Rejected without reaching the engine unless the handle is active.
    /// Read-only handles reject writes. A failure moves the handle to
    /// [`TransactionState::Failed`].
    pub async fn query(&mut self, statement: CypherStatement) -> Result<QueryResult> {
        let timeout = self.admit(&statement, "query")?;
        let result = if self.native {
            self.connection
                .execute(&statement, &self.cancel, timeout)
                .await
        } else {
            self.connection
                .query_with_retry(&statement, &self.cancel, timeout, self.retry_policy())
                .await
        };
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    /// The one row a statement returns.
    ///
    /// Zero or several rows is an error that leaves the handle active.
    pub async fn query_single(&mut self, statement: CypherStatement) -> Result<Row> {
        let query = statement.query.clone();
        let mut rows = self.query(statement).await?.rows.into_iter();
        match (rows.next(), rows.next()) {
            (Some(row), None) => Ok(row),
            (None, _) => Err(GraphStoreError::QueryExecution {
                query,
                message: "query returned no rows".to_string(),
            }),
            (Some(_), Some(_)) => Err(GraphStoreError::QueryExecution {
                query,
                message: "query returned more than one row".to_string(),
            }),
        }
    }

    /// Execute a statement whose failure leaves the transaction active.
    pub async fn query_optional(&mut self, statement: CypherStatement) -> Option<QueryResult> {
        let timeout = match self.admit(&statement, "query") {
            Ok(timeout) => timeout,
            Err(e) => {
                debug!(id = %self.id, error = %e, "optional statement not admitted");
                return None;
            }
        };
        match self
            .connection
            .execute(&statement, &self.cancel, timeout)
            .await
        {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(
                    id = %self.id,
                    kind = ?statement.statement_type,
                    error = %e,
                    "optional statement failed"
                );
                None
            }
        }
    }

    /// Commit. Only an active handle can commit.
    pub async fn commit(&mut self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(self.invalid("commit"));
        }
        if self.cancel.is_cancelled() {
            let err = GraphStoreError::Cancelled;
            self.fail(&err);
            return Err(err);
        }

        if self.native {
            let timeout = self.connection.default_timeout();
            if let Err(e) = self
                .connection
                .execute(&templates::commit(), &self.cancel, timeout)
                .await
            {
                self.fail(&e);
                return Err(e);
            }
        }
        self.set_state(TransactionState::Committed);
        self.cancel.cancel();
        self.claim = None;
        info!(
            id = %self.id,
            operations = self.operations.len(),
            elapsed_ms = self.duration().as_millis() as u64,
            "transaction committed"
        );
        Ok(())
    }

    /// Roll back an active or failed handle.
    ///
    /// The handle ends rolled back even when the engine rollback fails; that
    /// failure is returned.
    pub async fn rollback(&mut self) -> Result<()> {
        if !matches!(self.state, TransactionState::Active | TransactionState::Failed) {
            return Err(self.invalid("rollback"));
        }

        let result = if self.native {
            self.connection
                .execute(
                    &templates::rollback(),
                    &CancellationToken::new(),
                    self.connection.default_timeout(),
                )
                .await
                .map(|_| ())
        } else {
            Ok(())
        };

        self.finish_rollback();
        info!(
            id = %self.id,
            operations = self.operations.len(),
            "transaction rolled back"
        );
        result
    }

    fn finish_rollback(&mut self) {
        self.set_state(TransactionState::RolledBack);
        self.cancel.cancel();
        self.claim = None;
        if self.issued_ddl {
            self.schema.invalidate_cache();
        }
    }

    /// Roll back unless already committed or rolled back.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Active | TransactionState::Failed => self.rollback().await,
            _ => Ok(()),
        }
    }

    /// Transaction id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Every state the handle has been in, oldest first.
    pub fn transitions(&self) -> &[TransactionState] {
        &self.transitions
    }

    /// True while statements are accepted.
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Query texts admitted so far, in order. Excludes transaction control.
    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Time since begin.
    pub fn duration(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wall-clock begin time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the engine runs this as a native transaction.
    pub fn is_native(&self) -> bool {
        self.native
    }

    /// The configuration it was begun with.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Token cancelled when the handle ends or its parent is cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !matches!(self.state, TransactionState::Active | TransactionState::Failed) {
            return;
        }
        warn!(id = %self.id, state = %self.state, "transaction dropped while open, rolling back");
        let claim = self.claim.take();
        self.finish_rollback();

        if self.native {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let connection = Arc::clone(&self.connection);
                    let id = self.id;
                    handle.spawn(async move {
                        // The scope stays claimed until the engine has rolled back.
                        let _claim = claim;
                        let statement = templates::rollback();
                        let timeout = connection.default_timeout();
                        if let Err(e) = connection
                            .execute(&statement, &CancellationToken::new(), timeout)
                            .await
                        {
                            warn!(id = %id, error = %e, "rollback of dropped transaction failed");
                        }
                    });
                }
                Err(_) => {
                    warn!(id = %self.id, "no runtime to roll back dropped transaction");
                }
            }
        }
    }
}

#[async_trait]
impl Executor for Transaction {
    async fn execute(&mut self, statement: CypherStatement) -> Result<QueryResult> {
        self.query(statement).await
    }

    async fn execute_best_effort(&mut self, statement: CypherStatement) -> Option<QueryResult> {
        self.query_optional(statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use TransactionState::*;
        assert!(Idle.can_transition_to(Active));
        assert!(Active.can_transition_to(Committed));
        assert!(Active.can_transition_to(RolledBack));
        assert!(Active.can_transition_to(Failed));
        assert!(Failed.can_transition_to(RolledBack));

        assert!(!Failed.can_transition_to(Committed));
        assert!(!Committed.can_transition_to(RolledBack));
        assert!(!RolledBack.can_transition_to(Active));
        assert!(!Idle.can_transition_to(Committed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
        assert!(!TransactionState::Failed.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransactionState::RolledBack.to_string(), "rolled back");
    }
}
