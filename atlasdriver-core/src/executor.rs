//! Statement execution and cooperative cancellation.
//!
//! A [`CancelHandle`] is handed to the backend together with the statement.
//! The backend arms it with the cancellation route it supports once the
//! statement is issued; callers may cancel at any time, including before
//! the statement is issued and after it has completed.

use crate::Result;
use crate::adapters::{BackendConnection, ResultCursor, StatementCanceller};
use crate::error::AtlasDriverError;
use crate::models::StatementRequest;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How an in-flight statement can be stopped.
#[derive(Clone)]
pub enum CancelSupport {
    /// The backend watches the handle's token and abandons the call itself
    Cooperative,
    /// The backend exposes an explicit cancel call for the statement
    Statement(Arc<dyn StatementCanceller>),
    /// The in-flight call cannot be interrupted.
    ///
    /// The bundled backends never arm this (wire is cooperative, bridge
    /// sends a statement cancel); it is for custom
    /// [`BackendConnection`] implementations whose calls cannot be stopped.
    Unsupported(String),
}

impl std::fmt::Debug for CancelSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cooperative => f.write_str("Cooperative"),
            Self::Statement(_) => f.write_str("Statement"),
            Self::Unsupported(reason) => f.debug_tuple("Unsupported").field(reason).finish(),
        }
    }
}

#[derive(Debug)]
enum CancelState {
    Pending,
    Armed(CancelSupport),
    Finished,
}

#[derive(Debug)]
struct CancelInner {
    token: CancellationToken,
    state: Mutex<CancelState>,
}

/// Caller-side handle for cancelling one query.
///
/// Cloning shares the handle. `cancel` is idempotent and a no-op once the
/// query has finished.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a handle for a query that has not been issued yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                token: CancellationToken::new(),
                state: Mutex::new(CancelState::Pending),
            }),
        }
    }

    /// Token fired on cancellation; cooperative backends select on it.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Whether the query has completed, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(*self.lock(), CancelState::Finished)
    }

    /// Registers the cancellation route for the statement now in flight.
    pub fn arm(&self, support: CancelSupport) {
        let mut state = self.lock();
        if matches!(*state, CancelState::Pending | CancelState::Armed(_)) {
            *state = CancelState::Armed(support);
        }
    }

    /// Requests cancellation.
    ///
    /// Before the statement is issued the request is recorded and the query
    /// never reaches the backend. After completion this does nothing.
    ///
    /// # Errors
    /// Returns `NotCancelable` when the in-flight call cannot be interrupted,
    /// or the backend's error when its cancel call fails
    pub async fn cancel(&self) -> Result<()> {
        let canceller = {
            let state = self.lock();
            match &*state {
                CancelState::Finished => return Ok(()),
                CancelState::Armed(CancelSupport::Unsupported(reason)) => {
                    return Err(AtlasDriverError::not_cancelable(reason.clone()));
                }
                _ if self.inner.token.is_cancelled() => return Ok(()),
                CancelState::Pending | CancelState::Armed(CancelSupport::Cooperative) => None,
                CancelState::Armed(CancelSupport::Statement(canceller)) => Some(canceller.clone()),
            }
        };

        self.inner.token.cancel();
        if let Some(canceller) = canceller {
            canceller.cancel().await?;
        }
        debug!("Query cancellation requested");
        Ok(())
    }

    /// Marks the query complete; later `cancel` calls become no-ops.
    pub(crate) fn finish(&self) {
        *self.lock() = CancelState::Finished;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CancelState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Issues statements on a borrowed connection.
///
/// The executor never owns the connection; the caller acquires it before
/// `execute` and releases it after the returned cursor has been drained.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    query_timeout: Duration,
}

impl QueryExecutor {
    /// Creates an executor applying `query_timeout` to every statement.
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Server-side timeout applied to statements.
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Executes `sql` and returns its cursor.
    ///
    /// # Errors
    /// Returns `QueryExecution` when the backend rejects the statement or the
    /// query was cancelled before it could be issued
    pub async fn execute(
        &self,
        connection: &dyn BackendConnection,
        sql: &str,
        cancel: &CancelHandle,
    ) -> Result<Box<dyn ResultCursor>> {
        if cancel.is_cancelled() {
            cancel.finish();
            return Err(AtlasDriverError::query_failed(
                "Query was cancelled before execution",
            ));
        }

        let request = StatementRequest {
            sql: sql.to_string(),
            query_timeout: self.query_timeout,
        };
        let started = Instant::now();
        debug!(connection_id = %connection.id(), "Executing statement");

        match connection.execute(&request, cancel).await {
            Ok(cursor) => {
                debug!(
                    connection_id = %connection.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Statement executed"
                );
                Ok(cursor)
            }
            Err(e) => {
                cancel.finish();
                warn!(
                    connection_id = %connection.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Statement failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}
