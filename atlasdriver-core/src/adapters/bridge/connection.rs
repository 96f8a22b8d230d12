//! Bridge-backed connection, cursor and statement cancellation.

use super::protocol::{
    CancelParams, CursorParams, ExecuteParams, ExecuteResult, FetchParams, FetchResult,
    GetColumnsParams, GetTablesParams, IsValidParams, method,
};
use super::session::BridgeSession;
use crate::Result;
use crate::adapters::{BackendConnection, ResultCursor, StatementCanceller};
use crate::error::{AtlasDriverError, BackendMessage};
use crate::executor::{CancelHandle, CancelSupport};
use crate::models::{ColumnMeta, RawColumn, Row, StatementRequest, TableFilter, TableMeta};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Rows requested per `fetch` round trip.
pub const FETCH_SIZE: usize = 500;

fn introspection_error(context: String, error: &AtlasDriverError) -> AtlasDriverError {
    AtlasDriverError::introspection_failed(context, BackendMessage(error.backend_message()))
}

/// A JDBC connection held open inside a bridge sidecar.
pub struct BridgeConnection {
    id: String,
    session: Arc<BridgeSession>,
    database: Option<String>,
    validation_timeout: Duration,
}

impl BridgeConnection {
    /// Wraps a session whose `connect` call has already succeeded.
    pub fn new(
        id: String,
        session: Arc<BridgeSession>,
        database: Option<String>,
        validation_timeout: Duration,
    ) -> Self {
        Self {
            id,
            session,
            database,
            validation_timeout,
        }
    }
}

#[async_trait]
impl BackendConnection for BridgeConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn ping(&self) -> Result<()> {
        let params = IsValidParams {
            timeout_seconds: self.validation_timeout.as_secs().max(1),
        };
        let valid: bool = self.session.call(method::IS_VALID, &params).await?;
        if valid {
            Ok(())
        } else {
            Err(AtlasDriverError::validation(format!(
                "bridge reported connection {} invalid",
                self.id
            )))
        }
    }

    async fn execute(
        &self,
        request: &StatementRequest,
        cancel: &CancelHandle,
    ) -> Result<Box<dyn ResultCursor>> {
        let statement_id = uuid::Uuid::new_v4().to_string();
        cancel.arm(CancelSupport::Statement(Arc::new(BridgeCanceller {
            session: Arc::clone(&self.session),
            statement_id: statement_id.clone(),
        })));

        let params = ExecuteParams {
            statement_id: &statement_id,
            sql: &request.sql,
            query_timeout: request.query_timeout.as_secs(),
        };
        let result: ExecuteResult = self.session.call(method::EXECUTE, &params).await?;
        debug!(
            connection_id = %self.id,
            statement_id = %statement_id,
            column_count = result.columns.len(),
            "Bridge statement executed"
        );

        Ok(Box::new(BridgeCursor {
            session: Arc::clone(&self.session),
            cursor_id: result.cursor_id,
            columns: result.columns,
            buffer: VecDeque::new(),
            done: false,
            closed: false,
            cancel: cancel.token().clone(),
        }))
    }

    async fn list_tables(&self, filter: &TableFilter) -> Result<Vec<TableMeta>> {
        self.session
            .call(method::GET_TABLES, &GetTablesParams::from(filter))
            .await
            .map_err(|e| introspection_error("getTables failed".to_string(), &e))
    }

    async fn list_columns(
        &self,
        database: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnMeta>> {
        let params = GetColumnsParams {
            catalog: None,
            schema_pattern: database.or(self.database.as_deref()),
            table_name_pattern: table,
            column_name_pattern: None,
        };
        self.session
            .call(method::GET_COLUMNS, &params)
            .await
            .map_err(|e| introspection_error(format!("getColumns failed for '{}'", table), &e))
    }

    async fn close(&self) -> Result<()> {
        let closed: Result<Value> = self.session.call(method::CLOSE, &Value::Null).await;
        self.session.shutdown().await;
        closed.map(|_| ())
    }
}

/// Sends `cancel` for one statement over the session that issued it.
struct BridgeCanceller {
    session: Arc<BridgeSession>,
    statement_id: String,
}

#[async_trait]
impl StatementCanceller for BridgeCanceller {
    async fn cancel(&self) -> Result<()> {
        let params = CancelParams {
            statement_id: &self.statement_id,
        };
        let _: Value = self.session.call(method::CANCEL, &params).await?;
        Ok(())
    }
}

/// Pages rows out of a sidecar-side result set.
struct BridgeCursor {
    session: Arc<BridgeSession>,
    cursor_id: String,
    columns: Vec<RawColumn>,
    buffer: VecDeque<Row>,
    done: bool,
    closed: bool,
    cancel: CancellationToken,
}

#[async_trait]
impl ResultCursor for BridgeCursor {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            if self.done || self.closed {
                return Ok(None);
            }
            if self.cancel.is_cancelled() {
                return Err(AtlasDriverError::query_failed("Query was cancelled"));
            }

            let params = FetchParams {
                cursor_id: &self.cursor_id,
                max_rows: FETCH_SIZE,
            };
            let page: FetchResult = self.session.call(method::FETCH, &params).await?;
            self.done = page.done || page.rows.is_empty();
            self.buffer.extend(page.rows);
        }
    }

    fn columns(&self) -> Vec<RawColumn> {
        self.columns.clone()
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();

        let params = CursorParams {
            cursor_id: &self.cursor_id,
        };
        let closed: Result<Value> = self.session.call(method::CLOSE_CURSOR, &params).await;
        if let Err(e) = &closed {
            warn!(cursor_id = %self.cursor_id, "Failed to close bridge cursor: {}", e);
        }
        closed.map(|_| ())
    }
}
