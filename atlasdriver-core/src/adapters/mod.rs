//! Backend capability traits and factory selection.
//!
//! Two client strategies satisfy the same contract and are chosen once, at
//! driver construction:
//! - `wire`: the official MongoDB client issuing `$sql` aggregations
//! - `bridge`: a JDBC bridge sidecar process spoken to over stdio
//!
//! # Object Safety
//! Every trait here is object-safe; the pool and driver only ever see
//! `Arc<dyn ConnectionFactory>` and `Box<dyn BackendConnection>`.

use crate::Result;
use crate::config::{BackendKind, DriverConfig};
use crate::error::AtlasDriverError;
use crate::executor::CancelHandle;
use crate::models::{
    ColumnMeta, GenericType, RawColumn, Row, StatementRequest, TableFilter, TableMeta,
};
use async_trait::async_trait;
use std::sync::Arc;

pub mod bridge;
pub mod wire;

/// Creates, validates and destroys physical connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Opens one physical connection, ready for use.
    ///
    /// # Errors
    /// Returns `ConnectionCreate` when the backend is unreachable or rejects
    /// the session
    async fn create(&self) -> Result<Box<dyn BackendConnection>>;

    /// Closes a physical connection. Callers treat failures as best effort.
    async fn destroy(&self, connection: Box<dyn BackendConnection>) -> Result<()> {
        connection.close().await
    }

    /// Lightweight health probe; `false` marks the connection unhealthy.
    async fn validate(&self, connection: &dyn BackendConnection) -> bool {
        connection.ping().await.is_ok()
    }

    /// Backend this factory builds connections for.
    fn kind(&self) -> BackendKind;
}

/// One live backend session.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// Identifier used in log fields.
    fn id(&self) -> &str;

    /// Round trip to the backend.
    async fn ping(&self) -> Result<()>;

    /// Issues a statement and returns a cursor over its rows.
    ///
    /// Implementations arm `cancel` with the route they support before
    /// awaiting the backend.
    async fn execute(
        &self,
        request: &StatementRequest,
        cancel: &CancelHandle,
    ) -> Result<Box<dyn ResultCursor>>;

    /// Table metadata matching the filter.
    async fn list_tables(&self, filter: &TableFilter) -> Result<Vec<TableMeta>>;

    /// Column metadata for one table; `database` of `None` means the
    /// connection's default database.
    async fn list_columns(&self, database: Option<&str>, table: &str)
    -> Result<Vec<ColumnMeta>>;

    /// Ends the session.
    async fn close(&self) -> Result<()>;
}

/// Streaming handle over the rows of one statement.
///
/// A cursor must be drained or closed before its connection goes back to
/// the pool.
#[async_trait]
pub trait ResultCursor: Send {
    /// Next row, or `None` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Column metadata in result-set order. Backends that learn columns from
    /// the rows themselves report the complete list once drained.
    fn columns(&self) -> Vec<RawColumn>;

    /// Releases backend resources held by the cursor.
    async fn close(&mut self) -> Result<()>;
}

/// Explicit cancel route for an in-flight statement.
#[async_trait]
pub trait StatementCanceller: Send + Sync {
    /// Asks the backend to stop the statement.
    async fn cancel(&self) -> Result<()>;
}

/// Builds the factory for the configured backend.
///
/// # Errors
/// Returns `UnsupportedFeature` when the backend was not compiled in
pub fn create_factory(config: Arc<DriverConfig>) -> Result<Arc<dyn ConnectionFactory>> {
    match config.backend {
        #[cfg(feature = "wire")]
        BackendKind::Wire => Ok(Arc::new(wire::WireClientFactory::new(config))),
        #[cfg(not(feature = "wire"))]
        BackendKind::Wire => Err(AtlasDriverError::unsupported_feature(
            "Compile with --features wire to enable it",
            "wire",
        )),
        #[cfg(feature = "bridge")]
        BackendKind::Bridge => Ok(Arc::new(bridge::BridgeClientFactory::new(config))),
        #[cfg(not(feature = "bridge"))]
        BackendKind::Bridge => Err(AtlasDriverError::unsupported_feature(
            "Compile with --features bridge to enable it",
            "bridge",
        )),
    }
}

/// Classifies a backend type name into a [`GenericType`].
///
/// Missing names, `"null"` and unrecognised names are `Text`.
pub fn to_generic_type(kind: BackendKind, type_name: Option<&str>) -> GenericType {
    let Some(name) = type_name else {
        return GenericType::Text;
    };
    let name = name.trim().to_lowercase();
    if name.is_empty() || name == "null" {
        return GenericType::Text;
    }
    let mapped = match kind {
        BackendKind::Wire => wire::type_mapping::classify(&name),
        BackendKind::Bridge => bridge::type_mapping::classify(&name),
    };
    mapped.unwrap_or(GenericType::Text)
}

/// SQL `LIKE` matching with `%` and `_` wildcards, as metadata filters use.
pub(crate) fn like_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '_' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}

/// Runs the configured setup statements on a freshly created connection.
///
/// Each cursor is drained and closed before the next statement runs.
///
/// # Errors
/// Returns the first statement's failure wrapped as `ConnectionCreate`
pub(crate) async fn prepare_connection(
    connection: &dyn BackendConnection,
    queries: &[String],
    query_timeout: std::time::Duration,
) -> Result<()> {
    for sql in queries {
        let request = StatementRequest {
            sql: sql.clone(),
            query_timeout,
        };
        let cancel = CancelHandle::new();
        let run = async {
            let mut cursor = connection.execute(&request, &cancel).await?;
            let drained = async {
                while cursor.next_row().await?.is_some() {}
                Ok::<_, AtlasDriverError>(())
            }
            .await;
            let closed = cursor.close().await;
            drained.and(closed)
        };
        run.await.map_err(|e| {
            AtlasDriverError::connection_create(
                format!("Connection setup statement failed on {}", connection.id()),
                e,
            )
        })?;
        cancel.finish();
    }
    Ok(())
}
