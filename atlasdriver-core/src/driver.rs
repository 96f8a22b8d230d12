//! The driver façade.
//!
//! [`AtlasDriver`] ties the pool, executor, normalizer and introspector
//! together. Every operation borrows exactly one pooled connection and
//! returns it exactly once, whether the operation succeeds or not.

use crate::Result;
use crate::adapters::{ConnectionFactory, ResultCursor, create_factory};
use crate::config::DriverConfig;
use crate::error::AtlasDriverError;
use crate::executor::{CancelHandle, QueryExecutor};
use crate::introspection::SchemaIntrospector;
use crate::models::{
    ColumnDescriptor, DownloadOptions, DownloadResult, Row, SchemaMap, TableName,
};
use crate::normalizer::ResultNormalizer;
use crate::params::bind_params;
use crate::pool::{ConnectionPool, PoolStatus, PooledConnection};
use futures::stream::{self, BoxStream};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lazily produced, finite rows of one query. Not restartable.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Pooled Atlas SQL driver.
///
/// # Example
/// ```rust,no_run
/// # async fn demo() -> atlasdriver_core::Result<()> {
/// use atlasdriver_core::config::DriverConfig;
/// use atlasdriver_core::driver::AtlasDriver;
/// use serde_json::json;
///
/// let config = DriverConfig::builder()
///     .url("mongodb://cluster0.example.net/?ssl=true")
///     .database("sales")
///     .build()?;
/// let driver = AtlasDriver::new(config)?;
///
/// let rows = driver
///     .query("SELECT * FROM orders WHERE status = ?", &[json!("shipped")])
///     .await?;
/// println!("{} rows", rows.len());
///
/// driver.release().await?;
/// # Ok(())
/// # }
/// ```
pub struct AtlasDriver {
    id: String,
    config: Arc<DriverConfig>,
    factory: Arc<dyn ConnectionFactory>,
    pool: Arc<ConnectionPool>,
    executor: QueryExecutor,
    normalizer: ResultNormalizer,
    introspector: SchemaIntrospector,
    released: AtomicBool,
}

impl AtlasDriver {
    /// Builds a driver for the configured backend.
    ///
    /// # Errors
    /// Returns `Configuration` when the URL is empty or the pool options are
    /// unusable, and `UnsupportedFeature` when the backend was not compiled in
    pub fn new(config: DriverConfig) -> Result<Self> {
        ensure_url(&config)?;
        let config = Arc::new(config);
        let factory = create_factory(Arc::clone(&config))?;
        Self::assemble(config, factory)
    }

    /// Builds a driver over a caller-supplied connection factory.
    ///
    /// # Errors
    /// Returns `Configuration` when the URL is empty or the pool options are
    /// unusable
    pub fn with_factory(config: DriverConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        ensure_url(&config)?;
        Self::assemble(Arc::new(config), factory)
    }

    fn assemble(config: Arc<DriverConfig>, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        let pool = ConnectionPool::new(
            Arc::clone(&factory),
            config.pool.clone(),
            config.test_connection_timeout,
        )?;
        let kind = factory.kind();
        let id = uuid::Uuid::new_v4().to_string();

        info!(driver_id = %id, "Creating driver for {}", config);

        Ok(Self {
            id,
            executor: QueryExecutor::new(config.query_timeout),
            normalizer: ResultNormalizer::new(kind),
            introspector: SchemaIntrospector::new(kind, config.database.clone()),
            config,
            factory,
            pool: Arc::new(pool),
            released: AtomicBool::new(false),
        })
    }

    /// Per-driver identifier used in log fields.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configuration the driver was built with.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The driver never writes.
    pub fn read_only(&self) -> bool {
        true
    }

    /// Opens and closes one connection outside the pool.
    ///
    /// # Errors
    /// Returns the creation error unchanged
    pub async fn test_connection(&self) -> Result<()> {
        self.ensure_ready()?;
        let connection = self.factory.create().await?;
        if let Err(e) = self.factory.destroy(connection).await {
            warn!(driver_id = %self.id, "Failed to close test connection: {}", e);
        }
        debug!(driver_id = %self.id, "Test connection succeeded");
        Ok(())
    }

    /// Runs `sql` with `params` inlined and returns every row.
    ///
    /// # Errors
    /// - `PoolExhausted`/`ConnectionCreate` when no connection is available
    /// - `QueryExecution` when the backend rejects or fails the query
    /// - `DriverReleased` after [`release`](Self::release)
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let cancel = CancelHandle::new();
        self.query_with_cancel(sql, params, &cancel).await
    }

    /// Same as [`query`](Self::query), cancellable through `cancel`.
    ///
    /// # Errors
    /// As [`query`](Self::query); a cancelled query fails with
    /// `QueryExecution`
    pub async fn query_with_cancel(
        &self,
        sql: &str,
        params: &[Value],
        cancel: &CancelHandle,
    ) -> Result<Vec<Row>> {
        let (rows, _) = self.run(sql, params, cancel, 0).await?;
        Ok(rows)
    }

    /// Runs a query and returns its rows with their column types.
    ///
    /// # Errors
    /// As [`query`](Self::query)
    pub async fn download_query_results(
        &self,
        sql: &str,
        params: &[Value],
        options: DownloadOptions,
    ) -> Result<DownloadResult> {
        let cancel = CancelHandle::new();
        let capacity = options.high_water_mark.unwrap_or(0);
        let (rows, types) = self.run(sql, params, &cancel, capacity).await?;
        Ok(DownloadResult { rows, types })
    }

    async fn run(
        &self,
        sql: &str,
        params: &[Value],
        cancel: &CancelHandle,
        capacity: usize,
    ) -> Result<(Vec<Row>, Vec<ColumnDescriptor>)> {
        self.ensure_ready()?;
        let sql = bind_params(sql, params);
        let started = Instant::now();

        let connection = match self.pool.acquire().await {
            Ok(connection) => connection,
            Err(e) => {
                cancel.finish();
                return Err(e);
            }
        };
        let result = async {
            let cursor = self.executor.execute(&*connection, &sql, cancel).await?;
            self.normalizer.drain(cursor, cancel, capacity).await
        }
        .await;
        cancel.finish();
        self.pool.release(connection).await;

        if let Ok((rows, _)) = &result {
            debug!(
                driver_id = %self.id,
                row_count = rows.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Query finished"
            );
        }
        result
    }

    /// Runs a query and yields its rows as they are read.
    ///
    /// The stream holds one pooled connection until it is exhausted, fails
    /// or is dropped, and returns it exactly once.
    ///
    /// # Errors
    /// Returns errors raised before the first row: acquisition and
    /// execution failures
    pub async fn stream_query(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        self.ensure_ready()?;
        let sql = bind_params(sql, params);
        let cancel = CancelHandle::new();

        let connection = self.pool.acquire().await?;
        let cursor = match self.executor.execute(&*connection, &sql, &cancel).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.pool.release(connection).await;
                return Err(e);
            }
        };

        let state = StreamState {
            pool: Arc::clone(&self.pool),
            connection: Some(connection),
            cursor: Some(cursor),
            cancel,
        };
        Ok(Box::pin(stream::unfold(state, |mut state| async move {
            let next = state.cursor.as_mut()?.next_row().await;
            match next {
                Ok(Some(row)) => Some((Ok(row), state)),
                Ok(None) => {
                    state.finish().await;
                    None
                }
                Err(e) => {
                    state.finish().await;
                    Some((Err(e), state))
                }
            }
        })))
    }

    /// Column names and generic types of `db.table` (or an unqualified
    /// table in the configured database).
    ///
    /// # Errors
    /// Returns `Introspection` when the metadata call fails
    pub async fn table_column_types(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        self.ensure_ready()?;
        let connection = self.pool.acquire().await?;
        let result = self.introspector.list_columns_of(&*connection, table).await;
        self.pool.release(connection).await;
        result
    }

    /// Every base table of the configured database with its columns.
    ///
    /// # Errors
    /// Returns the first failing metadata call's error
    pub async fn tables_schema(&self) -> Result<SchemaMap> {
        self.ensure_ready()?;
        let connection = self.pool.acquire().await?;
        let result = self.introspector.list_all_schemas(&*connection).await;
        self.pool.release(connection).await;
        result
    }

    /// Base table names of `database`.
    ///
    /// # Errors
    /// Returns `Introspection` when the metadata call fails
    pub async fn tables_query(&self, database: &str) -> Result<Vec<TableName>> {
        self.ensure_ready()?;
        let connection = self.pool.acquire().await?;
        let result = self.introspector.tables_query(&*connection, database).await;
        self.pool.release(connection).await;
        result
    }

    /// Drains the pool. Later operations fail with `DriverReleased`;
    /// calling this again does nothing.
    ///
    /// # Errors
    /// Never fails today; the signature leaves room for backends whose
    /// teardown can
    pub async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            debug!(driver_id = %self.id, "Driver already released");
            return Ok(());
        }
        info!(driver_id = %self.id, "Releasing connection pool");
        self.pool.drain().await;
        Ok(())
    }

    /// Pool slot counts and cumulative counters.
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(AtlasDriverError::DriverReleased);
        }
        Ok(())
    }
}

impl std::fmt::Debug for AtlasDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasDriver")
            .field("id", &self.id)
            .field("backend", &self.config.backend)
            .field("url", &self.config.redacted_url())
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn ensure_url(config: &DriverConfig) -> Result<()> {
    if config.url.trim().is_empty() {
        return Err(AtlasDriverError::configuration("url is required property"));
    }
    Ok(())
}

struct StreamState {
    pool: Arc<ConnectionPool>,
    connection: Option<PooledConnection>,
    cursor: Option<Box<dyn ResultCursor>>,
    cancel: CancelHandle,
}

impl StreamState {
    /// Closes the cursor, then hands the connection back. Runs once.
    async fn finish(&mut self) {
        if let Some(mut cursor) = self.cursor.take()
            && let Err(e) = cursor.close().await
        {
            warn!("Failed to close streaming cursor: {}", e);
        }
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection).await;
        }
        self.cancel.finish();
    }
}

impl Drop for StreamState {
    /// A stream dropped before it finished still closes its cursor before
    /// the connection goes back to the pool.
    fn drop(&mut self) {
        self.cancel.finish();
        if self.cursor.is_none() && self.connection.is_none() {
            return;
        }
        let cursor = self.cursor.take();
        let connection = self.connection.take();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let mut pending = Self {
                    pool: Arc::clone(&self.pool),
                    connection,
                    cursor,
                    cancel: self.cancel.clone(),
                };
                runtime.spawn(async move {
                    pending.finish().await;
                });
            }
            Err(_) => {
                // Without a runtime the cursor cannot be closed; the
                // connection is discarded rather than pooled.
                drop(cursor);
                drop(connection);
            }
        }
    }
}
