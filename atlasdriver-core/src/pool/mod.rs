//! Bounded pool of physical backend connections.
//!
//! # Slot accounting
//! A semaphore with `max_size` permits gates every physical connection that
//! is borrowed, being validated or being destroyed on a borrower's or the
//! evictor's behalf. Idle connections hold no permit; a borrower only opens a
//! new connection when the idle queue is empty, so idle plus borrowed never
//! exceeds `max_size`.
//!
//! Waiters are served first come, first served (the semaphore is fair).
//! Idle connections are reused oldest-returned first.
//!
//! Slot state lives behind a synchronous mutex that is never held across an
//! await point, so a state transition is never split between two callers.
//! A caller that stops awaiting mid-probe or mid-close leaves no stale
//! count behind: the connection it held is closed in the background.

mod stats;

pub use stats::PoolStats;

use crate::Result;
use crate::adapters::{BackendConnection, ConnectionFactory};
use crate::config::PoolOptions;
use crate::error::AtlasDriverError;
use serde::Serialize;
use stats::AtomicPoolStats;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Physical connections currently alive
    pub size: usize,
    /// Connections waiting in the idle queue
    pub idle: usize,
    /// Connections handed out to callers
    pub borrowed: usize,
    /// Connections undergoing a health probe
    pub validating: usize,
    /// Connections being closed
    pub destroying: usize,
    /// Configured upper bound on `size`
    pub max_size: usize,
    /// Cumulative counters since the pool was created
    pub stats: PoolStats,
}

struct IdleSlot {
    connection: Box<dyn BackendConnection>,
    idle_since: Instant,
    last_validated: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleSlot>,
    borrowed: usize,
    validating: usize,
    destroying: usize,
    closed: bool,
}

impl PoolState {
    fn size(&self) -> usize {
        self.idle.len() + self.borrowed + self.validating + self.destroying
    }
}

struct PoolInner {
    factory: Arc<dyn ConnectionFactory>,
    options: PoolOptions,
    validation_timeout: Duration,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    stats: AtomicPoolStats,
}

/// Connection pool over one [`ConnectionFactory`].
///
/// # Example
/// ```rust,no_run
/// # async fn demo(factory: std::sync::Arc<dyn atlasdriver_core::adapters::ConnectionFactory>)
/// # -> atlasdriver_core::Result<()> {
/// use atlasdriver_core::config::PoolOptions;
/// use atlasdriver_core::pool::ConnectionPool;
/// use std::time::Duration;
///
/// let pool = ConnectionPool::new(factory, PoolOptions::default(), Duration::from_secs(10))?;
/// let connection = pool.acquire().await?;
/// connection.ping().await?;
/// pool.release(connection).await;
/// pool.drain().await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Creates an empty pool. No connection is opened until the first
    /// `acquire`.
    ///
    /// The idle eviction sweep starts when called inside a Tokio runtime.
    ///
    /// # Errors
    /// Returns a configuration error if `options` do not validate
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        options: PoolOptions,
        validation_timeout: Duration,
    ) -> Result<Self> {
        options.validate()?;

        let inner = Arc::new(PoolInner {
            factory,
            semaphore: Arc::new(Semaphore::new(options.max_size)),
            options,
            validation_timeout,
            state: Mutex::new(PoolState::default()),
            stats: AtomicPoolStats::default(),
        });
        let evictor = spawn_evictor(&inner);

        debug!(
            max_size = inner.options.max_size,
            min_size = inner.options.min_size,
            backend = %inner.factory.kind(),
            "Connection pool created"
        );

        Ok(Self {
            inner,
            evictor: Mutex::new(evictor),
        })
    }

    /// Borrows a connection, waiting up to the acquire timeout for a slot.
    ///
    /// Idle connections are probed first when `test_on_borrow` is set; a
    /// connection that fails its probe is destroyed and the next idle one
    /// (or a fresh one) is tried instead.
    ///
    /// # Errors
    /// - `PoolExhausted` when no slot frees up within the acquire timeout
    /// - `PoolClosed` once the pool is draining
    /// - `ConnectionCreate` when a new connection cannot be opened
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.inner.acquire().await
    }

    /// Returns a borrowed connection. Never fails.
    pub async fn release(&self, mut connection: PooledConnection) {
        if let Some((conn, permit)) = connection.take() {
            connection.pool.give_back(conn, permit).await;
        }
    }

    /// Stops issuing connections and destroys every idle one.
    ///
    /// Connections still borrowed are destroyed as they come back. Calling
    /// this more than once is harmless.
    pub async fn drain(&self) {
        if let Some(evictor) = self.lock_evictor().take() {
            evictor.abort();
        }
        self.inner.drain().await;
    }

    /// Whether `drain` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current slot counts and cumulative counters.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.lock();
        PoolStatus {
            size: state.size(),
            idle: state.idle.len(),
            borrowed: state.borrowed,
            validating: state.validating,
            destroying: state.destroying,
            max_size: self.inner.options.max_size,
            stats: self.inner.stats.snapshot(),
        }
    }

    /// Cumulative counters.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats.snapshot()
    }

    /// Options the pool was built with.
    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    fn lock_evictor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.evictor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Some(evictor) = self.lock_evictor().take() {
            evictor.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        if self.lock().closed {
            return Err(AtlasDriverError::PoolClosed);
        }

        let started = Instant::now();
        let permit = match tokio::time::timeout(
            self.options.acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(AtlasDriverError::PoolClosed),
            Err(_) => {
                self.stats.record_exhausted();
                let timeout_ms = self.options.acquire_timeout.as_millis();
                warn!(
                    pool_size = self.options.max_size,
                    timeout_ms = timeout_ms as u64,
                    "Timed out waiting for a pooled connection"
                );
                return Err(AtlasDriverError::pool_exhausted(format!(
                    "no connection became available within {}ms (max pool size {})",
                    timeout_ms, self.options.max_size
                )));
            }
        };

        let mut permit = permit;
        loop {
            let slot = {
                let mut state = self.lock();
                if state.closed {
                    return Err(AtlasDriverError::PoolClosed);
                }
                let slot = state.idle.pop_front();
                if slot.is_some() {
                    if self.options.test_on_borrow {
                        state.validating += 1;
                    } else {
                        state.borrowed += 1;
                    }
                }
                slot
            };

            let Some(IdleSlot {
                connection,
                last_validated,
                ..
            }) = slot
            else {
                let connection = self.factory.create().await?;
                self.stats.record_created();
                info!(connection_id = %connection.id(), "Pooled connection created");
                return self.lease(connection, permit, started).await;
            };

            if !self.options.test_on_borrow {
                return Ok(self.leased(connection, permit, started));
            }

            let checking = ValidatingSlot::new(self, connection, permit);
            let healthy = checking.check().await;
            let (connection, slot_permit) = checking.settle(healthy);
            if healthy {
                return Ok(self.leased(connection, slot_permit, started));
            }

            self.stats.record_validation_failure();
            warn!(
                connection_id = %connection.id(),
                validated_ago_ms = last_validated.elapsed().as_millis() as u64,
                "Pooled connection failed validation, destroying it"
            );
            self.destroy(connection).await;
            permit = slot_permit;
        }
    }

    /// Registers a freshly created connection as borrowed, or destroys it
    /// when the pool closed while it was being opened.
    async fn lease(
        self: &Arc<Self>,
        connection: Box<dyn BackendConnection>,
        permit: OwnedSemaphorePermit,
        started: Instant,
    ) -> Result<PooledConnection> {
        let closed = {
            let mut state = self.lock();
            if state.closed {
                state.destroying += 1;
            } else {
                state.borrowed += 1;
            }
            state.closed
        };
        if closed {
            self.destroy(connection).await;
            drop(permit);
            return Err(AtlasDriverError::PoolClosed);
        }
        Ok(self.leased(connection, permit, started))
    }

    fn leased(
        self: &Arc<Self>,
        connection: Box<dyn BackendConnection>,
        permit: OwnedSemaphorePermit,
        started: Instant,
    ) -> PooledConnection {
        let waited_ms = started.elapsed().as_millis() as u64;
        self.stats.record_acquisition(waited_ms);
        debug!(connection_id = %connection.id(), waited_ms, "Connection acquired");
        PooledConnection {
            connection: Some(connection),
            permit: Some(permit),
            pool: Arc::clone(self),
        }
    }

    /// Health probe bounded by the validation timeout.
    async fn probe(&self, connection: &dyn BackendConnection) -> bool {
        match tokio::time::timeout(self.validation_timeout, self.factory.validate(connection)).await
        {
            Ok(healthy) => healthy,
            Err(_) => {
                debug!(
                    connection_id = %connection.id(),
                    timeout_ms = self.validation_timeout.as_millis() as u64,
                    "Validation probe timed out"
                );
                false
            }
        }
    }

    async fn give_back(
        self: &Arc<Self>,
        connection: Box<dyn BackendConnection>,
        permit: OwnedSemaphorePermit,
    ) {
        let (connection, permit, healthy) = if self.options.test_on_return {
            {
                let mut state = self.lock();
                state.borrowed -= 1;
                state.validating += 1;
            }
            let checking = ValidatingSlot::new(self, connection, permit);
            let healthy = checking.check().await;
            if !healthy {
                self.stats.record_validation_failure();
            }
            // Back to borrowed; the verdict is applied below with the close check.
            let (connection, permit) = checking.settle(true);
            (connection, permit, healthy)
        } else {
            (connection, permit, true)
        };

        let rejected = {
            let mut state = self.lock();
            state.borrowed -= 1;
            if state.closed || !healthy {
                state.destroying += 1;
                Some(connection)
            } else {
                debug!(connection_id = %connection.id(), "Connection released");
                let now = Instant::now();
                state.idle.push_back(IdleSlot {
                    connection,
                    idle_since: now,
                    last_validated: now,
                });
                None
            }
        };

        if let Some(connection) = rejected {
            self.destroy(connection).await;
        }
        drop(permit);
    }

    /// Best-effort close of a connection already counted as destroying;
    /// failures are logged and swallowed.
    ///
    /// The count is given back even when the caller stops awaiting, in which
    /// case the connection is dropped with the abandoned future.
    async fn destroy(&self, connection: Box<dyn BackendConnection>) {
        let connection_id = connection.id().to_string();
        let slot = DestroyingSlot(self);
        if let Err(e) = self.factory.destroy(connection).await {
            warn!(connection_id = %connection_id, "Failed to close connection: {}", e);
        }
        drop(slot);
        let pool_size = self.lock().size();
        debug!(connection_id = %connection_id, pool_size, "Connection destroyed");
    }

    /// Destroys a connection already counted as destroying on a background
    /// task. The permit, if any, is held until the close finishes.
    fn destroy_detached(
        self: &Arc<Self>,
        connection: Box<dyn BackendConnection>,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = Arc::clone(self);
                runtime.spawn(async move {
                    pool.destroy(connection).await;
                    drop(permit);
                });
            }
            Err(_) => {
                debug!(connection_id = %connection.id(), "Dropping connection without a runtime");
                let slot = DestroyingSlot(self);
                drop(connection);
                drop(slot);
                drop(permit);
            }
        }
    }

    /// Destroys idle connections older than the idle timeout, oldest first,
    /// while the pool is larger than its minimum size.
    async fn evict_idle(&self) {
        loop {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                return;
            };
            let expired = {
                let mut state = self.lock();
                let expired = !state.closed
                    && state.size() > self.options.min_size
                    && state
                        .idle
                        .front()
                        .is_some_and(|slot| slot.idle_since.elapsed() >= self.options.idle_timeout);
                if expired {
                    state.destroying += 1;
                    state.idle.pop_front()
                } else {
                    None
                }
            };

            let Some(slot) = expired else {
                return;
            };
            debug!(
                connection_id = %slot.connection.id(),
                idle_ms = slot.idle_since.elapsed().as_millis() as u64,
                "Evicting idle connection"
            );
            self.destroy(slot.connection).await;
            drop(permit);
        }
    }

    async fn drain(self: &Arc<Self>) {
        let connections: VecDeque<Box<dyn BackendConnection>> = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.destroying += state.idle.len();
            state.idle.drain(..).map(|slot| slot.connection).collect()
        };
        self.semaphore.close();

        let count = connections.len();
        let mut closing = Closing {
            pool: Arc::clone(self),
            connections,
        };
        while let Some(connection) = closing.connections.pop_front() {
            self.destroy(connection).await;
        }
        info!(destroyed = count, "Connection pool drained");
    }

    /// Bookkeeping for a connection dropped outside a runtime; the
    /// connection itself is closed by its own `Drop`.
    fn forget(&self, connection: Box<dyn BackendConnection>) {
        debug!(connection_id = %connection.id(), "Dropping connection without a runtime");
        drop(connection);
        self.stats.record_destroyed();
        self.lock().borrowed -= 1;
    }
}

/// A connection out of the idle queue for a health probe, counted as
/// validating until settled.
///
/// Dropped unsettled (its owner stopped awaiting the probe), the connection
/// moves to destroying and is closed in the background, keeping its permit.
struct ValidatingSlot {
    pool: Arc<PoolInner>,
    entry: Option<(Box<dyn BackendConnection>, OwnedSemaphorePermit)>,
}

impl ValidatingSlot {
    /// Wraps a connection the caller has already counted as validating.
    fn new(
        pool: &Arc<PoolInner>,
        connection: Box<dyn BackendConnection>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool: Arc::clone(pool),
            entry: Some((connection, permit)),
        }
    }

    async fn check(&self) -> bool {
        match &self.entry {
            Some((connection, _)) => self.pool.probe(connection.as_ref()).await,
            None => false,
        }
    }

    /// Moves the slot to borrowed (healthy) or destroying and hands the
    /// connection back.
    #[allow(clippy::expect_used)]
    fn settle(mut self, healthy: bool) -> (Box<dyn BackendConnection>, OwnedSemaphorePermit) {
        // Only `settle` and `drop` empty the entry, and both consume the slot.
        let entry = self.entry.take().expect("validating slot already settled");
        let mut state = self.pool.lock();
        state.validating -= 1;
        if healthy {
            state.borrowed += 1;
        } else {
            state.destroying += 1;
        }
        entry
    }
}

impl Drop for ValidatingSlot {
    fn drop(&mut self) {
        let Some((connection, permit)) = self.entry.take() else {
            return;
        };
        {
            let mut state = self.pool.lock();
            state.validating -= 1;
            state.destroying += 1;
        }
        debug!(connection_id = %connection.id(), "Validation abandoned, destroying connection");
        self.pool.destroy_detached(connection, Some(permit));
    }
}

/// Gives back one destroying count when a close finishes or is abandoned.
struct DestroyingSlot<'a>(&'a PoolInner);

impl Drop for DestroyingSlot<'_> {
    fn drop(&mut self) {
        self.0.stats.record_destroyed();
        self.0.lock().destroying -= 1;
    }
}

/// Idle connections taken by `drain` and not yet closed; any left when the
/// drain is abandoned are closed in the background.
struct Closing {
    pool: Arc<PoolInner>,
    connections: VecDeque<Box<dyn BackendConnection>>,
}

impl Drop for Closing {
    fn drop(&mut self) {
        for connection in self.connections.drain(..) {
            self.pool.destroy_detached(connection, None);
        }
    }
}

fn spawn_evictor(inner: &Arc<PoolInner>) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let pool: Weak<PoolInner> = Arc::downgrade(inner);
    let period = inner.options.eviction_interval;

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(pool) = pool.upgrade() else {
                break;
            };
            if pool.lock().closed {
                break;
            }
            pool.evict_idle().await;
        }
    }))
}

/// A borrowed connection.
///
/// Dereferences to the backend connection. Hand it back with
/// [`ConnectionPool::release`]; dropping it releases it in the background.
pub struct PooledConnection {
    connection: Option<Box<dyn BackendConnection>>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn take(&mut self) -> Option<(Box<dyn BackendConnection>, OwnedSemaphorePermit)> {
        match (self.connection.take(), self.permit.take()) {
            (Some(connection), Some(permit)) => Some((connection, permit)),
            _ => None,
        }
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn BackendConnection;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        // Only `release` and `drop` empty the slot, and both consume the guard.
        self.connection
            .as_deref()
            .expect("pooled connection already released")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some((connection, permit)) = self.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = Arc::clone(&self.pool);
                runtime.spawn(async move {
                    pool.give_back(connection, permit).await;
                });
            }
            Err(_) => {
                self.pool.forget(connection);
                drop(permit);
            }
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.connection.as_ref().map(|c| c.id().to_string()))
            .finish_non_exhaustive()
    }
}
