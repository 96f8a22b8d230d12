//! Connection pool lifecycle tests against the in-memory backend.
//!
//! Covers:
//! - the max-size bound under concurrent load
//! - acquire timeouts and FIFO waiter order
//! - borrow-time validation and replacement of unhealthy connections
//! - callers abandoning an acquire mid-validation
//! - idle eviction, drain and release-on-drop

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use atlasdriver_core::Result;
use atlasdriver_core::error::AtlasDriverError;
use atlasdriver_core::pool::ConnectionPool;
use common::{MockBackend, MockFactory, pool_options};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn pool(backend: &Arc<MockBackend>, options: atlasdriver_core::PoolOptions) -> ConnectionPool {
    ConnectionPool::new(MockFactory::new(backend), options, Duration::from_secs(1))
        .expect("pool options are valid")
}

#[tokio::test(start_paused = true)]
async fn test_pool_never_exceeds_max_size() {
    let backend = MockBackend::new();
    let pool = Arc::new(pool(
        &backend,
        pool_options(3).with_acquire_timeout(Duration::from_secs(60)),
    ));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            let connection = pool.acquire().await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
            pool.release(connection).await;
            Ok::<_, AtlasDriverError>(())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(backend.max_live.load(Ordering::SeqCst) <= 3);
    assert!(backend.created() <= 3);
    let status = pool.status();
    assert_eq!(status.borrowed, 0);
    assert_eq!(status.size, backend.live());
    assert_eq!(status.stats.acquisitions, 20);
}

#[tokio::test(start_paused = true)]
async fn test_pool_acquire_times_out_when_exhausted() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(2));

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;

    let started = tokio::time::Instant::now();
    let error = pool.acquire().await.unwrap_err();
    assert!(matches!(error, AtlasDriverError::PoolExhausted { .. }));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(pool.stats().exhausted_count, 1);
    assert_eq!(backend.created(), 2);

    pool.release(first).await;
    pool.release(second).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pool_waiters_are_served_in_arrival_order() -> Result<()> {
    let backend = MockBackend::new();
    let pool = Arc::new(pool(&backend, pool_options(1)));
    let held = pool.acquire().await?;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for name in ["first", "second", "third"] {
        let pool = Arc::clone(&pool);
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let connection = pool.acquire().await.unwrap();
            order.lock().unwrap().push(name);
            tokio::time::sleep(Duration::from_millis(10)).await;
            pool.release(connection).await;
        }));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    pool.release(held).await;
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(backend.created(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pool_reuses_released_connection() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(3));

    let connection = pool.acquire().await?;
    let id = connection.id().to_string();
    pool.release(connection).await;

    let again = pool.acquire().await?;
    assert_eq!(again.id(), id);
    assert_eq!(backend.created(), 1);
    pool.release(again).await;
    Ok(())
}

#[tokio::test]
async fn test_pool_replaces_connection_that_fails_validation() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(3));

    let connection = pool.acquire().await?;
    let unhealthy_id = connection.id().to_string();
    pool.release(connection).await;
    backend.mark_unhealthy(&unhealthy_id);

    let replacement = pool.acquire().await?;
    assert_ne!(replacement.id(), unhealthy_id);
    assert_eq!(backend.destroyed(), 1);
    assert_eq!(backend.created(), 2);

    let status = pool.status();
    assert_eq!(status.stats.validation_failures, 1);
    assert_eq!(status.borrowed, 1);
    assert_eq!(status.size, 1);

    pool.release(replacement).await;
    Ok(())
}

#[tokio::test]
async fn test_pool_test_on_return_destroys_unhealthy_connection() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(3).with_test_on_return(true));

    let connection = pool.acquire().await?;
    backend.mark_unhealthy(connection.id());
    pool.release(connection).await;

    assert_eq!(backend.destroyed(), 1);
    assert_eq!(pool.status().size, 0);
    Ok(())
}

#[tokio::test]
async fn test_pool_creation_failure_propagates_and_frees_slot() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(1));

    backend.fail_create.store(true, Ordering::SeqCst);
    let error = pool.acquire().await.unwrap_err();
    assert!(matches!(error, AtlasDriverError::ConnectionCreate { .. }));
    assert_eq!(error.backend_message(), "Authentication failed.");
    assert_eq!(pool.status().size, 0);

    backend.fail_create.store(false, Ordering::SeqCst);
    let connection = pool.acquire().await?;
    pool.release(connection).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pool_evicts_idle_connections_down_to_min_size() -> Result<()> {
    let backend = MockBackend::new();
    let options = pool_options(3)
        .with_min_size(1)
        .with_idle_timeout(Duration::from_secs(30))
        .with_eviction_interval(Duration::from_secs(10));
    let pool = pool(&backend, options);

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    pool.release(first).await;
    pool.release(second).await;
    assert_eq!(pool.status().idle, 2);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(pool.status().idle, 2);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let status = pool.status();
    assert_eq!(status.idle, 1);
    assert_eq!(status.size, 1);
    assert_eq!(backend.destroyed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pool_drain_is_idempotent() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(3));

    let idle = pool.acquire().await?;
    let borrowed = pool.acquire().await?;
    pool.release(idle).await;

    pool.drain().await;
    pool.drain().await;
    assert!(pool.is_closed());
    assert_eq!(backend.destroyed(), 1);

    // Connections coming back after drain are destroyed, not pooled.
    pool.release(borrowed).await;
    assert_eq!(backend.destroyed(), 2);
    assert_eq!(backend.live(), 0);
    assert_eq!(backend.double_closes.load(Ordering::SeqCst), 0);

    assert!(matches!(
        pool.acquire().await.unwrap_err(),
        AtlasDriverError::PoolClosed
    ));
    Ok(())
}

#[tokio::test]
async fn test_pool_dropped_guard_returns_connection() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(1));

    let connection = pool.acquire().await?;
    drop(connection);

    let again = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
        .await
        .expect("slot freed by dropped guard")?;
    assert_eq!(backend.created(), 1);
    pool.release(again).await;
    assert_eq!(pool.status().idle, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pool_abandoned_validation_destroys_connection() -> Result<()> {
    let backend = MockBackend::new();
    let pool = pool(&backend, pool_options(1));

    let connection = pool.acquire().await?;
    pool.release(connection).await;
    *backend.ping_delay.lock().unwrap() = Some(Duration::from_millis(500));

    let abandoned = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(10)).await;
    let status = pool.status();
    assert_eq!(status.validating, 0);
    assert_eq!(status.destroying, 0);
    assert_eq!(status.size, 0);
    assert_eq!(backend.destroyed(), 1);
    assert_eq!(backend.live(), 0);

    *backend.ping_delay.lock().unwrap() = None;
    let fresh = pool.acquire().await?;
    assert_eq!(backend.created(), 2);
    pool.release(fresh).await;
    assert_eq!(pool.status().idle, 1);
    Ok(())
}
