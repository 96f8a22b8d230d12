//! Query cancellation through the driver façade.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use atlasdriver_core::error::AtlasDriverError;
use atlasdriver_core::executor::CancelHandle;
use common::{MockBackend, driver, pool_options};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_query() {
    let backend = MockBackend::new();
    let driver = Arc::new(driver(&backend, pool_options(1)));
    let cancel = CancelHandle::new();

    let query = {
        let driver = Arc::clone(&driver);
        let cancel = cancel.clone();
        tokio::spawn(async move { driver.query_with_cancel("SELECT SLOW", &[], &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(driver.pool_status().borrowed, 1);

    cancel.cancel().await.unwrap();
    let error = query.await.unwrap().unwrap_err();
    assert!(matches!(error, AtlasDriverError::QueryExecution { .. }));
    assert!(cancel.is_finished());

    let status = driver.pool_status();
    assert_eq!(status.borrowed, 0);
    assert_eq!(status.idle, 1);
}

#[tokio::test]
async fn test_cancel_before_execution_never_reaches_backend() {
    let backend = MockBackend::new();
    backend.with_rows_of_a(1);
    let driver = driver(&backend, pool_options(1));
    let cancel = CancelHandle::new();

    cancel.cancel().await.unwrap();
    let error = driver
        .query_with_cancel("SELECT a FROM t", &[], &cancel)
        .await
        .unwrap_err();

    assert!(matches!(error, AtlasDriverError::QueryExecution { .. }));
    assert!(backend.executed().is_empty());
    assert_eq!(driver.pool_status().borrowed, 0);
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let backend = MockBackend::new();
    backend.with_rows_of_a(2);
    let driver = driver(&backend, pool_options(1));
    let cancel = CancelHandle::new();

    let rows = driver
        .query_with_cancel("SELECT a FROM t", &[], &cancel)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    cancel.cancel().await.unwrap();
    cancel.cancel().await.unwrap();
    assert!(!cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_uninterruptible_query_is_not_cancelable() {
    let backend = MockBackend::new();
    backend.with_rows_of_a(1);
    let driver = Arc::new(driver(&backend, pool_options(1)));
    let cancel = CancelHandle::new();

    let query = {
        let driver = Arc::clone(&driver);
        let cancel = cancel.clone();
        tokio::spawn(async move { driver.query_with_cancel("SELECT STUCK", &[], &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let error = cancel.cancel().await.unwrap_err();
    assert!(matches!(error, AtlasDriverError::NotCancelable { .. }));
    assert!(!cancel.is_cancelled());

    // The statement runs to completion.
    let rows = query.await.unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(cancel.is_finished());
    assert_eq!(driver.pool_status().borrowed, 0);
}
