//! Turning backend cursors into rows and typed column lists.

use crate::Result;
use crate::adapters::{ResultCursor, to_generic_type};
use crate::config::BackendKind;
use crate::error::AtlasDriverError;
use crate::executor::CancelHandle;
use crate::models::{ColumnDescriptor, RawColumn, Row};
use tracing::{debug, warn};

/// Drains cursors for one backend.
#[derive(Debug, Clone, Copy)]
pub struct ResultNormalizer {
    kind: BackendKind,
}

impl ResultNormalizer {
    /// Normalizer classifying column types with `kind`'s table.
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }

    /// Reads every row of `cursor`, then closes it.
    ///
    /// The cursor is closed on every path, including cancellation and row
    /// errors. No partial rows are returned on failure.
    ///
    /// # Errors
    /// Returns `QueryExecution` when a row cannot be read or `cancel` fires
    /// while draining
    pub async fn drain(
        &self,
        mut cursor: Box<dyn ResultCursor>,
        cancel: &CancelHandle,
        capacity: usize,
    ) -> Result<(Vec<Row>, Vec<ColumnDescriptor>)> {
        let mut rows = Vec::with_capacity(capacity);
        let drained = async {
            loop {
                if cancel.is_cancelled() {
                    return Err(AtlasDriverError::query_failed("Query was cancelled"));
                }
                match cursor.next_row().await? {
                    Some(row) => rows.push(row),
                    None => return Ok(()),
                }
            }
        }
        .await;

        let columns = self.describe(&cursor.columns());
        if let Err(e) = cursor.close().await {
            warn!("Failed to close result cursor: {}", e);
        }
        drained?;

        debug!(
            row_count = rows.len(),
            column_count = columns.len(),
            "Result set drained"
        );
        Ok((rows, columns))
    }

    /// Classifies raw column metadata, preserving order.
    pub fn describe(&self, columns: &[RawColumn]) -> Vec<ColumnDescriptor> {
        columns
            .iter()
            .map(|column| ColumnDescriptor {
                name: column.name.clone(),
                generic_type: to_generic_type(self.kind, column.type_name.as_deref()),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::GenericType;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedCursor {
        rows: VecDeque<Result<Row>>,
        columns: Vec<RawColumn>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedCursor {
        fn boxed(rows: Vec<Result<Row>>, closes: &Arc<AtomicUsize>) -> Box<dyn ResultCursor> {
            Box::new(Self {
                rows: rows.into(),
                columns: vec![
                    RawColumn::new("a", Some("int")),
                    RawColumn::new("b", Some("null")),
                ],
                closes: Arc::clone(closes),
            })
        }
    }

    #[async_trait]
    impl ResultCursor for ScriptedCursor {
        async fn next_row(&mut self) -> Result<Option<Row>> {
            self.rows.pop_front().transpose()
        }

        fn columns(&self) -> Vec<RawColumn> {
            self.columns.clone()
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn row(a: i64) -> Result<Row> {
        match json!({"a": a, "b": null}) {
            serde_json::Value::Object(map) => Ok(map),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_drain_collects_rows_and_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let cursor = ScriptedCursor::boxed(vec![row(1), row(2), row(3)], &closes);

        let (rows, columns) = ResultNormalizer::new(BackendKind::Wire)
            .drain(cursor, &CancelHandle::new(), 0)
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["a"], json!(3));
        assert_eq!(
            columns,
            vec![
                ColumnDescriptor {
                    name: "a".to_string(),
                    generic_type: GenericType::Int
                },
                ColumnDescriptor {
                    name: "b".to_string(),
                    generic_type: GenericType::Text
                },
            ]
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_row_error_still_closes_cursor() {
        let closes = Arc::new(AtomicUsize::new(0));
        let cursor = ScriptedCursor::boxed(
            vec![row(1), Err(AtlasDriverError::query_failed("cursor killed"))],
            &closes,
        );

        let error = ResultNormalizer::new(BackendKind::Bridge)
            .drain(cursor, &CancelHandle::new(), 0)
            .await
            .unwrap_err();

        assert_eq!(error.backend_message(), "cursor killed");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_drain_stops_and_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let cursor = ScriptedCursor::boxed(vec![row(1)], &closes);
        let cancel = CancelHandle::new();
        cancel.cancel().await.unwrap();

        let error = ResultNormalizer::new(BackendKind::Wire)
            .drain(cursor, &cancel, 0)
            .await
            .unwrap_err();

        assert!(matches!(error, AtlasDriverError::QueryExecution { .. }));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
