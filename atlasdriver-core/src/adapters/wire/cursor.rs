//! Cursor over `$sql` aggregation results.

use super::type_mapping::bson_type_name;
use crate::Result;
use crate::adapters::ResultCursor;
use crate::error::AtlasDriverError;
use crate::models::{RawColumn, Row};
use async_trait::async_trait;
use mongodb::Cursor;
use mongodb::bson::{Bson, Document};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Streams rows out of an aggregation cursor, learning columns as it goes.
pub(super) struct WireCursor {
    cursor: Option<Cursor<Document>>,
    columns: Vec<RawColumn>,
    positions: HashMap<String, usize>,
    cancel: CancellationToken,
    connection_id: String,
}

impl WireCursor {
    pub(super) fn new(
        cursor: Cursor<Document>,
        cancel: CancellationToken,
        connection_id: String,
    ) -> Self {
        Self {
            cursor: Some(cursor),
            columns: Vec::new(),
            positions: HashMap::new(),
            cancel,
            connection_id,
        }
    }

    /// Records first-seen columns; a column typed `null` takes the type of
    /// the first non-null value seen later.
    fn observe(&mut self, document: &Document) {
        observe_columns(&mut self.columns, &mut self.positions, document);
    }
}

pub(super) fn observe_columns(
    columns: &mut Vec<RawColumn>,
    positions: &mut HashMap<String, usize>,
    document: &Document,
) {
    for (key, value) in document {
        let type_name = bson_type_name(value);
        match positions.get(key) {
            Some(&index) => {
                let column = &mut columns[index];
                if column.type_name.as_deref() == Some("null") && type_name != "null" {
                    column.type_name = Some(type_name.to_string());
                }
            }
            None => {
                positions.insert(key.clone(), columns.len());
                columns.push(RawColumn::new(key.clone(), Some(type_name)));
            }
        }
    }
}

/// Strips the single-key envelope `$sql` wraps each result in.
///
/// `{"": {"a": 1}}` becomes `{"a": 1}`. Documents with several keys pass
/// through; a single non-document value is kept under its key.
pub(super) fn unwrap_envelope(document: Document) -> Document {
    if document.len() != 1 {
        return document;
    }
    let mut entries = document.into_iter();
    match entries.next() {
        Some((_, Bson::Document(inner))) => inner,
        Some((key, value)) => {
            let mut row = Document::new();
            row.insert(key, value);
            row
        }
        None => Document::new(),
    }
}

/// Converts a BSON value to JSON, rendering identifiers, dates and decimals
/// as strings.
pub(super) fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(date) => date
            .try_to_rfc3339_string()
            .map_or_else(|_| Value::from(date.timestamp_millis()), Value::String),
        Bson::Decimal128(decimal) => Value::String(decimal.to_string()),
        Bson::Int64(number) => Value::from(number),
        Bson::Document(document) => Value::Object(document_to_row(document)),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

pub(super) fn document_to_row(document: Document) -> Row {
    document
        .into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

#[async_trait]
impl ResultCursor for WireCursor {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let advanced = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(AtlasDriverError::query_failed("Query was cancelled"));
            }
            advanced = cursor.advance() => advanced.map_err(|e| {
                AtlasDriverError::query_failed(super::connection::mongo_error_message(&e))
            })?,
        };

        if !advanced {
            self.cursor = None;
            tracing::trace!(connection_id = %self.connection_id, "Wire cursor exhausted");
            return Ok(None);
        }

        let raw = cursor.deserialize_current().map_err(|e| {
            AtlasDriverError::query_failed(format!("Failed to decode result document: {}", e))
        })?;
        let document = unwrap_envelope(raw);
        self.observe(&document);
        Ok(Some(document_to_row(document)))
    }

    fn columns(&self) -> Vec<RawColumn> {
        self.columns.clone()
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the driver cursor kills it server side.
        self.cursor.take();
        Ok(())
    }
}
