//! One wire-protocol session and its metadata calls.
//!
//! # Query Envelope
//! SQL text is sent as the single stage of an aggregation:
//! `[{ "$sql": { "statement": ..., "format": "jdbc", "dialect": "mongosql" } }]`
//!
//! # Introspection
//! Base tables are the database's `collection`-typed namespaces; columns come
//! from the `sqlGetSchema` command the Atlas SQL interface exposes.

use super::cursor::WireCursor;
use crate::Result;
use crate::adapters::{BackendConnection, ResultCursor, like_match};
use crate::error::{AtlasDriverError, unwrap_cause_message};
use crate::executor::{CancelHandle, CancelSupport};
use crate::models::{ColumnMeta, StatementRequest, TableFilter, TableMeta};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::{Client, Database};

/// Key type the metadata calls report for `_id`.
const PRIMARY_KEY_TYPE: &str = "PRIMARY";

/// One `mongodb::Client` used as a single physical connection.
pub struct WireConnection {
    id: String,
    client: Client,
    database: String,
}

impl WireConnection {
    pub(super) fn new(id: String, client: Client, database: String) -> Self {
        Self {
            id,
            client,
            database,
        }
    }

    /// Database used when a call does not name one.
    pub fn database_name(&self) -> &str {
        &self.database
    }

    fn database(&self, name: Option<&str>) -> Database {
        self.client.database(name.unwrap_or(&self.database))
    }
}

/// Extracts the server's message from a driver error.
pub(super) fn mongo_error_message(error: &mongodb::error::Error) -> String {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => command.message.clone(),
        _ => unwrap_cause_message(error),
    }
}

/// Picks the column type out of one `jsonSchema` property.
///
/// Properties carry either `bsonType` (a name or a list of names) or an
/// `anyOf` of such entries; the first non-null name wins.
pub(super) fn property_type_name(property: &Document) -> Option<String> {
    fn first_non_null(value: &Bson) -> Option<String> {
        match value {
            Bson::String(name) if name != "null" => Some(name.clone()),
            Bson::Array(names) => names.iter().find_map(first_non_null),
            _ => None,
        }
    }

    if let Some(bson_type) = property.get("bsonType") {
        return first_non_null(bson_type);
    }

    property.get_array("anyOf").ok().and_then(|options| {
        options.iter().find_map(|option| match option {
            Bson::Document(option) => option.get("bsonType").and_then(first_non_null),
            _ => None,
        })
    })
}

/// Turns a `sqlGetSchema` reply into column metadata rows.
pub(super) fn columns_from_schema(table: &str, reply: &Document) -> Vec<ColumnMeta> {
    let Ok(properties) = reply
        .get_document("schema")
        .and_then(|schema| schema.get_document("jsonSchema"))
        .and_then(|json_schema| json_schema.get_document("properties"))
    else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, property)| {
            let type_name = match property {
                Bson::Document(property) => property_type_name(property),
                _ => None,
            };
            ColumnMeta {
                table_name: table.to_string(),
                column_name: name.clone(),
                type_name,
                key_type: (name == "_id").then(|| PRIMARY_KEY_TYPE.to_string()),
            }
        })
        .collect()
}

#[async_trait]
impl BackendConnection for WireConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn ping(&self) -> Result<()> {
        self.database(None)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| AtlasDriverError::validation(mongo_error_message(&e)))?;
        Ok(())
    }

    async fn execute(
        &self,
        request: &StatementRequest,
        cancel: &CancelHandle,
    ) -> Result<Box<dyn ResultCursor>> {
        cancel.arm(CancelSupport::Cooperative);

        let pipeline = vec![doc! {
            "$sql": {
                "statement": request.sql.as_str(),
                "format": "jdbc",
                "dialect": "mongosql",
            }
        }];
        let database = self.database(None);
        let aggregate = database
            .aggregate(pipeline)
            .max_time(request.query_timeout);

        let cursor = tokio::select! {
            biased;
            () = cancel.token().cancelled() => {
                return Err(AtlasDriverError::query_failed("Query was cancelled"));
            }
            result = aggregate => result.map_err(|e| {
                AtlasDriverError::query_failed(mongo_error_message(&e))
            })?,
        };

        Ok(Box::new(WireCursor::new(
            cursor,
            cancel.token().clone(),
            self.id.clone(),
        )))
    }

    async fn list_tables(&self, filter: &TableFilter) -> Result<Vec<TableMeta>> {
        let catalog = filter
            .catalog
            .as_deref()
            .or(filter.schema_pattern.as_deref())
            .unwrap_or(&self.database)
            .to_string();

        let names = self
            .client
            .database(&catalog)
            .list_collection_names()
            .filter(doc! { "type": "collection" })
            .await
            .map_err(|e| {
                AtlasDriverError::introspection_failed(
                    format!("Failed to list collections in '{}'", catalog),
                    e,
                )
            })?;

        let mut tables: Vec<TableMeta> = names
            .into_iter()
            .filter(|name| !name.starts_with("system."))
            .filter(|name| {
                filter
                    .table_name_pattern
                    .as_deref()
                    .is_none_or(|pattern| like_match(pattern, name))
            })
            .map(|name| TableMeta {
                catalog: Some(catalog.clone()),
                schema: None,
                name,
                table_type: "TABLE".to_string(),
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            connection_id = %self.id,
            database = %catalog,
            table_count = tables.len(),
            "Listed tables"
        );
        Ok(tables)
    }

    async fn list_columns(
        &self,
        database: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnMeta>> {
        let reply = self
            .database(database)
            .run_command(doc! { "sqlGetSchema": table })
            .await
            .map_err(|e| {
                AtlasDriverError::introspection_failed(
                    format!("Failed to read the SQL schema of '{}'", table),
                    e,
                )
            })?;
        Ok(columns_from_schema(table, &reply))
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
