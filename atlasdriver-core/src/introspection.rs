//! Schema introspection over one borrowed connection.
//!
//! Every operation here takes the connection by reference; acquiring and
//! releasing it is the caller's job.

use crate::Result;
use crate::adapters::{BackendConnection, to_generic_type};
use crate::config::BackendKind;
use crate::models::{
    ColumnDescriptor, PRIMARY_KEY_ATTRIBUTE, SchemaColumn, SchemaMap, TableFilter, TableName,
};
use std::time::Instant;
use tracing::debug;

/// Walks table and column metadata for one backend.
#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    kind: BackendKind,
    database: Option<String>,
}

/// Splits `db.table` on the first dot. An unqualified name has no database.
pub fn split_table_ref(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('.') {
        Some((database, table)) if !database.is_empty() => (Some(database), table),
        Some((_, table)) => (None, table),
        None => (None, reference),
    }
}

impl SchemaIntrospector {
    /// `database` is the configured default database, used for unqualified
    /// table references and for the full schema walk.
    pub fn new(kind: BackendKind, database: Option<String>) -> Self {
        Self { kind, database }
    }

    /// Columns of one table with their generic types, in backend order.
    ///
    /// # Errors
    /// Returns `Introspection` when the column metadata call fails
    pub async fn list_columns_of(
        &self,
        connection: &dyn BackendConnection,
        table_ref: &str,
    ) -> Result<Vec<ColumnDescriptor>> {
        let (database, table) = split_table_ref(table_ref);
        let database = database.or(self.database.as_deref());

        let columns = connection.list_columns(database, table).await?;
        Ok(columns
            .into_iter()
            .map(|column| ColumnDescriptor {
                generic_type: to_generic_type(self.kind, column.type_name.as_deref()),
                name: column.column_name,
            })
            .collect())
    }

    /// Every base table of the configured database with its columns.
    ///
    /// One table listing followed by one column listing per table. Column
    /// lists are sorted by name; key columns carry `primaryKey`.
    ///
    /// # Errors
    /// Returns the first failing metadata call's error
    pub async fn list_all_schemas(&self, connection: &dyn BackendConnection) -> Result<SchemaMap> {
        let started = Instant::now();
        let filter = TableFilter::base_tables_in_catalog(self.database.as_deref());
        let tables = connection.list_tables(&filter).await?;
        debug!(
            connection_id = %connection.id(),
            table_count = tables.len(),
            "Listed tables for schema walk"
        );

        let mut schema = SchemaMap::new();
        for table in tables {
            let database = table.schema.as_deref().or(table.catalog.as_deref());
            let columns = connection.list_columns(database, &table.name).await?;

            let mut entries: Vec<SchemaColumn> = columns
                .into_iter()
                .map(|column| SchemaColumn {
                    name: column.column_name,
                    type_name: column.type_name.unwrap_or_else(|| "null".to_string()),
                    attributes: column
                        .key_type
                        .map(|_| vec![PRIMARY_KEY_ATTRIBUTE.to_string()])
                        .unwrap_or_default(),
                })
                .collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));

            let catalog = table
                .catalog
                .clone()
                .or_else(|| self.database.clone())
                .unwrap_or_default();
            schema.entry(catalog).or_default().insert(table.name, entries);
        }

        debug!(
            connection_id = %connection.id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Schema walk finished"
        );
        Ok(schema)
    }

    /// Base table names of one database.
    ///
    /// # Errors
    /// Returns `Introspection` when the table metadata call fails
    pub async fn tables_query(
        &self,
        connection: &dyn BackendConnection,
        database: &str,
    ) -> Result<Vec<TableName>> {
        let filter = TableFilter::base_tables_in_schema(database);
        let tables = connection.list_tables(&filter).await?;
        Ok(tables
            .into_iter()
            .map(|table| TableName {
                table_name: table.name,
            })
            .collect())
    }
}
