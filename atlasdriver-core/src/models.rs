//! Data types shared by the pool, the backends and the driver façade.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One result row: column name to JSON value, in result-set column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Nested schema description: catalog → table name → ordered columns.
pub type SchemaMap = BTreeMap<String, BTreeMap<String, Vec<SchemaColumn>>>;

/// Attribute attached to columns the backend reports as part of a key.
pub const PRIMARY_KEY_ATTRIBUTE: &str = "primaryKey";

/// Portable column types that backend-specific type names are classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenericType {
    Text,
    Int,
    Bigint,
    Float,
    Double,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Time,
}

impl GenericType {
    /// Lowercase tag used on the wire and in schema output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Bigint => "bigint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Time => "time",
        }
    }
}

impl std::fmt::Display for GenericType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata as reported by a backend cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    /// Column name
    pub name: String,
    /// Backend type name; `None` when the backend reports no type
    #[serde(rename = "typeName", default)]
    pub type_name: Option<String>,
}

impl RawColumn {
    /// Creates column metadata from a name and optional backend type name.
    pub fn new(name: impl Into<String>, type_name: Option<&str>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.map(str::to_string),
        }
    }
}

/// A column name paired with its generic type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub generic_type: GenericType,
}

/// One query as handed to a backend connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRequest {
    /// Fully inlined SQL text
    pub sql: String,
    /// Server-side execution budget
    pub query_timeout: Duration,
}

/// Filter for table metadata calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableFilter {
    /// Catalog (database) the tables must belong to
    pub catalog: Option<String>,
    /// Schema name pattern
    pub schema_pattern: Option<String>,
    /// Table name pattern
    pub table_name_pattern: Option<String>,
    /// Accepted table types, e.g. `TABLE`
    pub types: Vec<String>,
}

impl TableFilter {
    /// Base tables only, within one catalog.
    pub fn base_tables_in_catalog(catalog: Option<&str>) -> Self {
        Self {
            catalog: catalog.map(str::to_string),
            types: vec!["TABLE".to_string()],
            ..Default::default()
        }
    }

    /// Base tables only, within one schema.
    pub fn base_tables_in_schema(schema: &str) -> Self {
        Self {
            schema_pattern: Some(schema.to_string()),
            types: vec!["TABLE".to_string()],
            ..Default::default()
        }
    }
}

/// One row of a table metadata call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    #[serde(rename = "TABLE_CAT", default)]
    pub catalog: Option<String>,
    #[serde(rename = "TABLE_SCHEM", default)]
    pub schema: Option<String>,
    #[serde(rename = "TABLE_NAME")]
    pub name: String,
    #[serde(rename = "TABLE_TYPE", default = "default_table_type")]
    pub table_type: String,
}

fn default_table_type() -> String {
    "TABLE".to_string()
}

/// One row of a column metadata call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    #[serde(rename = "TABLE_NAME")]
    pub table_name: String,
    #[serde(rename = "COLUMN_NAME")]
    pub column_name: String,
    #[serde(rename = "TYPE_NAME", default)]
    pub type_name: Option<String>,
    /// Non-null when the column belongs to a key
    #[serde(rename = "KEY_TYPE", default)]
    pub key_type: Option<String>,
}

/// A column entry in a [`SchemaMap`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    /// Backend type name as reported by the metadata call
    #[serde(rename = "type")]
    pub type_name: String,
    pub attributes: Vec<String>,
}

/// Table name entry returned by `tables_query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableName {
    pub table_name: String,
}

/// Options for `download_query_results`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Expected row count, used to size the result buffer
    pub high_water_mark: Option<usize>,
}

/// Rows of a query together with their column types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadResult {
    pub rows: Vec<Row>,
    pub types: Vec<ColumnDescriptor>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_type_serializes_lowercase() {
        let descriptor = ColumnDescriptor {
            name: "created_at".to_string(),
            generic_type: GenericType::Timestamp,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json, serde_json::json!({"name": "created_at", "type": "timestamp"}));
    }

    #[test]
    fn test_column_meta_from_metadata_row() {
        let row = serde_json::json!({
            "TABLE_NAME": "orders",
            "COLUMN_NAME": "_id",
            "TYPE_NAME": "objectId",
            "KEY_TYPE": "PRIMARY"
        });
        let column: ColumnMeta = serde_json::from_value(row).unwrap();
        assert_eq!(column.table_name, "orders");
        assert_eq!(column.key_type.as_deref(), Some("PRIMARY"));

        let row = serde_json::json!({"TABLE_NAME": "orders", "COLUMN_NAME": "total"});
        let column: ColumnMeta = serde_json::from_value(row).unwrap();
        assert_eq!(column.type_name, None);
        assert_eq!(column.key_type, None);
    }

    #[test]
    fn test_schema_column_serializes_type_key() {
        let column = SchemaColumn {
            name: "c1".to_string(),
            type_name: "int".to_string(),
            attributes: vec![PRIMARY_KEY_ATTRIBUTE.to_string()],
        };
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["type"], "int");
        assert_eq!(json["attributes"][0], "primaryKey");
    }

    #[test]
    fn test_base_table_filters() {
        let filter = TableFilter::base_tables_in_catalog(Some("sales"));
        assert_eq!(filter.catalog.as_deref(), Some("sales"));
        assert_eq!(filter.types, vec!["TABLE".to_string()]);

        let filter = TableFilter::base_tables_in_schema("sales");
        assert_eq!(filter.schema_pattern.as_deref(), Some("sales"));
        assert!(filter.catalog.is_none());
    }
}
