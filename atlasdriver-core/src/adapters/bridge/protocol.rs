//! Wire format spoken with the bridge sidecar.
//!
//! One JSON object per line in each direction. Requests carry a numeric
//! `id` echoed back by the matching response, so several calls (an
//! `execute` and the `cancel` aimed at it) may be in flight at once.
//!
//! ```text
//! -> {"id":7,"method":"execute","params":{"statementId":"..","sql":"..","queryTimeout":600}}
//! <- {"id":7,"result":{"cursorId":"..","columns":[{"name":"a","typeName":"int"}]}}
//! <- {"id":8,"error":{"message":"Statement failed","cause":{"message":"no such table"}}}
//! ```

use crate::models::{RawColumn, Row, TableFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JDBC driver class the bridge loads.
pub const DRIVER_CLASS: &str = "com.mongodb.jdbc.MongoDriver";

/// Method names understood by the sidecar.
pub(crate) mod method {
    pub(crate) const CONNECT: &str = "connect";
    pub(crate) const IS_VALID: &str = "isValid";
    pub(crate) const EXECUTE: &str = "execute";
    pub(crate) const FETCH: &str = "fetch";
    pub(crate) const CLOSE_CURSOR: &str = "closeCursor";
    pub(crate) const CANCEL: &str = "cancel";
    pub(crate) const GET_TABLES: &str = "getTables";
    pub(crate) const GET_COLUMNS: &str = "getColumns";
    pub(crate) const CLOSE: &str = "close";
}

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub(crate) id: u64,
    pub(crate) method: &'a str,
    pub(crate) params: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Option<Value>,
    #[serde(default)]
    pub(crate) error: Option<RemoteError>,
}

/// Error reported by the sidecar, possibly wrapping the driver's own error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<RemoteError>>,
}

impl RemoteError {
    /// Message of the immediate cause when present, else the error's own.
    pub fn into_message(self) -> String {
        match self.cause {
            Some(cause) => cause.message,
            None => self.message,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConnectParams<'a> {
    pub(crate) url: &'a str,
    pub(crate) driver: &'a str,
    pub(crate) properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IsValidParams {
    pub(crate) timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecuteParams<'a> {
    pub(crate) statement_id: &'a str,
    pub(crate) sql: &'a str,
    pub(crate) query_timeout: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecuteResult {
    pub(crate) cursor_id: String,
    #[serde(default)]
    pub(crate) columns: Vec<RawColumn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FetchParams<'a> {
    pub(crate) cursor_id: &'a str,
    pub(crate) max_rows: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FetchResult {
    #[serde(default)]
    pub(crate) rows: Vec<Row>,
    #[serde(default)]
    pub(crate) done: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorParams<'a> {
    pub(crate) cursor_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CancelParams<'a> {
    pub(crate) statement_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetTablesParams<'a> {
    pub(crate) catalog: Option<&'a str>,
    pub(crate) schema_pattern: Option<&'a str>,
    pub(crate) table_name_pattern: Option<&'a str>,
    pub(crate) types: &'a [String],
}

impl<'a> From<&'a TableFilter> for GetTablesParams<'a> {
    fn from(filter: &'a TableFilter) -> Self {
        Self {
            catalog: filter.catalog.as_deref(),
            schema_pattern: filter.schema_pattern.as_deref(),
            table_name_pattern: filter.table_name_pattern.as_deref(),
            types: &filter.types,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetColumnsParams<'a> {
    pub(crate) catalog: Option<&'a str>,
    pub(crate) schema_pattern: Option<&'a str>,
    pub(crate) table_name_pattern: &'a str,
    pub(crate) column_name_pattern: Option<&'a str>,
}
