//! BSON type names to generic types.
//!
//! Column types on the wire backend are BSON type names, either inferred
//! from result documents or reported by `sqlGetSchema`.

use crate::models::GenericType;
#[cfg(feature = "wire")]
use mongodb::bson::Bson;

/// Classifies a lowercase BSON type name.
pub(crate) fn classify(name: &str) -> Option<GenericType> {
    let generic = match name {
        "string" | "objectid" | "object" | "array" | "bindata" | "regex" | "symbol"
        | "javascript" | "uuid" => GenericType::Text,
        "int" | "int32" => GenericType::Int,
        "long" | "int64" => GenericType::Bigint,
        "double" => GenericType::Double,
        "decimal" | "decimal128" => GenericType::Decimal,
        "bool" | "boolean" => GenericType::Boolean,
        "date" | "timestamp" => GenericType::Timestamp,
        _ => return None,
    };
    Some(generic)
}

/// Returns the BSON type name for a value, as `$type` would report it.
#[cfg(feature = "wire")]
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Double(_) => "double",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Null | Bson::Undefined => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}
