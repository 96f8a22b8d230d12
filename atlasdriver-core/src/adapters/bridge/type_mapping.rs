//! JDBC type names to generic types.

use crate::models::GenericType;

/// Classifies a lowercase type name reported by the JDBC bridge.
///
/// The Atlas JDBC driver reports BSON names (`string`, `int`, `long`,
/// `date`, ...); portable SQL spellings are accepted as well.
pub(crate) fn classify(name: &str) -> Option<GenericType> {
    let generic = match name {
        "varchar" | "character varying" | "nvarchar" | "char" | "character" | "string"
        | "text" | "enum" | "objectid" | "object" | "array" | "bindata" | "uuid" => {
            GenericType::Text
        }
        "int" | "integer" | "int4" | "int2" | "smallint" | "tinyint" => GenericType::Int,
        "long" | "bigint" | "int8" => GenericType::Bigint,
        "double" | "double precision" | "float8" => GenericType::Double,
        "float" | "float4" | "real" => GenericType::Float,
        "decimal" | "numeric" => GenericType::Decimal,
        "bool" | "boolean" | "bit" => GenericType::Boolean,
        // BSON dates carry a time component
        "date" | "datetime" | "timestamp" | "timestamp without time zone"
        | "timestamp with time zone" => GenericType::Timestamp,
        "time" => GenericType::Time,
        _ => return None,
    };
    Some(generic)
}
