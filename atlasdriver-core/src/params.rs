//! Positional parameter binding.
//!
//! Inlines a parameter list into SQL text: `?` becomes an escaped literal and
//! `??` a backtick-quoted identifier. Placeholders beyond the supplied values
//! are left as they are; values beyond the placeholders are ignored.

use serde_json::Value;

/// Substitutes `params` into the `?`/`??` placeholders of `sql`.
///
/// # Example
/// ```rust
/// use atlasdriver_core::params::bind_params;
/// use serde_json::json;
///
/// let sql = bind_params("SELECT ?? FROM orders WHERE status = ?", &[json!("total"), json!("paid")]);
/// assert_eq!(sql, "SELECT `total` FROM orders WHERE status = 'paid'");
/// ```
pub fn bind_params(sql: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }

    let mut output = String::with_capacity(sql.len() + params.len() * 8);
    let mut values = params.iter();
    let mut rest = sql;

    while let Some(position) = rest.find('?') {
        let is_identifier = rest[position + 1..].starts_with('?');
        let width = if is_identifier { 2 } else { 1 };

        let Some(value) = values.next() else {
            break;
        };

        output.push_str(&rest[..position]);
        if is_identifier {
            output.push_str(&escape_identifier_value(value));
        } else {
            output.push_str(&escape_value(value));
        }
        rest = &rest[position + width..];
    }

    output.push_str(rest);
    output
}

/// Renders a JSON value as a SQL literal.
pub fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => escape_string(text),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(_) => format!("({})", escape_value(item)),
                other => escape_value(other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, item)| format!("{} = {}", escape_identifier(key), escape_value(item)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Quotes and escapes a string literal.
pub fn escape_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('\'');
    for ch in text.chars() {
        match ch {
            '\0' => escaped.push_str("\\0"),
            '\u{8}' => escaped.push_str("\\b"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\u{1a}' => escaped.push_str("\\Z"),
            '"' => escaped.push_str("\\\""),
            '\'' => escaped.push_str("\\'"),
            '\\' => escaped.push_str("\\\\"),
            other => escaped.push(other),
        }
    }
    escaped.push('\'');
    escaped
}

/// Backtick-quotes an identifier; dotted names are quoted per part.
pub fn escape_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("`{}`", part.replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

fn escape_identifier_value(value: &Value) -> String {
    match value {
        Value::String(name) => escape_identifier(name),
        Value::Array(items) => items
            .iter()
            .map(escape_identifier_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => escape_identifier(&other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_params_returns_sql_unchanged() {
        assert_eq!(bind_params("SELECT ? FROM t", &[]), "SELECT ? FROM t");
    }

    #[test]
    fn test_scalar_literals() {
        let sql = bind_params(
            "VALUES (?, ?, ?, ?, ?)",
            &[json!(null), json!(true), json!(42), json!(1.5), json!("x")],
        );
        assert_eq!(sql, "VALUES (NULL, true, 42, 1.5, 'x')");
    }

    #[test]
    fn test_string_escaping() {
        let escaped = escape_string("it's a \"quote\"\n\\path\0\u{1a}");
        assert_eq!(escaped, "'it\\'s a \\\"quote\\\"\\n\\\\path\\0\\Z'");
    }

    #[test]
    fn test_injection_attempt_stays_inside_literal() {
        let sql = bind_params("SELECT * FROM users WHERE name = ?", &[json!("x' OR '1'='1")]);
        assert_eq!(sql, "SELECT * FROM users WHERE name = 'x\\' OR \\'1\\'=\\'1'");
    }

    #[test]
    fn test_identifier_placeholder() {
        let sql = bind_params("SELECT ?? FROM ??", &[json!("total"), json!("sales.orders")]);
        assert_eq!(sql, "SELECT `total` FROM `sales`.`orders`");

        assert_eq!(escape_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_arrays_and_objects() {
        let sql = bind_params("WHERE id IN (?)", &[json!([1, 2, 3])]);
        assert_eq!(sql, "WHERE id IN (1, 2, 3)");

        let nested = escape_value(&json!([[1, "a"], [2, "b"]]));
        assert_eq!(nested, "(1, 'a'), (2, 'b')");

        let object = escape_value(&json!({"status": "paid", "total": 10}));
        assert_eq!(object, "`status` = 'paid', `total` = 10");
    }

    #[test]
    fn test_surplus_placeholders_and_values() {
        assert_eq!(bind_params("? AND ?", &[json!(1)]), "1 AND ?");
        assert_eq!(bind_params("?", &[json!(1), json!(2)]), "1");
    }
}
