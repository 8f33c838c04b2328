use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of column types the generator reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Text,
    Decimal,
    Timestamp,
    Boolean,
}

impl SemanticType {
    pub fn as_str(self) -> &'static str {
        match self {
            SemanticType::Integer => "integer",
            SemanticType::Text => "text",
            SemanticType::Decimal => "decimal",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a declared column type to its semantic type.
///
/// Matching is case-insensitive and keyed on the first word of the declared
/// type with any size suffix removed, so `VARCHAR(255)`, `character varying`
/// and `timestamp with time zone` all resolve by their leading word.
/// Types outside the known families fall back to [`SemanticType::Text`].
pub fn normalize_type(raw: &str) -> SemanticType {
    let lower = raw.trim().to_ascii_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c == '[' || c.is_whitespace())
        .next()
        .unwrap_or("");

    match base {
        "bool" | "boolean" => SemanticType::Boolean,

        // `interval` would otherwise be caught by the `int` prefix below.
        "interval" => SemanticType::Text,
        "integer" | "smallint" | "bigint" | "tinyint" | "mediumint" | "serial"
        | "smallserial" | "bigserial" => SemanticType::Integer,
        b if b.starts_with("int") || b.starts_with("serial") => SemanticType::Integer,

        "decimal" | "numeric" | "real" | "double" | "money" | "number" => SemanticType::Decimal,
        b if b.starts_with("float") => SemanticType::Decimal,

        "date" | "smalldatetime" => SemanticType::Timestamp,
        b if b.starts_with("timestamp") || b.starts_with("datetime") || b.starts_with("time") => {
            SemanticType::Timestamp
        }

        _ => SemanticType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_string_family_to_text() {
        for raw in ["VARCHAR(255)", "char(2)", "character varying", "text", "nvarchar(max)"] {
            assert_eq!(normalize_type(raw), SemanticType::Text, "{raw}");
        }
    }

    #[test]
    fn maps_integer_family() {
        for raw in ["INT", "integer", "bigint", "SMALLINT", "int8", "serial", "BIGSERIAL"] {
            assert_eq!(normalize_type(raw), SemanticType::Integer, "{raw}");
        }
    }

    #[test]
    fn maps_numeric_family_to_decimal() {
        for raw in ["decimal(10,2)", "NUMERIC", "real", "double precision", "float8"] {
            assert_eq!(normalize_type(raw), SemanticType::Decimal, "{raw}");
        }
    }

    #[test]
    fn maps_temporal_family_to_timestamp() {
        for raw in ["timestamp", "TIMESTAMPTZ", "date", "datetime", "time with time zone"] {
            assert_eq!(normalize_type(raw), SemanticType::Timestamp, "{raw}");
        }
    }

    #[test]
    fn maps_boolean_family() {
        assert_eq!(normalize_type("BOOL"), SemanticType::Boolean);
        assert_eq!(normalize_type("boolean"), SemanticType::Boolean);
    }

    #[test]
    fn unknown_and_lookalike_types_fall_back_to_text() {
        assert_eq!(normalize_type("interval"), SemanticType::Text);
        assert_eq!(normalize_type("uuid"), SemanticType::Text);
        assert_eq!(normalize_type("jsonb"), SemanticType::Text);
        assert_eq!(normalize_type(""), SemanticType::Text);
    }
}
