//! SQL value representation
//!
//! [`SqlValue`] is the single value type that crosses the capture/persist/
//! replay boundary. Every variant round-trips exactly through serde_json:
//! timestamps serialize as canonical ISO-8601 text and arbitrary-precision
//! numerics as exact decimal text, never as binary floats, so a value
//! captured before an operation binds back to the same value in a later
//! inverse statement.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single SQL value, decoded from a store row or bound as a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// BOOLEAN.
    Bool(bool),
    /// SMALLINT / INTEGER / BIGINT, widened to i64.
    Int(i64),
    /// REAL / DOUBLE PRECISION. Inherently approximate; kept as f64.
    Float(f64),
    /// TEXT / VARCHAR / CHAR.
    Text(String),
    /// NUMERIC / DECIMAL as exact decimal text (e.g. "12345.6789").
    Numeric(String),
    /// TIMESTAMP WITHOUT TIME ZONE.
    Timestamp(NaiveDateTime),
    /// TIMESTAMP WITH TIME ZONE, normalized to UTC.
    TimestampTz(DateTime<Utc>),
    /// DATE.
    Date(NaiveDate),
    /// UUID.
    Uuid(Uuid),
    /// JSON / JSONB.
    Json(serde_json::Value),
}

impl SqlValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short type tag for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Numeric(_) => "numeric",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
            SqlValue::Date(_) => "date",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Json(_) => "json",
        }
    }
}

/// Human-readable rendering for logs and error messages only. Values are
/// always bound as parameters; this output is never spliced into SQL.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Text(s) => write!(f, "'{}'", s),
            SqlValue::Numeric(n) => write!(f, "{}", n),
            SqlValue::Timestamp(ts) => write!(f, "'{}'", ts),
            SqlValue::TimestampTz(ts) => write!(f, "'{}'", ts.to_rfc3339()),
            SqlValue::Date(d) => write!(f, "'{}'", d),
            SqlValue::Uuid(u) => write!(f, "'{}'", u),
            SqlValue::Json(j) => write!(f, "'{}'", j),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn roundtrip(v: &SqlValue) -> SqlValue {
        let json = serde_json::to_string(v).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_serde_roundtrip_scalars() {
        for v in [
            SqlValue::Null,
            SqlValue::Bool(true),
            SqlValue::Int(-9_223_372_036_854_775_808),
            SqlValue::Text("o'brien".to_string()),
            SqlValue::Uuid(Uuid::nil()),
        ] {
            assert_eq!(roundtrip(&v), v);
        }
    }

    #[test]
    fn test_numeric_preserved_as_exact_text() {
        let v = SqlValue::Numeric("12345678901234567890.000000000001".to_string());
        let json = serde_json::to_string(&v).unwrap();
        // The digits must survive as a string, not a lossy float.
        assert!(json.contains("\"12345678901234567890.000000000001\""));
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(14, 30, 15, 123_456)
            .unwrap();
        let v = SqlValue::Timestamp(ts);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_date_roundtrip() {
        let v = SqlValue::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap());
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_display_renders_null_unquoted() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Int(7).to_string(), "7");
        assert_eq!(SqlValue::Text("x".into()).to_string(), "'x'");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(SqlValue::Numeric("1".into()).type_name(), "numeric");
        assert_eq!(SqlValue::Null.type_name(), "null");
    }
}
