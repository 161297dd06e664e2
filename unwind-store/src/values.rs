//! Value normalization between Postgres rows/parameters and [`SqlValue`]
//!
//! Decoding is driven by the column type reported by the store, so capture
//! reads over arbitrary user tables come back as typed values that persist
//! exactly. Binding goes the other way: a [`SqlValue`] encodes to whatever
//! parameter type the prepared inverse statement declares, erroring on a
//! genuine mismatch instead of coercing lossily.

use crate::numeric::{encode_numeric, PgNumeric};
use crate::{RowSet, StoreResult};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::types::FromSqlOwned;
use tokio_postgres::{Column, Row};
use unwind_core::{SqlValue, StoreError};
use uuid::Uuid;

// ============================================================================
// ROW DECODING
// ============================================================================

/// Decode a full result set. `columns` comes from the prepared statement so
/// the shape is right even for zero-row results.
pub fn decode_row_set(columns: &[Column], rows: &[Row]) -> StoreResult<RowSet> {
    let names = columns.iter().map(|c| c.name().to_string()).collect();
    let decoded = rows
        .iter()
        .map(decode_row)
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(RowSet {
        columns: names,
        rows: decoded,
    })
}

/// Decode one row into normalized values, column order preserved.
pub fn decode_row(row: &Row) -> StoreResult<Vec<SqlValue>> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &Row, idx: usize) -> StoreResult<SqlValue> {
    let ty = row.columns()[idx].type_().clone();

    if ty == Type::BOOL {
        decode_with::<bool, _>(row, idx, SqlValue::Bool)
    } else if ty == Type::INT2 {
        decode_with::<i16, _>(row, idx, |v| SqlValue::Int(v.into()))
    } else if ty == Type::INT4 {
        decode_with::<i32, _>(row, idx, |v| SqlValue::Int(v.into()))
    } else if ty == Type::INT8 {
        decode_with::<i64, _>(row, idx, SqlValue::Int)
    } else if ty == Type::FLOAT4 {
        decode_with::<f32, _>(row, idx, |v| SqlValue::Float(v.into()))
    } else if ty == Type::FLOAT8 {
        decode_with::<f64, _>(row, idx, SqlValue::Float)
    } else if ty == Type::NUMERIC {
        decode_with::<PgNumeric, _>(row, idx, |v| SqlValue::Numeric(v.0))
    } else if ty == Type::TIMESTAMP {
        decode_with::<NaiveDateTime, _>(row, idx, SqlValue::Timestamp)
    } else if ty == Type::TIMESTAMPTZ {
        decode_with::<DateTime<Utc>, _>(row, idx, SqlValue::TimestampTz)
    } else if ty == Type::DATE {
        decode_with::<NaiveDate, _>(row, idx, SqlValue::Date)
    } else if ty == Type::UUID {
        decode_with::<Uuid, _>(row, idx, SqlValue::Uuid)
    } else if ty == Type::JSON || ty == Type::JSONB {
        decode_with::<serde_json::Value, _>(row, idx, SqlValue::Json)
    } else {
        // Text-ish and everything else that the driver renders as text.
        row.try_get::<_, Option<String>>(idx)
            .map(|opt| opt.map(SqlValue::Text).unwrap_or(SqlValue::Null))
            .map_err(|_| StoreError::RowDecode {
                column: row.columns()[idx].name().to_string(),
                reason: format!("unsupported column type {ty}"),
            })
    }
}

fn decode_with<T, F>(row: &Row, idx: usize, wrap: F) -> StoreResult<SqlValue>
where
    T: FromSqlOwned,
    F: FnOnce(T) -> SqlValue,
{
    row.try_get::<_, Option<T>>(idx)
        .map(|opt| opt.map(wrap).unwrap_or(SqlValue::Null))
        .map_err(|e| StoreError::RowDecode {
            column: row.columns()[idx].name().to_string(),
            reason: e.to_string(),
        })
}

// ============================================================================
// PARAMETER BINDING
// ============================================================================

/// Newtype wrapper binding a [`SqlValue`] as a statement parameter.
///
/// `SqlValue` lives in unwind-core, which knows nothing about Postgres, so
/// the `ToSql` impl hangs off this wrapper here.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a SqlValue);

/// Borrow a parameter slice in the shape tokio-postgres expects.
pub fn bind_params(params: &[SqlValue]) -> Vec<PgParam<'_>> {
    params.iter().map(PgParam).collect()
}

fn mismatch(value: &SqlValue, ty: &Type) -> Box<dyn std::error::Error + Sync + Send> {
    Box::new(StoreError::BindMismatch {
        value: format!("{} ({})", value, value.type_name()),
        pg_type: ty.to_string(),
    })
}

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => {
                if *ty == Type::BOOL {
                    b.to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT8 {
                    i.to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    encode_numeric(&i.to_string(), out)?;
                    Ok(IsNull::No)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Float(x) => {
                if *ty == Type::FLOAT4 {
                    (*x as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    x.to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Text(s) => {
                if text_like(ty) {
                    s.as_str().to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Numeric(n) => {
                if *ty == Type::NUMERIC {
                    encode_numeric(n, out)?;
                    Ok(IsNull::No)
                } else if text_like(ty) {
                    n.as_str().to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Timestamp(ts) => {
                if *ty == Type::TIMESTAMP {
                    ts.to_sql(ty, out)
                } else if *ty == Type::TIMESTAMPTZ {
                    DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc).to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::TimestampTz(ts) => {
                if *ty == Type::TIMESTAMPTZ {
                    ts.to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP {
                    ts.naive_utc().to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Date(d) => {
                if *ty == Type::DATE {
                    d.to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Uuid(u) => {
                if *ty == Type::UUID {
                    u.to_sql(ty, out)
                } else if text_like(ty) {
                    u.to_string().to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
            SqlValue::Json(j) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    j.to_sql(ty, out)
                } else {
                    Err(mismatch(self.0, ty))
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Variant/type agreement is checked in to_sql, where the variant
        // is known.
        true
    }

    to_sql_checked!();
}

fn text_like(ty: &Type) -> bool {
    matches!(
        ty.name(),
        "text" | "varchar" | "bpchar" | "name" | "unknown"
    )
}

// =============================================================================
// TESTS
// =============================================================================
