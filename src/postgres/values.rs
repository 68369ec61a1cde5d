//! Decoding of PostgreSQL row values into JSON.
//!
//! Rows arrive over the simple query protocol, so every value is in text
//! format. Known types are decoded into their JSON shape; anything else is
//! passed through as the server's text representation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use tracing::debug;

use crate::runner::NativeColumn;

/// Column descriptors of a row, with lower-cased type names.
pub fn row_columns(row: &PgRow) -> Vec<NativeColumn> {
    row.columns()
        .iter()
        .map(|col| NativeColumn::new(col.name(), col.type_info().name().to_lowercase()))
        .collect()
}

/// Converts every value of a row.
pub fn convert_row(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Converts a single column value.
pub fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" => decode::<bool>(row, index).map(Value::Bool),

        "INT2" => decode::<i16>(row, index).map(|v| Value::from(i64::from(v))),

        "INT4" => decode::<i32>(row, index).map(|v| Value::from(i64::from(v))),

        "INT8" => decode::<i64>(row, index).map(Value::from),

        "FLOAT4" => decode::<f32>(row, index).map(|v| float(f64::from(v))),

        "FLOAT8" => decode::<f64>(row, index).map(float),

        "NUMERIC" => decode::<Decimal>(row, index).map(decimal),

        "DATE" => decode::<chrono::NaiveDate>(row, index)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),

        "TIMESTAMP" => decode::<chrono::NaiveDateTime>(row, index)
            .map(|ts| Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),

        "TIMESTAMPTZ" => decode::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|ts| Value::String(ts.to_rfc3339())),

        "JSON" | "JSONB" => decode::<Value>(row, index),

        "UUID" => decode::<uuid::Uuid>(row, index).map(|u| Value::String(u.to_string())),

        "BYTEA" => decode::<Vec<u8>>(row, index).map(|bytes| Value::String(hex(&bytes))),

        _ => text(row, index),
    }
    .unwrap_or(Value::Null)
}

/// The raw text of a value, whatever its declared type.
fn text(row: &PgRow, index: usize) -> Option<Value> {
    match row.try_get_unchecked::<Option<String>, _>(index) {
        Ok(value) => value.map(Value::String),
        Err(e) => {
            debug!("Could not decode column {} as text: {}", index, e);
            None
        }
    }
}

/// Non-finite floats have no JSON form and become `null`.
fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Whole numerics stay integers, fractional ones become floats.
fn decimal(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
    }
    d.to_f64().map(float).unwrap_or(Value::Null)
}

/// Formats bytes the way PostgreSQL prints `bytea` in hex output mode.
fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
