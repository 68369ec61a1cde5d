//! PostgreSQL connector.
//!
//! Opens one connection per execution, runs the query over the simple query
//! protocol and cancels through `pg_cancel_backend` from a side connection.

mod runner;
mod values;

pub use runner::{PostgresFactory, PostgresRunner, DEFAULT_PORT};

use sqlx::postgres::PgDatabaseError;

use crate::error::RunnerError;
use crate::runner::{CanonicalType, TypeMapping};

/// PostgreSQL type names, as sqlx reports them lower-cased, and their
/// canonical types. sqlx uses the internal names (`int4`, `float8`, `bool`),
/// and reports `bpchar` columns as `char`.
pub const PG_TYPES: TypeMapping = TypeMapping::new(&[
    ("bool", CanonicalType::Boolean),
    ("int2", CanonicalType::Integer),
    ("int4", CanonicalType::Integer),
    ("int8", CanonicalType::Integer),
    ("numeric", CanonicalType::Integer),
    ("float4", CanonicalType::Float),
    ("float8", CanonicalType::Float),
    ("text", CanonicalType::String),
    ("varchar", CanonicalType::String),
    ("char", CanonicalType::String),
    ("name", CanonicalType::String),
    ("uuid", CanonicalType::String),
    ("json", CanonicalType::String),
    ("jsonb", CanonicalType::String),
    ("date", CanonicalType::Date),
    ("timestamp", CanonicalType::Datetime),
    ("timestamptz", CanonicalType::Datetime),
]);

/// SQLSTATE class 28: invalid authorization specification.
fn is_auth_failure(code: Option<&str>) -> bool {
    matches!(code, Some(code) if code.starts_with("28"))
}

/// Classifies an error raised while connecting.
///
/// Rejected credentials are auth errors; everything else, including server
/// errors such as an unknown database, means the connection could not be made.
pub fn classify_connect_error(error: sqlx::Error) -> RunnerError {
    match &error {
        sqlx::Error::Database(db) if is_auth_failure(db.code().as_deref()) => {
            RunnerError::auth(db.message().to_string())
        }
        sqlx::Error::Database(db) => RunnerError::connection(db.message().to_string()),
        sqlx::Error::Configuration(e) => RunnerError::config(e.to_string()),
        _ => RunnerError::connection(error.to_string()),
    }
}

/// Classifies an error raised while a query runs.
///
/// Server errors keep their message plus any detail and hint; transport
/// failures mean the connection dropped mid-query.
pub fn classify_query_error(error: sqlx::Error) -> RunnerError {
    match &error {
        sqlx::Error::Database(db) => RunnerError::query(format_database_error(db.as_ref())),
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            RunnerError::connection(error.to_string())
        }
        _ => RunnerError::query(format!("Unspecified DatabaseError: {error}")),
    }
}

/// Formats a server error with its detail and hint, when present.
fn format_database_error(db: &dyn sqlx::error::DatabaseError) -> String {
    let mut result = db.message().to_string();

    if let Some(pg_error) = db.try_downcast_ref::<PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\nDETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\nHINT: ");
            result.push_str(hint);
        }
    }

    result
}
