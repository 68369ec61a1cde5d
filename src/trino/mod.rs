//! Trino connector.
//!
//! Speaks the Trino client REST protocol over HTTPS and authenticates with an
//! Azure AD bearer token.

pub mod client;
pub mod mock;
pub mod protocol;
mod runner;

pub use client::{HttpTransport, Session, TrinoTransport};
pub use mock::MockTransport;
pub use protocol::{classify, database_error_message, TrinoError};
pub use runner::{AzureTrinoFactory, AzureTrinoRunner, AZURE_TRINO_SCOPE};

use crate::runner::{CanonicalType, TypeMapping};

/// Trino base type names and their canonical types.
///
/// `decimal` lands in the integer bucket; values keep their precision, only
/// the declared column type is coarse.
pub const TRINO_TYPES: TypeMapping = TypeMapping::new(&[
    ("boolean", CanonicalType::Boolean),
    ("tinyint", CanonicalType::Integer),
    ("smallint", CanonicalType::Integer),
    ("integer", CanonicalType::Integer),
    ("long", CanonicalType::Integer),
    ("bigint", CanonicalType::Integer),
    ("float", CanonicalType::Float),
    ("real", CanonicalType::Float),
    ("double", CanonicalType::Float),
    ("decimal", CanonicalType::Integer),
    ("varchar", CanonicalType::String),
    ("char", CanonicalType::String),
    ("string", CanonicalType::String),
    ("json", CanonicalType::String),
    ("varbinary", CanonicalType::String),
    ("date", CanonicalType::Date),
    ("timestamp", CanonicalType::Datetime),
]);
