//! Error types for query runners.
//!
//! Defines the error taxonomy shared by every connector. Connector-specific
//! failures are classified into one of these variants before they leave the
//! connector.

use thiserror::Error;

/// Main error type for query runner operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// Missing or invalid settings, detected before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential acquisition failed (token endpoint rejected us, bad secret, etc.)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The backend could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed the query.
    #[error("Query error: {0}")]
    Query(String),

    /// The schema introspection query failed.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Execution was cancelled by the caller or by a timeout.
    #[error("Query cancelled")]
    Cancelled,

    /// No connector is registered under the requested type name.
    #[error("Unknown query runner type: {0}")]
    NotFound(String),

    /// Organization settings store errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunnerError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an authentication error with the given message.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a schema introspection error with the given message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates a not-found error for the given runner type.
    pub fn not_found(type_name: impl Into<String>) -> Self {
        Self::NotFound(type_name.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration Error",
            Self::Auth(_) => "Authentication Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Schema(_) => "Schema Error",
            Self::Cancelled => "Cancelled",
            Self::NotFound(_) => "Not Found",
            Self::Persistence(_) => "Persistence Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using RunnerError.
pub type Result<T> = std::result::Result<T, RunnerError>;
