//! Trino client REST protocol types.
//!
//! A statement is submitted with `POST /v1/statement`; the server answers with
//! a `QueryResults` document whose `nextUri` is polled until it disappears.
//! Data pages and column descriptors arrive along the way, and a failed query
//! carries an `error` object instead.

use serde::Deserialize;
use serde_json::Value;

use crate::error::RunnerError;

/// One page of the statement protocol.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<ColumnDescriptor>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub stats: Option<StatementStats>,
    /// Kept as raw JSON; only the nested failure message is interpreted.
    #[serde(default)]
    pub error: Option<Value>,
}

impl QueryResults {
    pub fn state(&self) -> &str {
        self.stats.as_ref().map(|s| s.state.as_str()).unwrap_or("UNKNOWN")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementStats {
    pub state: String,
}

/// Column metadata as reported by Trino.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub type_signature: Option<TypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSignature {
    pub raw_type: String,
}

impl ColumnDescriptor {
    /// The type name without parameters: `varchar(10)` is `varchar`.
    pub fn base_type(&self) -> &str {
        match &self.type_signature {
            Some(sig) => &sig.raw_type,
            None => self
                .type_name
                .split('(')
                .next()
                .unwrap_or(&self.type_name)
                .trim(),
        }
    }
}

/// Failures of the statement protocol, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum TrinoError {
    /// Non-success HTTP status.
    Http { status: u16, body: String },
    /// The request never produced a response.
    Transport(String),
    /// The query failed on the server; holds the raw `error` object.
    QueryFailed(Value),
    /// A response that does not follow the protocol.
    Protocol(String),
    Cancelled,
}

/// Longest HTTP body excerpt included in an error message.
const MAX_BODY_EXCERPT: usize = 200;

/// Maps a protocol failure onto the shared error taxonomy.
pub fn classify(error: TrinoError) -> RunnerError {
    match error {
        TrinoError::Http { status, .. } if status == 401 || status == 403 => {
            RunnerError::auth(format!("Trino rejected the access token (HTTP {status})"))
        }
        TrinoError::Http { status, body } => {
            let excerpt: String = body.chars().take(MAX_BODY_EXCERPT).collect();
            RunnerError::connection(format!("Trino returned HTTP {status}: {excerpt}"))
        }
        TrinoError::Transport(msg) => RunnerError::connection(msg),
        TrinoError::QueryFailed(payload) => RunnerError::query(database_error_message(&payload)),
        TrinoError::Protocol(msg) => {
            RunnerError::connection(format!("Invalid response from Trino: {msg}"))
        }
        TrinoError::Cancelled => RunnerError::Cancelled,
    }
}

/// Extracts the human readable message from a query error payload.
///
/// Structured payloads yield `failureInfo.message`; anything else falls back to
/// `Unspecified DatabaseError: {raw}`.
pub fn database_error_message(payload: &Value) -> String {
    payload
        .get("failureInfo")
        .and_then(|info| info.get("message"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| {
            let raw = match payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("Unspecified DatabaseError: {raw}")
        })
}
