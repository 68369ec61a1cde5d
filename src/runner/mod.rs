//! The query runner contract.
//!
//! A [`RunnerFactory`] describes a connector type (name, configuration
//! schema, capability probe) and builds [`QueryRunner`] instances bound to one
//! validated [`ConnectorConfig`]. The scheduler only ever talks to these two
//! traits plus [`run_query`], which turns a runner's tagged errors into the
//! `(data, error)` outcome and lets cancellation through.

pub mod mock;
pub mod registry;
pub mod settings;
pub mod types;

pub use mock::{MockQueryRunner, MockRunnerFactory};
pub use registry::Registry;
pub use settings::{ConfigurationSchema, ConnectorConfig, SettingDescriptor, SettingType};
pub use types::{
    CanonicalColumn, CanonicalResult, CanonicalType, NativeColumn, Row, SchemaEntry, TypeMapping,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, RunnerError};

/// Identity reported to the backend when the caller is unknown.
pub const ANONYMOUS_USER: &str = "no_user";

/// Schemas left out of introspection.
pub const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema"];

/// Query run by [`QueryRunner::test_connection`] unless a connector overrides it.
pub const NOOP_QUERY: &str = "SELECT 1";

/// The user on whose behalf a query runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl CallerIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
        }
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|s| !s.trim().is_empty())
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Returns the user name a connection should identify as.
pub fn session_user(caller: Option<&CallerIdentity>) -> &str {
    caller.and_then(CallerIdentity::email).unwrap_or(ANONYMOUS_USER)
}

/// Prefixes `query` with a provenance comment naming the caller.
///
/// The tag is only added when both name and email are known. Every `/` in the
/// JSON payload is escaped as `\/`, so the payload can neither close the
/// comment nor open a nested one.
pub fn tag_query(query: &str, caller: Option<&CallerIdentity>) -> String {
    #[derive(Serialize)]
    struct Tag<'a> {
        name: &'a str,
        email: &'a str,
    }

    let Some(tag) = caller.and_then(|c| {
        Some(Tag {
            name: c.name()?,
            email: c.email()?,
        })
    }) else {
        return query.to_string();
    };

    let payload = match serde_json::to_string(&tag) {
        Ok(json) => json.replace('/', "\\/"),
        Err(_) => return query.to_string(),
    };

    format!("/* {payload} */\n{query}")
}

/// Per-execution state, traced as a runner moves through an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Connecting,
    Executing,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A connector instance bound to one configuration.
///
/// Instances are not meant for overlapping executions; the scheduler runs one
/// execution at a time per instance.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Connector type name, e.g. `azure_trino`.
    fn type_name(&self) -> &'static str;

    /// Executes `query` and returns the full canonical result.
    ///
    /// Implementations must check `cancel` while blocked on the backend,
    /// request a backend-side cancel when it fires, and return
    /// [`RunnerError::Cancelled`].
    async fn execute(
        &self,
        query: &str,
        caller: Option<&CallerIdentity>,
        cancel: &CancellationToken,
    ) -> Result<CanonicalResult>;

    /// Lists tables and their columns, excluding system schemas.
    async fn get_schema(&self, cancel: &CancellationToken) -> Result<Vec<SchemaEntry>>;

    /// The cheapest query the backend accepts.
    fn noop_query(&self) -> &str {
        NOOP_QUERY
    }

    /// Checks that the backend is reachable with the configured credentials
    /// by running [`QueryRunner::noop_query`] anonymously.
    async fn test_connection(&self, cancel: &CancellationToken) -> Result<()> {
        debug!("Testing {} connection", self.type_name());
        self.execute(self.noop_query(), None, cancel).await.map(|_| ())
    }
}

/// Describes a connector type and builds its runners.
pub trait RunnerFactory: Send + Sync {
    /// Connector type name used as the registry key.
    fn type_name(&self) -> &'static str;

    /// Human readable connector name.
    fn name(&self) -> &'static str;

    /// Capability probe. Called once at registration; the result is cached.
    fn probe(&self) -> bool {
        true
    }

    fn configuration_schema(&self) -> ConfigurationSchema;

    /// Builds a runner from validated settings.
    fn create(&self, config: ConnectorConfig) -> Result<Box<dyn QueryRunner>>;
}

/// The scheduler-facing outcome of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Serialized [`CanonicalResult`] on success.
    pub data: Option<String>,
    /// Human readable failure message.
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success(data: String) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Signal that an execution was cancelled. Never converted into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Query cancelled")]
pub struct Cancelled;

/// Runs a query and reports `(data, error)`.
///
/// Every failure except cancellation becomes an error message; cancellation is
/// returned as `Err(Cancelled)` so the caller's own bookkeeping stays correct.
pub async fn run_query(
    runner: &dyn QueryRunner,
    query: &str,
    caller: Option<&CallerIdentity>,
    cancel: &CancellationToken,
) -> std::result::Result<RunOutcome, Cancelled> {
    debug!("Running {} query as {}", runner.type_name(), session_user(caller));

    let result = runner.execute(query, caller, cancel).await;

    match result {
        Ok(result) => match result.to_json() {
            Ok(json) => {
                info!(
                    "{} query succeeded: {} columns, {} rows",
                    runner.type_name(),
                    result.columns.len(),
                    result.rows.len()
                );
                Ok(RunOutcome::success(json))
            }
            Err(e) => Ok(RunOutcome::failure(error_message(&e))),
        },
        Err(RunnerError::Cancelled) => {
            info!("{} query cancelled", runner.type_name());
            Err(Cancelled)
        }
        Err(e) => {
            warn!("{} query failed ({})", runner.type_name(), e.category());
            Ok(RunOutcome::failure(error_message(&e)))
        }
    }
}

/// Runs an information-schema style `query` returning `table_schema`,
/// `table_name` and `column_name`, and groups the rows into schema entries.
///
/// Any failure other than cancellation becomes [`RunnerError::Schema`].
pub async fn introspect<R>(
    runner: &R,
    query: &str,
    excluded_schemas: &[&str],
    cancel: &CancellationToken,
) -> Result<Vec<SchemaEntry>>
where
    R: QueryRunner + ?Sized,
{
    match runner.execute(query, None, cancel).await {
        Ok(result) => Ok(types::group_schema(
            types::schema_rows(&result)?,
            excluded_schemas,
        )),
        Err(RunnerError::Cancelled) => Err(RunnerError::Cancelled),
        Err(e) => {
            warn!("{} schema introspection failed: {}", runner.type_name(), e);
            Err(RunnerError::schema(format!(
                "Failed getting schema: {}",
                error_message(&e)
            )))
        }
    }
}

/// The message reported to users for a failed execution.
///
/// Query errors are reported as the backend's own message, other variants
/// carry their category prefix.
pub fn error_message(error: &RunnerError) -> String {
    match error {
        RunnerError::Query(msg) => msg.clone(),
        RunnerError::Configuration(_)
        | RunnerError::Auth(_)
        | RunnerError::Connection(_)
        | RunnerError::Schema(_)
        | RunnerError::NotFound(_)
        | RunnerError::Persistence(_)
        | RunnerError::Internal(_)
        | RunnerError::Cancelled => error.to_string(),
    }
}
