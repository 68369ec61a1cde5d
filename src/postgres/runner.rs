//! The `pg` connector: PostgreSQL over sqlx, one connection per execution.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Column, Connection, Executor, Statement, TypeInfo};
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::values::{convert_row, row_columns};
use super::{classify_connect_error, classify_query_error, PG_TYPES};
use crate::error::{Result, RunnerError};
use crate::runner::types::{self, NativeColumn};
use crate::runner::{
    introspect, session_user, tag_query, CallerIdentity, CanonicalResult, ConfigurationSchema,
    ConnectorConfig, ExecutionState, QueryRunner, RunnerFactory, SchemaEntry, SettingDescriptor,
    SYSTEM_SCHEMAS,
};

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Upper bound on the side connection used to cancel a running query.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_QUERY: &str = r#"
SELECT
    table_schema::text AS table_schema,
    table_name::text AS table_name,
    column_name::text AS column_name
FROM information_schema.columns
WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY table_schema, table_name, ordinal_position
"#;

/// Runner bound to one `pg` configuration.
pub struct PostgresRunner {
    config: ConnectorConfig,
}

impl PostgresRunner {
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    /// Builds connect options from the settings.
    ///
    /// The caller's session user travels as the connection's application name.
    pub fn connect_options(&self, caller: Option<&CallerIdentity>) -> Result<PgConnectOptions> {
        let host = self
            .config
            .get_str("host")
            .ok_or_else(|| RunnerError::config("Missing required setting 'host'"))?;
        let dbname = self
            .config
            .get_str("dbname")
            .ok_or_else(|| RunnerError::config("Missing required setting 'dbname'"))?;

        let port = match self.config.get_u64("port") {
            Some(port) => u16::try_from(port)
                .map_err(|_| RunnerError::config(format!("Invalid port {port}")))?,
            None => DEFAULT_PORT,
        };

        let sslmode = self.config.get_str("sslmode").unwrap_or("prefer");
        let ssl_mode = PgSslMode::from_str(sslmode)
            .map_err(|_| RunnerError::config(format!("Invalid sslmode '{sslmode}'")))?;

        let mut options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(dbname)
            .ssl_mode(ssl_mode)
            .application_name(session_user(caller));

        if let Some(user) = self.config.get_str("user") {
            options = options.username(user);
        }
        if let Some(password) = self.config.get_str("password") {
            options = options.password(password);
        }

        Ok(options)
    }

    fn transition(&self, state: ExecutionState) {
        debug!("pg execution {}", state.as_str());
    }

    async fn connect(
        &self,
        options: &PgConnectOptions,
        cancel: &CancellationToken,
    ) -> Result<PgConnection> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
            conn = PgConnection::connect_with(options) => conn.map_err(classify_connect_error),
        }
    }

    /// Asks the server to cancel the query running on backend `pid`.
    ///
    /// Best effort: failures are logged and otherwise ignored.
    async fn cancel_backend(&self, options: &PgConnectOptions, pid: i32) {
        let attempt = async {
            let mut side = PgConnection::connect_with(options).await?;
            sqlx::query("SELECT pg_cancel_backend($1)")
                .bind(pid)
                .execute(&mut side)
                .await?;
            side.close().await
        };

        match tokio::time::timeout(CANCEL_TIMEOUT, attempt).await {
            Ok(Ok(())) => info!("Cancelled pg backend {}", pid),
            Ok(Err(e)) => warn!("Failed to cancel pg backend {}: {}", pid, e),
            Err(_) => warn!("Timed out cancelling pg backend {}", pid),
        }
    }

    /// Column descriptors of a statement that returned no rows.
    ///
    /// Multi-statement queries cannot be prepared; they report no columns.
    async fn describe_columns(conn: &mut PgConnection, sql: &str) -> Vec<NativeColumn> {
        match conn.prepare(sql).await {
            Ok(statement) => statement
                .columns()
                .iter()
                .map(|col| NativeColumn::new(col.name(), col.type_info().name().to_lowercase()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result: {}", e);
                Vec::new()
            }
        }
    }

    async fn execute_inner(
        &self,
        query: &str,
        caller: Option<&CallerIdentity>,
        cancel: &CancellationToken,
    ) -> Result<CanonicalResult> {
        self.transition(ExecutionState::Connecting);
        let options = self.connect_options(caller)?;
        let mut conn = self.connect(&options, cancel).await?;

        let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut conn)
            .await
            .map_err(classify_connect_error)?;

        self.transition(ExecutionState::Executing);
        let sql = tag_query(query, caller);

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            rows = conn.fetch_all(sql.as_str()) => Some(rows),
        };

        let Some(rows) = fetched else {
            self.cancel_backend(&options, pid).await;
            return Err(RunnerError::Cancelled);
        };
        let rows = rows.map_err(classify_query_error)?;

        let columns = match rows.first() {
            Some(first) => row_columns(first),
            None => Self::describe_columns(&mut conn, &sql).await,
        };
        let values = rows.iter().map(convert_row).collect();

        if let Err(e) = conn.close().await {
            debug!("Error closing pg connection: {}", e);
        }

        Ok(types::normalize(&columns, values, &PG_TYPES))
    }
}

#[async_trait]
impl QueryRunner for PostgresRunner {
    fn type_name(&self) -> &'static str {
        PostgresFactory::TYPE_NAME
    }

    async fn execute(
        &self,
        query: &str,
        caller: Option<&CallerIdentity>,
        cancel: &CancellationToken,
    ) -> Result<CanonicalResult> {
        self.transition(ExecutionState::Idle);
        let result = self.execute_inner(query, caller, cancel).await;
        self.transition(match &result {
            Ok(_) => ExecutionState::Succeeded,
            Err(RunnerError::Cancelled) => ExecutionState::Cancelled,
            Err(_) => ExecutionState::Failed,
        });
        result
    }

    async fn get_schema(&self, cancel: &CancellationToken) -> Result<Vec<SchemaEntry>> {
        introspect(self, SCHEMA_QUERY, SYSTEM_SCHEMAS, cancel).await
    }
}

/// Factory for [`PostgresRunner`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresFactory;

impl PostgresFactory {
    pub const TYPE_NAME: &'static str = "pg";
}

impl RunnerFactory for PostgresFactory {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new(vec![
            SettingDescriptor::string("host", "Host").required(),
            SettingDescriptor::number("port", "Port").with_default(DEFAULT_PORT),
            SettingDescriptor::string("user", "User"),
            SettingDescriptor::string("password", "Password").secret(),
            SettingDescriptor::string("dbname", "Database Name").required(),
            SettingDescriptor::string("sslmode", "SSL Mode").with_default("prefer"),
        ])
    }

    fn create(&self, config: ConnectorConfig) -> Result<Box<dyn QueryRunner>> {
        Ok(Box::new(PostgresRunner::new(config)))
    }
}
