//! The `azure_trino` connector: Trino over HTTPS with Azure AD bearer tokens.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::client::{run_statement, HttpTransport, Session, TrinoTransport};
use super::protocol::classify;
use super::TRINO_TYPES;
use crate::credentials::{self, AzureTokenProvider, TokenProvider};
use crate::error::{Result, RunnerError};
use crate::runner::types::{self, NativeColumn};
use crate::runner::{
    introspect, session_user, tag_query, CallerIdentity, CanonicalResult, ConfigurationSchema,
    ConnectorConfig, ExecutionState, QueryRunner, RunnerFactory, SchemaEntry, SettingDescriptor,
    SYSTEM_SCHEMAS,
};

/// OAuth scope of HDInsight on AKS Trino clusters.
pub const AZURE_TRINO_SCOPE: &str = "https://hilo.azurehdinsight.net/.default";

const SCHEMA_QUERY: &str = r#"
SELECT table_schema, table_name, column_name
FROM information_schema.columns
WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
"#;

/// Runner bound to one `azure_trino` configuration.
pub struct AzureTrinoRunner {
    config: ConnectorConfig,
    transport: Arc<dyn TrinoTransport>,
    tokens: Arc<dyn TokenProvider>,
}

impl AzureTrinoRunner {
    pub fn new(
        config: ConnectorConfig,
        transport: Arc<dyn TrinoTransport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            config,
            transport,
            tokens,
        }
    }

    /// Builds the HTTPS base URL from the `host` setting. A host without an
    /// explicit port uses 443.
    fn base_url(&self) -> Result<Url> {
        let host = self
            .config
            .get_str("host")
            .ok_or_else(|| RunnerError::config("Missing required setting 'host'"))?;

        let url = if host.contains("://") {
            Url::parse(host)
        } else {
            Url::parse(&format!("https://{host}"))
        }
        .map_err(|e| RunnerError::config(format!("Invalid host '{host}': {e}")))?;

        if url.scheme() != "https" {
            return Err(RunnerError::config(format!(
                "Trino host must use https, got '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    fn transition(&self, state: ExecutionState) {
        debug!("azure_trino execution {}", state.as_str());
    }

    async fn connect(
        &self,
        caller: Option<&CallerIdentity>,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let source = credentials::resolve(&self.config)?;
        let base_url = self.base_url()?;
        debug!("Resolving {} credential for {}", source.kind(), base_url);

        let credential = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
            credential = self.tokens.get_token(&source, AZURE_TRINO_SCOPE) => credential?,
        };

        Ok(Session {
            base_url,
            user: session_user(caller).to_string(),
            catalog: self.config.get_str("catalog").map(String::from),
            schema: self.config.get_str("schema").map(String::from),
            token: credential.token,
        })
    }

    async fn execute_inner(
        &self,
        query: &str,
        caller: Option<&CallerIdentity>,
        cancel: &CancellationToken,
    ) -> Result<CanonicalResult> {
        self.transition(ExecutionState::Connecting);
        let session = self.connect(caller, cancel).await?;

        self.transition(ExecutionState::Executing);
        let sql = tag_query(query, caller);
        let output = run_statement(self.transport.as_ref(), &session, &sql, cancel)
            .await
            .map_err(classify)?;

        let columns: Vec<NativeColumn> = output
            .columns
            .iter()
            .map(|c| NativeColumn::new(c.name.clone(), c.base_type()))
            .collect();

        Ok(types::normalize(&columns, output.rows, &TRINO_TYPES))
    }
}

#[async_trait]
impl QueryRunner for AzureTrinoRunner {
    fn type_name(&self) -> &'static str {
        AzureTrinoFactory::TYPE_NAME
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

/// Factory for [`AzureTrinoRunner`].
///
/// By default runners talk HTTPS to Trino and Azure AD; tests inject their
/// own transport and token provider.
#[derive(Clone, Default)]
pub struct AzureTrinoFactory {
    transport: Option<Arc<dyn TrinoTransport>>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl AzureTrinoFactory {
    pub const TYPE_NAME: &'static str = "azure_trino";

    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given transport and token provider for every runner.
    pub fn with_backend(transport: Arc<dyn TrinoTransport>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            transport: Some(transport),
            tokens: Some(tokens),
        }
    }
}

impl RunnerFactory for AzureTrinoFactory {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn name(&self) -> &'static str {
        "Azure Trino"
    }

    fn probe(&self) -> bool {
        if self.transport.is_some() {
            return true;
        }
        match HttpTransport::new() {
            Ok(_) => true,
            Err(e) => {
                warn!("azure_trino unavailable: {:?}", e);
                false
            }
        }
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new(vec![
            SettingDescriptor::string("host", "Trino Cluster Hostname").required(),
            SettingDescriptor::string("catalog", "Default Catalog").with_default("system"),
            SettingDescriptor::string("schema", "Default Schema"),
            SettingDescriptor::boolean(credentials::USE_MSI, "Use Managed Service Identity (MSI)")
                .with_default(true),
            SettingDescriptor::string(
                credentials::CLIENT_ID,
                "Azure AD Client ID (required for application auth, optional for MSI)",
            ),
            SettingDescriptor::string(
                credentials::CLIENT_SECRET,
                "Azure AD Client Secret (required if not using MSI)",
            )
            .secret(),
            SettingDescriptor::string(
                credentials::TENANT_ID,
                "Azure AD Tenant Id (required if not using MSI)",
            ),
        ])
    }

    fn create(&self, config: ConnectorConfig) -> Result<Box<dyn QueryRunner>> {
        let transport: Arc<dyn TrinoTransport> = match &self.transport {
            Some(t) => Arc::clone(t),
            None => Arc::new(HttpTransport::new().map_err(classify)?),
        };
        let tokens: Arc<dyn TokenProvider> = match &self.tokens {
            Some(t) => Arc::clone(t),
            None => Arc::new(AzureTokenProvider::from_env()?),
        };

        Ok(Box::new(AzureTrinoRunner::new(config, transport, tokens)))
    }
}
