//! Credential resolution for connectors that authenticate with bearer tokens.
//!
//! Resolution is split in two steps: [`resolve`] picks a [`CredentialSource`]
//! from the connector settings without touching the network, and a
//! [`TokenProvider`] turns that source into a fresh [`Credential`]. Nothing is
//! cached between calls.

mod azure;

pub use azure::AzureTokenProvider;

use async_trait::async_trait;
use std::fmt;
use std::time::SystemTime;

use crate::error::{Result, RunnerError};
use crate::runner::settings::ConnectorConfig;

/// Setting names read by [`resolve`].
pub const USE_MSI: &str = "use_msi";
pub const CLIENT_ID: &str = "azure_ad_client_id";
pub const CLIENT_SECRET: &str = "azure_ad_client_secret";
pub const TENANT_ID: &str = "azure_ad_tenant_id";

/// A string that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the wrapped value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

/// Which credential flavour a connector should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Whatever identity the host provides (environment secret or managed identity).
    Ambient,
    /// Managed identity bound to a specific client id.
    ManagedIdentity { client_id: String },
    /// Application registration with a client secret.
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: Secret,
    },
}

impl CredentialSource {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::ManagedIdentity { .. } => "managed_identity",
            Self::ClientSecret { .. } => "client_secret",
        }
    }
}

/// A bearer token produced for one execution.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: Secret,
    pub expires_at: Option<SystemTime>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Option<SystemTime>) -> Self {
        Self {
            token: Secret::new(token),
            expires_at,
        }
    }
}

/// Selects the credential source from connector settings.
///
/// Policy, in order:
/// 1. `use_msi` and no client id: ambient identity.
/// 2. `use_msi` with a client id: managed identity bound to it.
/// 3. otherwise tenant id, client id and client secret are all required.
pub fn resolve(config: &ConnectorConfig) -> Result<CredentialSource> {
    let use_msi = config.get_bool(USE_MSI).unwrap_or(true);
    let client_id = config.get_str(CLIENT_ID);

    if use_msi {
        return Ok(match client_id {
            None => CredentialSource::Ambient,
            Some(id) => CredentialSource::ManagedIdentity {
                client_id: id.to_string(),
            },
        });
    }

    let missing: Vec<&str> = [TENANT_ID, CLIENT_ID, CLIENT_SECRET]
        .into_iter()
        .filter(|name| config.get_str(name).is_none())
        .collect();

    if !missing.is_empty() {
        return Err(RunnerError::config(format!(
            "Client secret authentication requires: {}",
            missing.join(", ")
        )));
    }

    Ok(CredentialSource::ClientSecret {
        tenant_id: config.get_str(TENANT_ID).unwrap_or_default().to_string(),
        client_id: config.get_str(CLIENT_ID).unwrap_or_default().to_string(),
        client_secret: Secret::new(config.get_str(CLIENT_SECRET).unwrap_or_default()),
    })
}

/// Acquires bearer tokens for a credential source.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetches a fresh token for `scope`. Failures are [`RunnerError::Auth`].
    async fn get_token(&self, source: &CredentialSource, scope: &str) -> Result<Credential>;
}

/// Token provider returning a fixed token. Used in tests and local setups.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Secret,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _source: &CredentialSource, _scope: &str) -> Result<Credential> {
        Ok(Credential {
            token: self.token.clone(),
            expires_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::settings::{ConfigurationSchema, SettingDescriptor};
    use serde_json::{json, Value};

    fn config(value: Value) -> ConnectorConfig {
        let schema = ConfigurationSchema::new(vec![
            SettingDescriptor::boolean(USE_MSI, "MSI").with_default(true),
            SettingDescriptor::string(CLIENT_ID, "Client"),
            SettingDescriptor::string(CLIENT_SECRET, "Secret").secret(),
            SettingDescriptor::string(TENANT_ID, "Tenant"),
        ]);
        schema.validate(value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_msi_without_client_id_is_ambient() {
        let source = resolve(&config(json!({}))).unwrap();
        assert_eq!(source, CredentialSource::Ambient);

        let source = resolve(&config(json!({"use_msi": true, "azure_ad_client_id": ""}))).unwrap();
        assert_eq!(source, CredentialSource::Ambient);
    }

    #[test]
    fn test_msi_with_client_id_binds_it() {
        let source = resolve(&config(json!({
            "use_msi": true,
            "azure_ad_client_id": "11111111-2222",
            "azure_ad_tenant_id": "ignored",
        })))
        .unwrap();

        assert_eq!(
            source,
            CredentialSource::ManagedIdentity {
                client_id: "11111111-2222".to_string()
            }
        );
    }

    #[test]
    fn test_client_secret_requires_all_fields() {
        let err = resolve(&config(json!({
            "use_msi": false,
            "azure_ad_client_id": "app",
        })))
        .unwrap_err();

        assert_eq!(
            err,
            RunnerError::config(
                "Client secret authentication requires: azure_ad_tenant_id, azure_ad_client_secret"
            )
        );
    }

    #[test]
    fn test_client_secret_source() {
        let source = resolve(&config(json!({
            "use_msi": false,
            "azure_ad_client_id": "app",
            "azure_ad_client_secret": "s3cr3t",
            "azure_ad_tenant_id": "contoso",
        })))
        .unwrap();

        match &source {
            CredentialSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                assert_eq!(tenant_id, "contoso");
                assert_eq!(client_id, "app");
                assert_eq!(client_secret.expose(), "s3cr3t");
            }
            other => panic!("Expected ClientSecret, got {:?}", other),
        }
        assert!(!format!("{:?}", source).contains("s3cr3t"));
        assert_eq!(source.kind(), "client_secret");
    }

    #[test]
    fn test_credential_token_is_redacted() {
        assert_eq!(format!("{}", Credential::new("abc", None).token), "********");
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("fixed");
        let cred = provider
            .get_token(&CredentialSource::Ambient, "scope")
            .await
            .unwrap();
        assert_eq!(cred.token.expose(), "fixed");
    }
}
