//! Azure AD token acquisition over HTTP.
//!
//! Supports the managed identity endpoints (App Service and the instance
//! metadata service) and the client-credentials grant.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;

use super::{Credential, CredentialSource, Secret, TokenProvider};
use crate::error::{Result, RunnerError};

/// Default timeout for token requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Instance metadata service token endpoint.
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";

const APP_SERVICE_API_VERSION: &str = "2019-08-01";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Where managed identity tokens come from on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentityEndpoint {
    /// App Service / Functions: `IDENTITY_ENDPOINT` with `IDENTITY_HEADER`.
    AppService { endpoint: String, header: Secret },
    /// Azure instance metadata service.
    Imds { endpoint: String },
}

impl ManagedIdentityEndpoint {
    /// Detects the endpoint from the process environment.
    pub fn from_env() -> Self {
        match (
            std::env::var("IDENTITY_ENDPOINT").ok(),
            std::env::var("IDENTITY_HEADER").ok(),
        ) {
            (Some(endpoint), Some(header)) => Self::AppService {
                endpoint,
                header: Secret::new(header),
            },
            _ => Self::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        }
    }
}

/// Client-secret credentials read from `AZURE_*` environment variables.
#[derive(Debug, Clone)]
struct EnvironmentSecret {
    tenant_id: String,
    client_id: String,
    client_secret: Secret,
}

impl EnvironmentSecret {
    fn from_env() -> Option<Self> {
        Some(Self {
            tenant_id: std::env::var("AZURE_TENANT_ID").ok()?,
            client_id: std::env::var("AZURE_CLIENT_ID").ok()?,
            client_secret: Secret::new(std::env::var("AZURE_CLIENT_SECRET").ok()?),
        })
    }
}

/// Token provider talking to Azure AD.
#[derive(Debug, Clone)]
pub struct AzureTokenProvider {
    client: Client,
    authority_host: String,
    managed_identity: ManagedIdentityEndpoint,
}

impl AzureTokenProvider {
    /// Creates a provider configured from the process environment.
    pub fn from_env() -> Result<Self> {
        let authority_host = std::env::var("AZURE_AUTHORITY_HOST")
            .unwrap_or_else(|_| DEFAULT_AUTHORITY_HOST.to_string());
        Self::new(authority_host, ManagedIdentityEndpoint::from_env())
    }

    pub fn new(
        authority_host: impl Into<String>,
        managed_identity: ManagedIdentityEndpoint,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| RunnerError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            managed_identity,
        })
    }

    async fn client_secret_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &Secret,
        scope: &str,
    ) -> Result<Credential> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id);
        debug!("Requesting client secret token for client {}", client_id);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret.expose()),
            ("scope", scope),
        ];

        let response = self.client.post(&url).form(&form).send().await;
        read_token_response(response).await
    }

    async fn managed_identity_token(
        &self,
        client_id: Option<&str>,
        scope: &str,
    ) -> Result<Credential> {
        let resource = scope_to_resource(scope);
        debug!(
            "Requesting managed identity token (client id: {})",
            client_id.unwrap_or("system assigned")
        );

        let request = match &self.managed_identity {
            ManagedIdentityEndpoint::AppService { endpoint, header } => {
                let url = managed_identity_url(endpoint, APP_SERVICE_API_VERSION, resource, client_id)?;
                self.client
                    .get(url)
                    .header("X-IDENTITY-HEADER", header.expose())
            }
            ManagedIdentityEndpoint::Imds { endpoint } => {
                let url = managed_identity_url(endpoint, IMDS_API_VERSION, resource, client_id)?;
                self.client.get(url).header("Metadata", "true")
            }
        };

        read_token_response(request.send().await).await
    }
}

#[async_trait]
impl TokenProvider for AzureTokenProvider {
    async fn get_token(&self, source: &CredentialSource, scope: &str) -> Result<Credential> {
        match source {
            CredentialSource::Ambient => match EnvironmentSecret::from_env() {
                Some(env) => {
                    self.client_secret_token(&env.tenant_id, &env.client_id, &env.client_secret, scope)
                        .await
                }
                None => self.managed_identity_token(None, scope).await,
            },
            CredentialSource::ManagedIdentity { client_id } => {
                self.managed_identity_token(Some(client_id), scope).await
            }
            CredentialSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                self.client_secret_token(tenant_id, client_id, client_secret, scope)
                    .await
            }
        }
    }
}

/// Managed identity endpoints take a resource, not a `/.default` scope.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn managed_identity_url(
    endpoint: &str,
    api_version: &str,
    resource: &str,
    client_id: Option<&str>,
) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| RunnerError::config(format!("Invalid managed identity endpoint: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("api-version", api_version);
        query.append_pair("resource", resource);
        if let Some(id) = client_id {
            query.append_pair("client_id", id);
        }
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "lenient_secs")]
    expires_in: Option<u64>,
    #[serde(default, deserialize_with = "lenient_secs")]
    expires_on: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Managed identity endpoints send numbers as strings.
fn lenient_secs<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

async fn read_token_response(
    response: std::result::Result<reqwest::Response, reqwest::Error>,
) -> Result<Credential> {
    let response =
        response.map_err(|e| RunnerError::auth(format!("Token request failed: {e}")))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RunnerError::auth(format!("Failed to read token response: {e}")))?;

    if !status.is_success() {
        return Err(parse_token_error(status, &body));
    }

    parse_token_body(&body, SystemTime::now())
}

fn parse_token_error(status: reqwest::StatusCode, body: &str) -> RunnerError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error: Some(code),
            error_description,
        }) => RunnerError::auth(format!(
            "Token endpoint returned {status}: {code}{}",
            error_description
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        )),
        _ => RunnerError::auth(format!("Token endpoint returned {status}")),
    }
}

fn parse_token_body(body: &str, now: SystemTime) -> Result<Credential> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| RunnerError::auth(format!("Malformed token response: {e}")))?;

    let expires_at = match (token.expires_on, token.expires_in) {
        (Some(on), _) => Some(UNIX_EPOCH + Duration::from_secs(on)),
        (None, Some(secs)) => Some(now + Duration::from_secs(secs)),
        (None, None) => None,
    };

    Ok(Credential {
        token: Secret::new(token.access_token),
        expires_at,
    })
}
