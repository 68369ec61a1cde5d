//! Trino statement client.
//!
//! [`TrinoTransport`] is the seam between the protocol loop and HTTP, so the
//! loop (paging, error pages, cancellation) can be driven by a scripted
//! transport in tests.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::protocol::{ColumnDescriptor, QueryResults, TrinoError};
use crate::credentials::Secret;

/// Value sent as `X-Trino-Source`.
const CLIENT_SOURCE: &str = "query-runners";

/// Timeout for establishing a TCP/TLS connection.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Timeout for a single statement request. Trino long-polls for at most a
/// few seconds per page, so a request outliving this is stalled.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Per-execution connection parameters.
#[derive(Debug, Clone)]
pub struct Session {
    pub base_url: Url,
    pub user: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub token: Secret,
}

impl Session {
    /// URL of the statement submission endpoint.
    pub fn statement_url(&self) -> String {
        format!("{}/v1/statement", self.base_url.as_str().trim_end_matches('/'))
    }
}

/// Sends statement protocol requests.
#[async_trait]
pub trait TrinoTransport: Send + Sync {
    /// Submits a statement and returns the first page.
    async fn submit(&self, session: &Session, sql: &str) -> Result<QueryResults, TrinoError>;

    /// Follows `nextUri`.
    async fn fetch(&self, session: &Session, next_uri: &str) -> Result<QueryResults, TrinoError>;

    /// Asks the server to cancel the query behind `next_uri`.
    async fn cancel(&self, session: &Session, next_uri: &str) -> Result<(), TrinoError>;
}

/// HTTPS transport built on reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TrinoError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .https_only(true)
            .build()
            .map_err(|e| TrinoError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    fn with_headers(&self, request: reqwest::RequestBuilder, session: &Session) -> reqwest::RequestBuilder {
        let mut request = request
            .bearer_auth(session.token.expose())
            .header("X-Trino-User", &session.user)
            .header("X-Trino-Source", CLIENT_SOURCE);
        if let Some(catalog) = &session.catalog {
            request = request.header("X-Trino-Catalog", catalog);
        }
        if let Some(schema) = &session.schema {
            request = request.header("X-Trino-Schema", schema);
        }
        request
    }

    async fn read_page(response: reqwest::Response) -> Result<QueryResults, TrinoError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TrinoError::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(TrinoError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| TrinoError::Protocol(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> TrinoError {
    if e.is_connect() {
        TrinoError::Transport(format!("Cannot connect to Trino: {e}"))
    } else if e.is_timeout() {
        TrinoError::Transport(format!("Request to Trino timed out: {e}"))
    } else {
        TrinoError::Transport(e.to_string())
    }
}

#[async_trait]
impl TrinoTransport for HttpTransport {
    async fn submit(&self, session: &Session, sql: &str) -> Result<QueryResults, TrinoError> {
        let request = self
            .client
            .post(session.statement_url())
            .body(sql.to_string());
        let response = self
            .with_headers(request, session)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_page(response).await
    }

    async fn fetch(&self, session: &Session, next_uri: &str) -> Result<QueryResults, TrinoError> {
        let response = self
            .with_headers(self.client.get(next_uri), session)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_page(response).await
    }

    async fn cancel(&self, session: &Session, next_uri: &str) -> Result<(), TrinoError> {
        let response = self
            .with_headers(self.client.delete(next_uri), session)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::GONE {
            Ok(())
        } else {
            Err(TrinoError::Http {
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }
}

/// Columns and rows of a finished statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutput {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Value>>,
}

/// Runs `sql` to completion, collecting every data page.
///
/// The cancellation token is checked while submitting and while waiting on
/// each page. When it fires after the first page, the query is cancelled
/// server-side (best-effort); either way [`TrinoError::Cancelled`] is
/// returned.
pub async fn run_statement(
    transport: &dyn TrinoTransport,
    session: &Session,
    sql: &str,
    cancel: &CancellationToken,
) -> Result<StatementOutput, TrinoError> {
    // No nextUri exists before the first page, so there is nothing to DELETE.
    let mut page = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("Trino statement cancelled before submission completed");
            return Err(TrinoError::Cancelled);
        }
        first = transport.submit(session, sql) => first?,
    };
    debug!("Submitted Trino query {} ({})", page.id, page.state());

    let mut output = StatementOutput::default();
    let mut columns_seen = false;

    loop {
        if let Some(error) = page.error.take() {
            debug!("Trino query {} failed", page.id);
            return Err(TrinoError::QueryFailed(error));
        }

        if !columns_seen {
            if let Some(columns) = page.columns.take() {
                output.columns = columns;
                columns_seen = true;
            }
        }

        if let Some(data) = page.data.take() {
            output.rows.extend(data);
        }

        let Some(next_uri) = page.next_uri.take() else {
            break;
        };

        page = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Cancelling Trino query {}", page.id);
                if let Err(e) = transport.cancel(session, &next_uri).await {
                    warn!("Failed to cancel Trino query {}: {:?}", page.id, e);
                }
                return Err(TrinoError::Cancelled);
            }
            next = transport.fetch(session, &next_uri) => next?,
        };
    }

    debug!(
        "Trino query finished: {} columns, {} rows",
        output.columns.len(),
        output.rows.len()
    );
    Ok(output)
}
