//! HTTP implementation of the CRM transport.
//!
//! Speaks a session-based JSON protocol: a login call exchanges credentials
//! for a session id and a server URL, and all data calls go to that server
//! URL with the session id as a bearer token. The vendor's own envelope
//! format stays behind this module; nothing outside it builds CRM requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use coursewire_core::defaults::{API_VERSION, SLOW_CALL_THRESHOLD_MS};
use coursewire_core::{
    CredentialStore, CrmConnection, CrmConnector, CrmCredential, Error, QueryPage, RemoteRecord,
    Result, SaveResult, SyncConfig, WireRecord,
};

/// Base URL for a configured CRM host. Hosts without an explicit scheme
/// get https.
fn base_url(host: &str) -> String {
    if host.contains("://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

/// CRM connector backed by reqwest.
#[derive(Clone)]
pub struct HttpCrmConnector {
    http: Client,
    credentials: Arc<dyn CredentialStore>,
    config: SyncConfig,
}

impl HttpCrmConnector {
    /// Create a new connector reading credentials from the given store.
    pub fn new(credentials: Arc<dyn CredentialStore>, config: SyncConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            credentials,
            config,
        }
    }

    /// The configuration this connector was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

#[async_trait]
impl CrmConnector for HttpCrmConnector {
    #[instrument(skip(self), fields(subsystem = "crm", component = "client", op = "connect"))]
    async fn connect(&self) -> Result<Box<dyn CrmConnection>> {
        let credential = self.credentials.current().await?;
        match credential {
            Some(credential) => self.connect_with(&credential).await,
            None => Err(Error::Connect(
                "CRM credentials are not configured".to_string(),
            )),
        }
    }

    #[instrument(
        skip(self, credentials),
        fields(subsystem = "crm", component = "client", op = "login")
    )]
    async fn connect_with(&self, credentials: &CrmCredential) -> Result<Box<dyn CrmConnection>> {
        let start = Instant::now();
        let base = base_url(&credentials.host);
        let login_url = format!("{}/services/auth/{}/login", base, API_VERSION);

        // The security token is appended to the password, per the vendor's
        // login contract.
        let request = LoginRequest {
            username: &credentials.username,
            password: format!("{}{}", credentials.password, credentials.security_token),
        };

        let response = self
            .http
            .post(&login_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Connect(format!("Login request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Connect(format!(
                "Login rejected: {} {}",
                status, body
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| Error::Connect(format!("Failed to parse login response: {}", e)))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "CRM login complete"
        );

        Ok(Box::new(HttpCrmConnection {
            http: self.http.clone(),
            server_url: login.server_url.trim_end_matches('/').to_string(),
            session_id: login.session_id,
        }))
    }
}

/// An authenticated CRM session over HTTP.
pub struct HttpCrmConnection {
    http: Client,
    server_url: String,
    session_id: String,
}

impl HttpCrmConnection {
    async fn post_records(&self, op: &str, records: &[WireRecord]) -> Result<Vec<SaveResult>> {
        let start = Instant::now();

        let response = self
            .http
            .post(format!("{}/{}", self.server_url, op))
            .bearer_auth(&self.session_id)
            .json(&RecordsRequest { records })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!("CRM returned {}: {}", status, body)));
        }

        let result: RecordsResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("Failed to parse response: {}", e)))?;

        let elapsed = start.elapsed().as_millis();
        debug!(
            record_count = records.len(),
            duration_ms = elapsed as u64,
            "CRM call complete"
        );
        if elapsed > SLOW_CALL_THRESHOLD_MS {
            warn!(
                record_count = records.len(),
                duration_ms = elapsed as u64,
                slow = true,
                "Slow CRM call"
            );
        }

        Ok(result
            .results
            .into_iter()
            .map(|r| SaveResult {
                id: r.id,
                success: r.success,
                errors: r.errors.into_iter().map(|e| e.message).collect(),
            })
            .collect())
    }

    async fn post_query(&self, op: &str, body: impl Serialize) -> Result<QueryPage> {
        let response = self
            .http
            .post(format!("{}/{}", self.server_url, op))
            .bearer_auth(&self.session_id)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!("CRM returned {}: {}", status, text)));
        }

        let page: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("Failed to parse response: {}", e)))?;

        Ok(QueryPage {
            records: page.records,
            done: page.done,
            query_locator: page.query_locator,
        })
    }
}

#[async_trait]
impl CrmConnection for HttpCrmConnection {
    #[instrument(
        skip(self, records),
        fields(subsystem = "crm", component = "client", op = "create", record_count = records.len())
    )]
    async fn create(&self, records: &[WireRecord]) -> Result<Vec<SaveResult>> {
        self.post_records("create", records).await
    }

    #[instrument(
        skip(self, records),
        fields(subsystem = "crm", component = "client", op = "update", record_count = records.len())
    )]
    async fn update(&self, records: &[WireRecord]) -> Result<Vec<SaveResult>> {
        self.post_records("update", records).await
    }

    #[instrument(
        skip(self, soql),
        fields(subsystem = "crm", component = "client", op = "query")
    )]
    async fn query(&self, soql: &str) -> Result<QueryPage> {
        self.post_query("query", QueryRequest { query: soql }).await
    }

    #[instrument(
        skip(self, locator),
        fields(subsystem = "crm", component = "client", op = "query_more")
    )]
    async fn query_more(&self, locator: &str) -> Result<QueryPage> {
        self.post_query(
            "query_more",
            QueryMoreRequest {
                query_locator: locator,
            },
        )
        .await
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    session_id: String,
    server_url: String,
}

#[derive(Serialize)]
struct RecordsRequest<'a> {
    records: &'a [WireRecord],
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ApiSaveResult {
    id: Option<String>,
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Deserialize)]
struct RecordsResponse {
    results: Vec<ApiSaveResult>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryMoreRequest<'a> {
    query_locator: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    records: Vec<RemoteRecord>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    query_locator: Option<String>,
}
