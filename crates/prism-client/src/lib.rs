pub mod error;
mod paging;

pub use error::{PrismError, Result};
pub use reqwest::Method;

use prism_common::HealthRegistry;
use reqwest::{Client, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default upper bound for a single Prism API call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const REST_PREFIX: &str = "PrismGateway/services/rest";

/// Prism REST API generation. Pagination metadata differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn path_segment(self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2.0",
        }
    }
}

/// Connection settings for one configured section.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Section name that health events are recorded under.
    pub section: String,
    pub timeout: Duration,
}

/// Authenticated client for one Prism endpoint.
///
/// Every call is timed and its outcome recorded in the shared
/// [`HealthRegistry`] under the client's section.
pub struct PrismClient {
    base_url: String,
    username: String,
    password: String,
    section: String,
    health: Arc<HealthRegistry>,
    client: Client,
}

impl PrismClient {
    pub fn new(settings: ClientSettings, health: Arc<HealthRegistry>) -> Result<Self> {
        // Prism clusters almost always serve self-signed certificates.
        let client = Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .timeout(settings.timeout)
            .build()
            .map_err(PrismError::Build)?;

        Ok(Self {
            base_url: settings.base_url,
            username: settings.username,
            password: settings.password,
            section: settings.section,
            health,
            client,
        })
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    /// `<base>/PrismGateway/services/rest/<version>/<path>/[?query]`.
    ///
    /// Leading/trailing slashes of `base` and `path` are trimmed; an empty
    /// query adds no `?`.
    pub fn build_url(&self, version: ApiVersion, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        build_url(&self.base_url, version, path, query)
    }

    /// Perform one request and decode the body as JSON.
    pub async fn request(
        &self,
        version: ApiVersion,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.build_url(version, path, query)?;
        tracing::debug!(section = %self.section, %method, url = %url, "Prism API request");

        let started = Instant::now();
        let outcome = self.execute(method, url.clone(), body).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(_) => self.health.mark_cmd_success(&self.section, elapsed),
            Err(e) => {
                self.health.mark_cmd_failure(&self.section, elapsed);
                match e {
                    PrismError::Timeout(_) => self.health.inc_conn_timeout(&self.section),
                    PrismError::Dns(_) => self.health.inc_dns_failure(&self.section),
                    PrismError::Transport(_) => self.health.inc_exception(&self.section),
                    _ => {}
                }
                tracing::error!(
                    section = %self.section,
                    url = %url,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Prism API request failed"
                );
            }
        }
        outcome
    }

    pub async fn get(&self, version: ApiVersion, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.request(version, Method::GET, path, query, None).await
    }

    /// UUID of the cluster behind this endpoint.
    pub async fn cluster_uuid(&self) -> Result<String> {
        let cluster = self.get(ApiVersion::V2, "cluster", &[]).await?;
        cluster
            .get("uuid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PrismError::Decode("cluster response carries no uuid".to_string()))
    }

    async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(PrismError::from_transport)?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(PrismError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(PrismError::from_transport)?;
        serde_json::from_slice(&bytes).map_err(|e| PrismError::Decode(e.to_string()))
    }
}

pub(crate) fn build_url(
    base: &str,
    version: ApiVersion,
    path: &str,
    query: &[(&str, &str)],
) -> Result<Url> {
    let raw = format!(
        "{}/{}/{}/{}/",
        base.trim_matches('/'),
        REST_PREFIX,
        version.path_segment(),
        path.trim_matches('/')
    );
    let mut url = Url::parse(&raw).map_err(|e| PrismError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}
