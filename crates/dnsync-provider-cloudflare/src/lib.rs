// # Cloudflare Remote DNS Client
//
// This crate implements `RemoteDns` against the Cloudflare API v4 for one
// zone and one domain suffix.
//
// ## Behavior
//
// - List follows `result_info.total_pages` and keeps only A records whose
//   name ends with the configured domain (the API filter is looser)
// - Create is retried on transport errors and HTTP 429 with exponential
//   backoff, then verified after a settle delay
// - Delete is not retried; it re-lists after the settle delay and reports
//   whether the record is gone
// - Every request has a bounded timeout (30 seconds by default)
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Construction fails fast with `Error::Config` if any credential is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=A&name.endswith=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dnsync_core::config::{ClientConfig, Credentials};
use dnsync_core::model::{NewRecord, RECORD_TYPE_A, RemoteRecord, in_zone, qualify_name};
use dnsync_core::traits::{CreateOutcome, DeleteOutcome, RemoteDns, RemoteDnsFactory};
use dnsync_core::{Error, ProviderRegistry, Result, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Provider name used in the registry
pub const PROVIDER_NAME: &str = "cloudflare";

/// Records requested per list page
const PAGE_SIZE: u32 = 100;

/// Response envelope shared by every v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

fn summarize(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request unsuccessful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A DNS record as returned by the API
#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: bool,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    created_on: Option<String>,
    #[serde(default)]
    modified_on: Option<String>,
}

impl ApiRecord {
    /// `None` when the content is not an IPv4 literal
    fn into_remote(self) -> Option<RemoteRecord> {
        let address = match self.content.parse::<Ipv4Addr>() {
            Ok(address) => address,
            Err(_) => {
                warn!(
                    remote_id = %self.id,
                    name = %self.name,
                    content = %self.content,
                    "Skipping record with non-IPv4 content"
                );
                return None;
            }
        };

        Some(RemoteRecord {
            remote_id: self.id,
            record_type: self.record_type,
            name: self.name,
            address,
            ttl: self.ttl,
            proxied: self.proxied,
            comment: self.comment.unwrap_or_default(),
            tags: self.tags,
            created_at: parse_timestamp(self.created_on.as_deref()),
            modified_at: parse_timestamp(self.modified_on.as_deref()),
        })
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Serialize)]
struct CreatePayload<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
    comment: &'a str,
}

/// Map a non-success HTTP status to an error, keeping any API messages
fn rejection(status: u16, what: &str, body: &str) -> Error {
    let detail = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .map(|envelope| summarize(&envelope.errors))
        .unwrap_or_else(|_| body.trim().to_string());

    let message = match status {
        401 | 403 => format!(
            "{what}: authentication failed, invalid API token or insufficient permissions: {detail}"
        ),
        404 => format!("{what}: not found: {detail}"),
        429 => format!("{what}: rate limit exceeded: {detail}"),
        500..=599 => format!("{what}: Cloudflare server error: {detail}"),
        _ => format!("{what}: {detail}"),
    };
    Error::remote_rejected(Some(status), message)
}

/// Cloudflare client for one zone and domain
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareClient {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    token: String,

    zone_id: String,

    /// Domain suffix of every managed record
    domain: String,

    base_url: String,

    /// HTTP client with the per-request timeout applied
    client: reqwest::Client,

    retry: RetryPolicy,

    /// Wait after a mutation before checking the remote
    settle_delay: Duration,
}

// Custom Debug implementation that hides the API token
impl fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("domain", &self.domain)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

impl CloudflareClient {
    /// Create a client for one environment
    ///
    /// # Errors
    ///
    /// `Error::Config` if a credential is empty, the client settings are
    /// invalid, or the HTTP client cannot be built.
    pub fn new(credentials: &Credentials, config: &ClientConfig) -> Result<Self> {
        credentials.validate()?;
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            token: credentials.token.clone(),
            zone_id: credentials.zone_id.clone(),
            domain: credentials.domain.trim_end_matches('.').to_string(),
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            retry: config.retry_policy(),
            settle_delay: config.settle_delay(),
        })
    }

    /// Point the client at another API root (mock servers, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    /// True when `name` is the domain or one of its subdomains
    fn in_domain(&self, name: &str) -> bool {
        in_zone(name, &self.domain)
    }

    /// Send a request and unwrap the v4 envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::remote_unavailable(format!("{what}: HTTP request failed: {e}")))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(rejection(status, what, &body));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::remote_rejected(Some(status), format!("{what}: failed to parse response: {e}"))
        })?;

        if !envelope.success {
            return Err(Error::remote_rejected(
                Some(status),
                format!("{what}: {}", summarize(&envelope.errors)),
            ));
        }

        Ok(envelope)
    }

    async fn fetch_page(&self, page: u32) -> Result<(Vec<ApiRecord>, u32)> {
        let request = self.client.get(self.records_url()).query(&[
            ("type", RECORD_TYPE_A.to_string()),
            ("name.endswith", self.domain.clone()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ]);

        let envelope = self.send::<Vec<ApiRecord>>(request, "List DNS records").await?;
        let total_pages = envelope.result_info.map(|i| i.total_pages).unwrap_or(1);
        Ok((envelope.result.unwrap_or_default(), total_pages))
    }
}

#[async_trait]
impl RemoteDns for CloudflareClient {
    async fn list_records(&self) -> Result<Vec<RemoteRecord>> {
        debug!(domain = %self.domain, "Fetching DNS records");

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let (batch, total_pages) = self.fetch_page(page).await?;
            let empty = batch.is_empty();

            records.extend(
                batch
                    .into_iter()
                    .filter(|r| r.record_type == RECORD_TYPE_A && self.in_domain(&r.name))
                    .filter_map(ApiRecord::into_remote),
            );

            if empty || page >= total_pages {
                break;
            }
            page += 1;
        }

        debug!(domain = %self.domain, count = records.len(), "Found DNS records");
        Ok(records)
    }

    async fn create_record(&self, record: &NewRecord) -> Result<CreateOutcome> {
        let name = qualify_name(&record.name, &self.domain);
        let payload = CreatePayload {
            record_type: RECORD_TYPE_A,
            name: &name,
            content: record.address.to_string(),
            ttl: record.effective_ttl(),
            proxied: record.proxied,
            comment: &record.comment,
        };

        info!(
            name = %name,
            address = %record.address,
            comment = %record.comment,
            "Creating DNS record"
        );

        let created = self
            .retry
            .run("Create DNS record", |_attempt| {
                let request = self.client.post(self.records_url()).json(&payload);
                async move {
                    self.send::<ApiRecord>(request, "Create DNS record")
                        .await?
                        .result
                        .ok_or_else(|| {
                            Error::remote_rejected(None, "Create DNS record: response has no result")
                        })
                }
            })
            .await?;

        let remote_id = created.id;
        debug!(remote_id = %remote_id, "Created record, verifying");

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let verified = self.verify_record(&remote_id, record.address).await;
        if verified {
            info!(name = %name, address = %record.address, remote_id = %remote_id, "DNS record created and verified");
        } else {
            warn!(name = %name, address = %record.address, remote_id = %remote_id, "Record created but verification failed");
        }

        Ok(CreateOutcome {
            remote_id,
            verified,
        })
    }

    async fn delete_record(&self, remote_id: &str) -> Result<DeleteOutcome> {
        info!(remote_id, "Deleting DNS record");

        let request = self
            .client
            .delete(format!("{}/{}", self.records_url(), remote_id));
        self.send::<serde_json::Value>(request, "Delete DNS record")
            .await?;

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let confirmed = match self.list_records().await {
            Ok(records) => !records.iter().any(|r| r.remote_id == remote_id),
            Err(e) => {
                warn!(remote_id, error = %e, "Could not re-list after delete");
                false
            }
        };

        if confirmed {
            info!(remote_id, "DNS record deleted and verified");
        } else {
            warn!(remote_id, "Record deletion not yet propagated");
        }

        Ok(DeleteOutcome { confirmed })
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Cloudflare clients
pub struct CloudflareFactory;

impl RemoteDnsFactory for CloudflareFactory {
    fn create(
        &self,
        credentials: &Credentials,
        config: &ClientConfig,
    ) -> Result<Box<dyn RemoteDns>> {
        Ok(Box::new(CloudflareClient::new(credentials, config)?))
    }
}

/// Register the Cloudflare client with a registry
///
/// # Example
///
/// ```rust
/// use dnsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dnsync_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("secret_token_12345", "zone-1", "example.com")
    }

    #[test]
    fn test_factory_creation() {
        let client = CloudflareFactory.create(&credentials(), &ClientConfig::default());
        assert!(client.is_ok());
        assert_eq!(client.unwrap().provider_name(), "cloudflare");
    }

    #[test]
    fn test_empty_token_is_config_error() {
        let creds = Credentials::new("", "zone-1", "example.com");
        let result = CloudflareClient::new(&creds, &ClientConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let client = CloudflareClient::new(&credentials(), &ClientConfig::default()).unwrap();
        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareClient"));
        assert!(debug_str.contains("zone-1"));
    }

    #[test]
    fn test_in_domain_on_label_boundary() {
        let client = CloudflareClient::new(&credentials(), &ClientConfig::default()).unwrap();
        assert!(client.in_domain("example.com"));
        assert!(client.in_domain("us.xmr.example.com"));
        assert!(!client.in_domain("badexample.com"));
        assert!(!client.in_domain("example.org"));
        assert!(client.in_domain("US.xmr.Example.com"));
    }

    #[test]
    fn test_base_url_override() {
        let client = CloudflareClient::new(&credentials(), &ClientConfig::default())
            .unwrap()
            .with_base_url("http://127.0.0.1:9999/");
        assert_eq!(
            client.records_url(),
            "http://127.0.0.1:9999/zones/zone-1/dns_records"
        );
    }

    #[test]
    fn test_rejection_keeps_api_messages() {
        let body = r#"{"success":false,"errors":[{"code":9109,"message":"Invalid access token"}],"result":null}"#;
        let err = rejection(403, "List DNS records", body);
        assert!(matches!(err, Error::RemoteRejected { status: Some(403), .. }));
        assert!(err.to_string().contains("Invalid access token"));
        assert!(!err.is_retryable());
        assert!(rejection(429, "Create", "slow down").is_retryable());
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_provider("cloudflare"));
    }
}
