//! Configuration types for dnsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Credentials for one environment's remote authority
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token
    /// ⚠️ NEVER log this value
    pub token: String,

    /// Zone the records live in
    pub zone_id: String,

    /// Domain suffix every managed record shares
    pub domain: String,
}

impl Credentials {
    pub fn new(
        token: impl Into<String>,
        zone_id: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            zone_id: zone_id.into(),
            domain: domain.into(),
        }
    }

    /// Fail fast if any field is empty
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.token.trim().is_empty() {
            return Err(crate::Error::config("API token cannot be empty"));
        }
        if self.zone_id.trim().is_empty() {
            return Err(crate::Error::config("Zone ID cannot be empty"));
        }
        if self.domain.trim().is_empty() {
            return Err(crate::Error::config("Domain cannot be empty"));
        }
        Ok(())
    }

    /// Token shortened for logs: first and last four characters
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.len() > 8 {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{head}...{tail}")
        } else {
            "****".to_string()
        }
    }
}

// Custom Debug implementation that hides the token
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("domain", &self.domain)
            .finish()
    }
}

/// Supplies credentials for an environment before any reconciliation run
pub trait CredentialSource: Send + Sync {
    fn resolve(&self, environment: &str) -> Result<Credentials, crate::Error>;
}

/// Resolves credentials from environment variables.
///
/// Lookup order per field:
/// 1. `DNSYNC_<ENV>_CF_API_TOKEN` / `DNSYNC_<ENV>_CF_ZONE_ID` / `DNSYNC_<ENV>_DNS_NAME`
/// 2. `CF_API_TOKEN` / `CF_ZONE_ID` / `DNS_NAME`
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    fn lookup(environment: &str, field: &str) -> Option<String> {
        let scoped = format!(
            "DNSYNC_{}_{}",
            environment.to_ascii_uppercase().replace('-', "_"),
            field
        );
        env::var(scoped)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| env::var(field).ok().filter(|v| !v.is_empty()))
    }
}

impl CredentialSource for EnvCredentialSource {
    fn resolve(&self, environment: &str) -> Result<Credentials, crate::Error> {
        let credentials = Credentials {
            token: Self::lookup(environment, "CF_API_TOKEN").unwrap_or_default(),
            zone_id: Self::lookup(environment, "CF_ZONE_ID").unwrap_or_default(),
            domain: Self::lookup(environment, "DNS_NAME").unwrap_or_default(),
        };

        credentials.validate().map_err(|e| {
            crate::Error::config(format!(
                "Incomplete credentials for environment '{environment}': {e}. \
                Set CF_API_TOKEN, CF_ZONE_ID and DNS_NAME"
            ))
        })?;

        tracing::info!(
            environment,
            token = %credentials.masked_token(),
            domain = %credentials.domain,
            "Credentials loaded from environment"
        );
        Ok(credentials)
    }
}

/// Remote client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Attempts per create call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for each following retry
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Wait after a mutation before verifying it
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_base_ms))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("max_attempts must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("request_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Snapshot store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one document per environment
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where backups go; `None` keeps them next to the document
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Backups kept after each save (0 = unlimited)
    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn with_keep_backups(mut self, keep: usize) -> Self {
        self.keep_backups = keep;
        self
    }

    /// Path of the desired-state document for an environment
    pub fn document_path(&self, environment: &str) -> PathBuf {
        self.data_dir.join(format!("records.{environment}.json"))
    }

    pub fn backup_dir_for(&self, document: &Path) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => document
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.data_dir.clone()),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backup_dir: None,
            keep_backups: default_keep_backups(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_keep_backups() -> usize {
    10
}

/// Reconciler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Capacity of the event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Filled into a document whose account vocabulary is empty
    #[serde(default = "default_account_tags")]
    pub default_account_tags: Vec<String>,

    /// Filled into a document whose container vocabulary is empty
    #[serde(default = "default_container_tags")]
    pub default_container_tags: Vec<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            default_account_tags: default_account_tags(),
            default_container_tags: default_container_tags(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_account_tags() -> Vec<String> {
    ["Pool1", "Pool2", "Pool3"].map(String::from).to_vec()
}

fn default_container_tags() -> Vec<String> {
    ["Group1", "Group2", "Test"].map(String::from).to_vec()
}
