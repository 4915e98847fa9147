// # Remote DNS Trait
//
// Defines the interface for listing, creating and deleting A records at the
// remote authority.
//
// ## Implementations
//
// - Cloudflare: `dnsync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use dnsync_core::{NewRecord, RemoteDns};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let remote = /* RemoteDns implementation */;
//
//     let records = remote.list_records().await?;
//     let created = remote
//         .create_record(&NewRecord::new("us.xmr", "10.0.0.2".parse()?))
//         .await?;
//     remote.delete_record(&created.remote_id).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

use crate::model::{NewRecord, RemoteRecord};

/// Result of a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    /// Authority-assigned id of the new record
    pub remote_id: String,
    /// Whether a fresh list already shows the record with its address
    pub verified: bool,
}

/// Result of a delete call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether a fresh list no longer shows the record
    pub confirmed: bool,
}

/// Trait for remote DNS authority clients
///
/// The remote authority is eventually consistent. Implementations absorb
/// transient failures and propagation latency so callers can treat each
/// operation as synchronous:
///
/// - `create_record` retries transport failures and rate limiting with
///   backoff, then verifies after a settle delay. A failed verification is
///   reported through [`CreateOutcome::verified`], never as an error.
/// - `delete_record` is not retried. It re-lists after a settle delay and
///   reports propagation through [`DeleteOutcome::confirmed`].
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait RemoteDns: Send + Sync {
    /// List A records whose name ends with the configured domain
    ///
    /// # Errors
    ///
    /// - `RemoteUnavailable`: transport failure
    /// - `RemoteRejected`: the authority reported a non-success envelope
    async fn list_records(&self) -> Result<Vec<RemoteRecord>, crate::Error>;

    /// Create an A record and return its new remote id
    async fn create_record(&self, record: &NewRecord) -> Result<CreateOutcome, crate::Error>;

    /// Delete a record by remote id
    async fn delete_record(&self, remote_id: &str) -> Result<DeleteOutcome, crate::Error>;

    /// True iff a fresh list contains `remote_id` pointing at `expected`
    async fn verify_record(&self, remote_id: &str, expected: Ipv4Addr) -> bool {
        match self.list_records().await {
            Ok(records) => records
                .iter()
                .any(|r| r.remote_id == remote_id && r.address == expected),
            Err(e) => {
                tracing::warn!(remote_id, error = %e, "Verification list failed");
                false
            }
        }
    }

    /// Domain suffix this client manages
    fn domain(&self) -> &str;

    /// Provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing remote clients from credentials
pub trait RemoteDnsFactory: Send + Sync {
    /// Create a RemoteDns instance
    ///
    /// # Parameters
    ///
    /// - `credentials`: Token, zone and domain for one environment
    /// - `config`: Retry, settle and timeout settings
    fn create(
        &self,
        credentials: &crate::config::Credentials,
        config: &crate::config::ClientConfig,
    ) -> Result<Box<dyn RemoteDns>, crate::Error>;
}
