//! Reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Building the unified view of desired and remote records
//! - Diffing a desired activation set against the remote record set
//! - Driving creates and deletes through the remote client
//! - Persisting learned identities, tags and activation timestamps
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!   activation set ───▶│  Reconciler  │───▶ SyncEvent channel
//!                      └──────────────┘
//!                             │
//!          ┌──────────────────┼──────────────────┐
//!          │                  │                  │
//!          ▼                  ▼                  ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │  RemoteDns   │   │   SyncPlan   │   │ DocumentStore│
//!  │ (list/apply) │   │   (diff)     │   │ (persist)    │
//!  └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Locking
//!
//! Each environment has one reader/writer lock around its document. It is
//! taken only for load/modify/save and is never held across a remote call.

pub mod diff;
pub mod events;
pub mod view;

pub use diff::{PlannedCreate, SyncPlan};
pub use events::SyncEvent;
pub use view::{AddressGroup, UnifiedView, ViewEntry};

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::identity::RecordIdentity;
use crate::locks::EnvironmentLocks;
use crate::model::{
    ActivationRequest, DesiredRecord, DesiredStateDocument, DetailStatus, NewRecord,
    OperationDetail, RecordKey, RecordSelector, RunResult, TagKind, qualify_name, short_name,
};
use crate::traits::{BackupInfo, DocumentStore, RemoteDns};

/// Result of a remote connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub environment: String,
    pub provider: String,
    pub domain: String,
    pub remote_connected: bool,
    /// Records listed, when the probe succeeded
    pub records: Option<usize>,
    pub error: Option<String>,
}

/// A document load, with what was done to it on the way in
struct Loaded {
    document: DesiredStateDocument,
    exists: bool,
    migrated: usize,
}

/// A record that became active during a run
struct Activation {
    key: RecordKey,
    request: ActivationRequest,
}

/// Reconciliation engine over any number of isolated environments
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Register one remote client per environment
/// 3. Call [`Reconciler::view()`], [`Reconciler::reconcile()`] and the edit
///    operations from any task
pub struct Reconciler {
    /// Desired-state persistence
    store: Arc<dyn DocumentStore>,

    /// Remote client per environment
    remotes: std::sync::RwLock<HashMap<String, Arc<dyn RemoteDns>>>,

    /// Per-environment document locks
    locks: EnvironmentLocks,

    config: ReconcilerConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields sync events
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: ReconcilerConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        if config.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Self {
            store,
            remotes: std::sync::RwLock::new(HashMap::new()),
            locks: EnvironmentLocks::new(),
            config,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Attach the remote client for an environment, replacing any previous one
    pub fn register_environment(&self, environment: impl Into<String>, remote: Arc<dyn RemoteDns>) {
        let environment = environment.into();
        info!(
            environment = %environment,
            provider = remote.provider_name(),
            domain = remote.domain(),
            "Environment registered"
        );
        self.remotes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(environment, remote);
    }

    /// Registered environment names, sorted
    pub fn environments(&self) -> Vec<String> {
        let remotes = self
            .remotes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = remotes.keys().cloned().collect();
        names.sort();
        names
    }

    fn remote(&self, environment: &str) -> Result<Arc<dyn RemoteDns>> {
        self.remotes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(environment)
            .cloned()
            .ok_or_else(|| {
                Error::config(format!("Environment '{environment}' has no remote client"))
            })
    }

    /// Build the unified view of desired and remote records.
    ///
    /// Imports the remote set when the environment has no document yet, and
    /// rewrites documents whose records predate identities.
    pub async fn view(&self, environment: &str) -> Result<UnifiedView> {
        let remote = self.remote(environment)?;
        let records = remote.list_records().await?;
        let lock = self.locks.lock_for(environment);

        {
            let _guard = lock.read().await;
            let loaded = self.load_document(environment, remote.domain()).await?;
            let needs_import = !loaded.exists && !records.is_empty();
            if !needs_import && loaded.migrated == 0 {
                return Ok(UnifiedView::build(&loaded.document, &records));
            }
        }

        let _guard = lock.write().await;
        let Loaded {
            mut document,
            exists,
            migrated,
        } = self.load_document(environment, remote.domain()).await?;

        let mut imported = 0;
        if !exists {
            let now = Utc::now();
            let description = format!("Imported from remote on {}", now.format("%Y-%m-%d"));
            for record in &records {
                let identity = record.identity();
                if document.find(&RecordSelector::by_identity(identity)).is_none() {
                    document
                        .records
                        .push(DesiredRecord::imported(record, description.clone(), now));
                    imported += 1;
                }
            }
            info!(environment, imported, "Imported remote records into new document");
        }

        if imported > 0 || migrated > 0 {
            if let Err(e) = self.persist(environment, &mut document).await {
                warn!(environment, error = %e, "Failed to save document while building view");
                self.emit_event(SyncEvent::PersistFailed {
                    environment: environment.to_string(),
                    error: e.to_string(),
                });
            }
        }

        Ok(UnifiedView::build(&document, &records))
    }

    /// Converge the remote record set on `desired`.
    ///
    /// Listing failure aborts the run. Individual create/delete failures are
    /// reported as detail lines and do not stop the batch.
    pub async fn reconcile(
        &self,
        environment: &str,
        desired: Vec<ActivationRequest>,
    ) -> Result<RunResult> {
        if let Some(bad) = desired.iter().find(|r| r.name.trim().is_empty()) {
            return Err(Error::invalid_input(format!(
                "Activation for {} has an empty name",
                bad.address
            )));
        }

        let remote = self.remote(environment)?;
        let domain = remote.domain().to_string();

        self.emit_event(SyncEvent::RunStarted {
            environment: environment.to_string(),
            requested: desired.len(),
        });
        info!(environment, requested = desired.len(), "Starting reconciliation");

        let records = remote.list_records().await.map_err(|e| {
            error!(environment, error = %e, "Failed to fetch current records");
            e
        })?;

        let plan = SyncPlan::build(&domain, &records, &desired);
        debug!(
            environment,
            creates = plan.creates.len(),
            deletes = plan.deletes.len(),
            unchanged = plan.unchanged.len(),
            "Computed plan"
        );
        for key in &plan.drifted {
            warn!(
                environment,
                name = %key.name,
                address = %key.address,
                "ttl/proxied differ from the request; deactivate and reactivate to change them"
            );
        }

        let mut details = Vec::with_capacity(plan.operation_count());
        let mut activations = Vec::new();
        let mut applied = 0;
        let mut failed = 0;

        for create in plan.creates {
            let key = create.key;
            let request = create.request;
            let short = short_name(&key.name, &domain).to_string();
            let alias = request.effective_alias(&domain);
            let ttl = request.effective_ttl();
            let proxy_status = if request.proxied { "proxied" } else { "DNS-only" };

            let new_record = NewRecord::new(key.name.clone(), key.address)
                .with_comment(alias.clone())
                .with_proxied(request.proxied)
                .with_ttl(ttl);

            match remote.create_record(&new_record).await {
                Ok(outcome) => {
                    applied += 1;
                    let detail = if outcome.verified {
                        OperationDetail::new(
                            DetailStatus::Success,
                            format!(
                                "✓ Activated {short} ({alias} -> {}) [{proxy_status}, TTL: {ttl}]",
                                key.address
                            ),
                        )
                    } else {
                        OperationDetail::new(
                            DetailStatus::Warning,
                            format!(
                                "⚠ Activated {short} ({alias} -> {}) [{proxy_status}, TTL: {ttl}], not yet visible at remote",
                                key.address
                            ),
                        )
                    };
                    details.push(detail);
                    self.emit_event(SyncEvent::RecordCreated {
                        environment: environment.to_string(),
                        name: key.name.clone(),
                        address: key.address,
                        remote_id: outcome.remote_id,
                        verified: outcome.verified,
                    });
                    activations.push(Activation {
                        key,
                        request: ActivationRequest { alias, ..request },
                    });
                }
                Err(e) => {
                    failed += 1;
                    error!(environment, name = %key.name, address = %key.address, error = %e, "Create failed");
                    details.push(OperationDetail::new(
                        DetailStatus::Error,
                        format!("Failed to activate {short} ({alias} -> {}): {e}", key.address),
                    ));
                    self.emit_event(SyncEvent::OperationFailed {
                        environment: environment.to_string(),
                        operation: "create",
                        name: key.name,
                        address: key.address,
                        error: e.to_string(),
                    });
                }
            }
        }

        for record in plan.deletes {
            let short = short_name(&record.name, &domain).to_string();

            match remote.delete_record(&record.remote_id).await {
                Ok(outcome) => {
                    applied += 1;
                    details.push(OperationDetail::new(
                        DetailStatus::Success,
                        format!(
                            "✓ Deactivated {short} ({} -> {})",
                            record.comment, record.address
                        ),
                    ));
                    self.emit_event(SyncEvent::RecordDeleted {
                        environment: environment.to_string(),
                        name: record.name,
                        address: record.address,
                        remote_id: record.remote_id,
                        confirmed: outcome.confirmed,
                    });
                }
                Err(e) => {
                    failed += 1;
                    error!(
                        environment,
                        name = %record.name,
                        address = %record.address,
                        remote_id = %record.remote_id,
                        error = %e,
                        "Delete failed"
                    );
                    details.push(OperationDetail::new(
                        DetailStatus::Error,
                        format!(
                            "Failed to deactivate {short} ({} -> {}): {e}",
                            record.comment, record.address
                        ),
                    ));
                    self.emit_event(SyncEvent::OperationFailed {
                        environment: environment.to_string(),
                        operation: "delete",
                        name: record.name,
                        address: record.address,
                        error: e.to_string(),
                    });
                }
            }
        }

        if applied > 0 {
            let now = Utc::now();
            let description = format!("Added via activation on {}", now.format("%Y-%m-%d"));
            self.persist_activations(environment, &domain, &activations, &description, now)
                .await;
        }

        let message = match (applied, failed) {
            (0, 0) => "No changes required".to_string(),
            (n, 0) => format!("Successfully updated {n} DNS records"),
            (n, f) => format!("Updated {n} DNS records, {f} failed"),
        };

        info!(environment, applied, failed, "{}", message);
        self.emit_event(SyncEvent::RunFinished {
            environment: environment.to_string(),
            applied,
            failed,
        });

        Ok(RunResult {
            success: failed == 0,
            message,
            applied,
            failed,
            details,
        })
    }

    /// Create one record directly, bypassing the diff, and remember it.
    ///
    /// Returns the identity of the created record.
    pub async fn create_single_entry(
        &self,
        environment: &str,
        request: ActivationRequest,
    ) -> Result<RecordIdentity> {
        if request.name.trim().is_empty() {
            return Err(Error::invalid_input("Name is required"));
        }

        let remote = self.remote(environment)?;
        let domain = remote.domain().to_string();
        let key = RecordKey::new(qualify_name(request.name.trim(), &domain), request.address);
        let alias = request.effective_alias(&domain);

        let new_record = NewRecord::new(key.name.clone(), key.address)
            .with_comment(alias.clone())
            .with_proxied(request.proxied)
            .with_ttl(request.effective_ttl());

        let outcome = match remote.create_record(&new_record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(environment, name = %key.name, address = %key.address, error = %e, "Failed to create DNS record");
                self.emit_event(SyncEvent::OperationFailed {
                    environment: environment.to_string(),
                    operation: "create",
                    name: key.name.clone(),
                    address: key.address,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        info!(
            environment,
            name = %key.name,
            address = %key.address,
            remote_id = %outcome.remote_id,
            "Created DNS record"
        );
        self.emit_event(SyncEvent::RecordCreated {
            environment: environment.to_string(),
            name: key.name.clone(),
            address: key.address,
            remote_id: outcome.remote_id,
            verified: outcome.verified,
        });

        let identity = key.identity();
        let now = Utc::now();
        let description = format!("Added via create on {}", now.format("%Y-%m-%d"));
        let activation = Activation {
            key,
            request: ActivationRequest { alias, ..request },
        };
        self.persist_activations(environment, &domain, &[activation], &description, now)
            .await;

        Ok(identity)
    }

    /// Set or clear (empty value) a classification tag on one record.
    ///
    /// Falls back to importing the record from the remote when it is active
    /// there but unknown locally.
    pub async fn update_tag(
        &self,
        environment: &str,
        selector: RecordSelector,
        kind: TagKind,
        value: &str,
    ) -> Result<()> {
        let remote = self.remote(environment)?;
        let domain = remote.domain().to_string();
        let selector = RecordSelector {
            identity: selector.identity,
            key: selector
                .key
                .map(|k| RecordKey::new(qualify_name(&k.name, &domain), k.address)),
        };
        let lock = self.locks.lock_for(environment);

        {
            let _guard = lock.write().await;
            let Loaded { mut document, .. } = self.load_document(environment, &domain).await?;
            if let Some(record) = document.find_mut(&selector) {
                record.set_tag(kind, value);
                info!(environment, selector = %selector, tag = %kind, value, "Updated tag");
                return self.persist(environment, &mut document).await;
            }
        }

        let Some(key) = selector.key.clone() else {
            return Err(Error::not_found(format!("No record matches {selector}")));
        };

        // Not known locally; adopt it if the remote has it
        let records = remote.list_records().await?;
        let Some(found) = records.into_iter().find(|r| r.key() == key) else {
            return Err(Error::not_found(format!("No record matches {selector}")));
        };

        let _guard = lock.write().await;
        let Loaded { mut document, .. } = self.load_document(environment, &domain).await?;
        if document.position(&selector).is_none() {
            let now = Utc::now();
            let description = format!("Added via tag update on {}", now.format("%Y-%m-%d"));
            document
                .records
                .push(DesiredRecord::imported(&found, description, now));
            info!(environment, name = %found.name, address = %found.address, "Imported active record for tag update");
        }
        if let Some(record) = document.find_mut(&selector) {
            record.set_tag(kind, value);
        }
        info!(environment, selector = %selector, tag = %kind, value, "Updated tag");
        self.persist(environment, &mut document).await
    }

    /// Set the notes of every record at `address`; returns how many changed
    pub async fn update_notes(
        &self,
        environment: &str,
        address: Ipv4Addr,
        notes: &str,
    ) -> Result<usize> {
        let domain = self.domain_for(environment);
        let lock = self.locks.lock_for(environment);
        let _guard = lock.write().await;

        let Loaded { mut document, .. } = self.load_document(environment, &domain).await?;
        let mut updated = 0;
        for record in document.records.iter_mut().filter(|r| r.address == address) {
            record.notes = notes.to_string();
            updated += 1;
            debug!(environment, name = %record.name, %address, "Updated notes");
        }

        if updated == 0 {
            return Err(Error::not_found(format!("No records found with address {address}")));
        }

        self.persist(environment, &mut document).await?;
        info!(environment, %address, updated, "Updated notes");
        Ok(updated)
    }

    /// Add a name to a tag vocabulary; returns false if it was already there
    pub async fn add_vocabulary_tag(
        &self,
        environment: &str,
        kind: TagKind,
        name: &str,
    ) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("Tag name cannot be empty"));
        }

        let domain = self.domain_for(environment);
        let lock = self.locks.lock_for(environment);
        let _guard = lock.write().await;

        let Loaded { mut document, .. } = self.load_document(environment, &domain).await?;
        if !document.add_vocabulary_tag(kind, name) {
            debug!(environment, tag = %kind, name, "Tag already present");
            return Ok(false);
        }

        self.persist(environment, &mut document).await?;
        info!(environment, tag = %kind, name, "Added new tag");
        Ok(true)
    }

    /// Snapshot the current document
    pub async fn backup(&self, environment: &str) -> Result<PathBuf> {
        let lock = self.locks.lock_for(environment);
        let _guard = lock.read().await;
        self.store.backup(environment).await
    }

    /// Backups, newest first
    pub async fn list_backups(&self, environment: &str) -> Result<Vec<BackupInfo>> {
        let lock = self.locks.lock_for(environment);
        let _guard = lock.read().await;
        self.store.list_backups(environment).await
    }

    /// Delete backups beyond the `keep` newest (0 keeps everything)
    pub async fn prune_backups(&self, environment: &str, keep: usize) -> Result<Vec<PathBuf>> {
        let lock = self.locks.lock_for(environment);
        let _guard = lock.write().await;
        self.store.prune(environment, keep).await
    }

    /// Replace the current document with a backup
    pub async fn restore(&self, environment: &str, backup: &Path) -> Result<PathBuf> {
        let lock = self.locks.lock_for(environment);
        let _guard = lock.write().await;
        self.store.restore(environment, backup).await
    }

    /// Probe whether the remote list call currently succeeds
    pub async fn health(&self, environment: &str) -> Result<HealthStatus> {
        let remote = self.remote(environment)?;
        let (remote_connected, records, error) = match remote.list_records().await {
            Ok(records) => (true, Some(records.len()), None),
            Err(e) => {
                warn!(environment, error = %e, "Health check failed");
                (false, None, Some(e.to_string()))
            }
        };

        Ok(HealthStatus {
            environment: environment.to_string(),
            provider: remote.provider_name().to_string(),
            domain: remote.domain().to_string(),
            remote_connected,
            records,
            error,
        })
    }

    /// Domain of a registered environment, empty when unregistered
    fn domain_for(&self, environment: &str) -> String {
        self.remote(environment)
            .map(|r| r.domain().to_string())
            .unwrap_or_default()
    }

    /// Load or synthesize the document, fill vocabularies, migrate identities
    async fn load_document(&self, environment: &str, domain: &str) -> Result<Loaded> {
        let (mut document, exists) = match self.store.load(environment).await? {
            Some(document) => (document, true),
            None => (DesiredStateDocument::empty(environment, domain), false),
        };

        document.apply_default_vocabularies(
            &self.config.default_account_tags,
            &self.config.default_container_tags,
        );

        let migrated = document.assign_missing_identities();
        if migrated > 0 {
            info!(environment, migrated, "Assigned identities to legacy records");
        }

        Ok(Loaded {
            document,
            exists,
            migrated,
        })
    }

    async fn persist(&self, environment: &str, document: &mut DesiredStateDocument) -> Result<()> {
        self.store.save(environment, document).await?;
        self.emit_event(SyncEvent::DocumentSaved {
            environment: environment.to_string(),
            records: document.records.len(),
        });
        Ok(())
    }

    /// Stamp activations into the document and save it.
    ///
    /// Failures are logged and published, never returned: the remote has
    /// already changed and stays the source of truth.
    async fn persist_activations(
        &self,
        environment: &str,
        domain: &str,
        activations: &[Activation],
        description: &str,
        now: DateTime<Utc>,
    ) {
        let lock = self.locks.lock_for(environment);
        let _guard = lock.write().await;

        let result: Result<()> = async {
            let Loaded { mut document, .. } = self.load_document(environment, domain).await?;
            for activation in activations {
                record_activation(&mut document, activation, description, now);
            }
            self.persist(environment, &mut document).await
        }
        .await;

        if let Err(e) = result {
            error!(environment, error = %e, "Failed to save document after updates");
            self.emit_event(SyncEvent::PersistFailed {
                environment: environment.to_string(),
                error: e.to_string(),
            });
        }
    }

    /// Emit a sync event
    fn emit_event(&self, event: SyncEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, discarding event");
            }
        }
    }
}

/// Update or append the local record for an activated key
fn record_activation(
    document: &mut DesiredStateDocument,
    activation: &Activation,
    description: &str,
    now: DateTime<Utc>,
) {
    let Activation { key, request } = activation;
    let selector = RecordSelector::with_fallback(key.identity(), key.clone());

    let record = match document.position(&selector) {
        Some(index) => &mut document.records[index],
        None => {
            document.records.push(DesiredRecord {
                alias: request.alias.clone(),
                description: description.to_string(),
                comment: request.alias.clone(),
                ..DesiredRecord::new(key.name.clone(), key.address, now)
            });
            let last = document.records.len() - 1;
            &mut document.records[last]
        }
    };

    record.last_activated_at = Some(now);
    record.ttl = request.effective_ttl();
    record.proxied = request.proxied;
    if let Some(account) = &request.account {
        record.set_tag(TagKind::Account, account);
    }
    if let Some(container) = &request.container {
        record.set_tag(TagKind::Container, container);
    }
}
