//! Events published by the reconciler for logging collaborators

use std::net::Ipv4Addr;

use tracing::Level;

/// Events emitted by the Reconciler
///
/// Each event maps to a `(level, message)` pair through [`SyncEvent::level`]
/// and [`SyncEvent::message`], so a consumer can forward them to any sink
/// without knowing the variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A reconciliation run started
    RunStarted {
        environment: String,
        requested: usize,
    },

    /// A record was created at the remote
    RecordCreated {
        environment: String,
        name: String,
        address: Ipv4Addr,
        remote_id: String,
        verified: bool,
    },

    /// A record was deleted at the remote
    RecordDeleted {
        environment: String,
        name: String,
        address: Ipv4Addr,
        remote_id: String,
        confirmed: bool,
    },

    /// A single create or delete failed
    OperationFailed {
        environment: String,
        operation: &'static str,
        name: String,
        address: Ipv4Addr,
        error: String,
    },

    /// The desired-state document was written
    DocumentSaved {
        environment: String,
        records: usize,
    },

    /// Writing the document failed after remote changes were applied
    PersistFailed {
        environment: String,
        error: String,
    },

    /// A reconciliation run finished
    RunFinished {
        environment: String,
        applied: usize,
        failed: usize,
    },
}

impl SyncEvent {
    pub fn environment(&self) -> &str {
        match self {
            SyncEvent::RunStarted { environment, .. }
            | SyncEvent::RecordCreated { environment, .. }
            | SyncEvent::RecordDeleted { environment, .. }
            | SyncEvent::OperationFailed { environment, .. }
            | SyncEvent::DocumentSaved { environment, .. }
            | SyncEvent::PersistFailed { environment, .. }
            | SyncEvent::RunFinished { environment, .. } => environment,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            SyncEvent::RecordCreated { verified: false, .. }
            | SyncEvent::RecordDeleted { confirmed: false, .. } => Level::WARN,
            SyncEvent::OperationFailed { .. } | SyncEvent::PersistFailed { .. } => Level::ERROR,
            SyncEvent::RunFinished { failed, .. } if *failed > 0 => Level::WARN,
            _ => Level::INFO,
        }
    }

    pub fn message(&self) -> String {
        match self {
            SyncEvent::RunStarted {
                environment,
                requested,
            } => format!("[{environment}] Reconciling {requested} desired records"),
            SyncEvent::RecordCreated {
                environment,
                name,
                address,
                remote_id,
                verified,
            } => {
                if *verified {
                    format!("[{environment}] Created {name} -> {address} (ID: {remote_id})")
                } else {
                    format!(
                        "[{environment}] Created {name} -> {address} (ID: {remote_id}), not yet visible at remote"
                    )
                }
            }
            SyncEvent::RecordDeleted {
                environment,
                name,
                address,
                remote_id,
                confirmed,
            } => {
                if *confirmed {
                    format!("[{environment}] Deleted {name} -> {address} (ID: {remote_id})")
                } else {
                    format!(
                        "[{environment}] Deleted {name} -> {address} (ID: {remote_id}), still listed at remote"
                    )
                }
            }
            SyncEvent::OperationFailed {
                environment,
                operation,
                name,
                address,
                error,
            } => format!("[{environment}] Failed to {operation} {name} -> {address}: {error}"),
            SyncEvent::DocumentSaved {
                environment,
                records,
            } => format!("[{environment}] Saved document with {records} records"),
            SyncEvent::PersistFailed { environment, error } => {
                format!("[{environment}] Failed to save document after updates: {error}")
            }
            SyncEvent::RunFinished {
                environment,
                applied,
                failed,
            } => format!("[{environment}] Run finished: {applied} applied, {failed} failed"),
        }
    }
}
