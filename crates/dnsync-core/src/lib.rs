// # dnsync-core
//
// Core library for keeping remote DNS A records in sync with a locally
// declared desired state.
//
// ## Architecture Overview
//
// - **RemoteDns**: Trait for listing, creating and deleting records at the remote authority
// - **DocumentStore**: Trait for persisting the desired-state document with a backup trail
// - **Reconciler**: Builds the unified view, diffs, applies and persists
// - **RecordIdentity**: Stable token for a `(name, address)` pair
// - **ProviderRegistry**: Plugin-based registry for remote clients
//
// ## Design Principles
//
// 1. **Remote is the source of truth**: The document caches intent and metadata
// 2. **Reconcile by diff**: Re-running with the same desired set is a no-op
// 3. **Undoable writes**: Every document write is preceded by a backup
// 4. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 5. **Library-First**: The CLI is a thin layer over this crate

pub mod config;
pub mod error;
pub mod identity;
pub mod locks;
pub mod model;
pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod snapshot;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    ClientConfig, CredentialSource, Credentials, EnvCredentialSource, ReconcilerConfig,
    StoreConfig,
};
pub use error::{Error, Result};
pub use identity::RecordIdentity;
pub use model::{
    ActivationRequest, DesiredRecord, DesiredStateDocument, DetailStatus, NewRecord,
    OperationDetail, RecordKey, RecordSelector, RemoteRecord, RunResult, TagKind,
};
pub use reconciler::{HealthStatus, Reconciler, SyncEvent, UnifiedView};
pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;
pub use snapshot::FileSnapshotStore;
pub use traits::{BackupInfo, CreateOutcome, DeleteOutcome, DocumentStore, RemoteDns};
