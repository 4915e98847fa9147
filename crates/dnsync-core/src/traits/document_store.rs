// # Document Store Trait
//
// Defines the interface for persisting desired-state documents and their
// backup trail.
//
// ## Purpose
//
// The document is a cache of operator intent and metadata; the remote
// authority stays the source of truth for which records are live. Every
// mutating write is preceded by a backup of the prior state, so any applied
// change can be undone.
//
// ## Implementations
//
// - File-based: `snapshot::FileSnapshotStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::model::DesiredStateDocument;

/// A backup file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Trait for desired-state document stores
///
/// # Thread Safety
///
/// Implementations do not serialize access per environment themselves; the
/// reconciler holds the environment lock around every call.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load an environment's document
    ///
    /// # Returns
    ///
    /// - `Ok(Some(doc))`: the parsed document
    /// - `Ok(None)`: no document yet
    /// - `Err(CorruptDocument)`: the file exists but does not parse
    async fn load(&self, environment: &str) -> Result<Option<DesiredStateDocument>, crate::Error>;

    /// Back up the current document (if any), prune, then write `document`.
    ///
    /// Stamps `document.last_sync`. Backup failure is logged and does not
    /// block the write.
    async fn save(
        &self,
        environment: &str,
        document: &mut DesiredStateDocument,
    ) -> Result<(), crate::Error>;

    /// Snapshot the current document; fails with `NotFound` if there is none
    async fn backup(&self, environment: &str) -> Result<PathBuf, crate::Error>;

    /// Backups, newest first by modification time
    async fn list_backups(&self, environment: &str) -> Result<Vec<BackupInfo>, crate::Error>;

    /// Delete every backup beyond the `keep` newest; `keep == 0` keeps all
    async fn prune(&self, environment: &str, keep: usize) -> Result<Vec<PathBuf>, crate::Error>;

    /// Replace the current document with a backup's bytes.
    ///
    /// The backup must parse (`InvalidBackup` otherwise). The current
    /// document is snapshotted first, so a restore can itself be undone.
    async fn restore(&self, environment: &str, backup: &Path) -> Result<PathBuf, crate::Error>;
}
