// # File Snapshot Store
//
// File-based implementation of DocumentStore with a timestamped backup trail.
//
// ## Layout
//
// ```text
// <data_dir>/records.production.json
// <backup_dir>/records.production.json.backup-20250109-120000
// <backup_dir>/records.production.json.backup-20250109-120000-1   (same second)
// ```
//
// ## Durability
//
// - Atomic writes: the new document goes to a temp file, then is renamed
// - Backup before write: every save copies the current file first
// - Retention: backups beyond `keep_backups` are pruned after each backup
// - Corruption detection: a document that does not parse is an error, never
//   silently replaced

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::StoreConfig;
use crate::model::DesiredStateDocument;
use crate::traits::document_store::{BackupInfo, DocumentStore};

/// Backup file name marker, appended to the document file name
const BACKUP_MARKER: &str = ".backup-";

/// Timestamp format used in backup names (seconds resolution)
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// File-based snapshot store
///
/// # Example
///
/// ```rust,no_run
/// use dnsync_core::config::StoreConfig;
/// use dnsync_core::snapshot::FileSnapshotStore;
/// use dnsync_core::traits::DocumentStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSnapshotStore::new(StoreConfig::new("/var/lib/dnsync").with_keep_backups(5));
///
///     if let Some(mut doc) = store.load("production").await? {
///         doc.add_vocabulary_tag(dnsync_core::TagKind::Account, "Pool4");
///         store.save("production", &mut doc).await?;
///     }
///
///     for backup in store.list_backups("production").await? {
///         println!("{} ({} bytes)", backup.path.display(), backup.size);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    config: StoreConfig,
}

impl FileSnapshotStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of an environment's document
    pub fn document_path(&self, environment: &str) -> PathBuf {
        self.config.document_path(environment)
    }

    fn backup_dir(&self, environment: &str) -> PathBuf {
        self.config.backup_dir_for(&self.document_path(environment))
    }

    /// File name prefix shared by every backup of an environment's document
    fn backup_prefix(&self, environment: &str) -> String {
        let document = self.document_path(environment);
        let file_name = document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{file_name}{BACKUP_MARKER}")
    }

    /// Next free backup path; same-second collisions get a `-N` suffix
    fn next_backup_path(&self, environment: &str) -> PathBuf {
        let dir = self.backup_dir(environment);
        let stem = format!(
            "{}{}",
            self.backup_prefix(environment),
            Local::now().format(BACKUP_TIMESTAMP_FORMAT)
        );

        let mut candidate = dir.join(&stem);
        let mut n = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{stem}-{n}"));
            n += 1;
        }
        candidate
    }

    /// Copy the current document, unchanged, into a new backup file
    async fn snapshot(&self, environment: &str) -> Result<PathBuf, Error> {
        let document = self.document_path(environment);
        if !document.exists() {
            return Err(Error::not_found(format!(
                "No document to back up: {}",
                document.display()
            )));
        }

        let dir = self.backup_dir(environment);
        fs::create_dir_all(&dir).await.map_err(|e| {
            Error::config(format!(
                "Failed to create backup directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let backup = self.next_backup_path(environment);
        fs::copy(&document, &backup).await?;

        tracing::info!(environment, path = %backup.display(), "Backup created");
        Ok(backup)
    }

    /// Prune with the configured retention, logging instead of failing
    async fn prune_configured(&self, environment: &str) {
        if let Err(e) = self.prune(environment, self.config.keep_backups).await {
            tracing::warn!(environment, error = %e, "Failed to prune old backups");
        }
    }

    /// Write bytes to `path` atomically (temp file, then rename)
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create data directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let temp_path = Self::temp_path(path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!(path = %path.display(), "Document written");
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    /// Sort key for a backup file name: timestamp, then collision suffix
    fn backup_sequence<'a>(file_name: &'a str, prefix: &str) -> (&'a str, u32) {
        let rest = file_name.strip_prefix(prefix).unwrap_or(file_name);
        match rest.get(15..) {
            Some(suffix) if !suffix.is_empty() => (
                &rest[..15],
                suffix.trim_start_matches('-').parse().unwrap_or(0),
            ),
            _ => (rest, 0),
        }
    }
}

#[async_trait]
impl DocumentStore for FileSnapshotStore {
    async fn load(&self, environment: &str) -> Result<Option<DesiredStateDocument>, Error> {
        let path = self.document_path(environment);
        if !path.exists() {
            tracing::debug!(environment, path = %path.display(), "Document does not exist");
            return Ok(None);
        }

        let content = fs::read(&path).await?;
        let document: DesiredStateDocument = serde_json::from_slice(&content).map_err(|e| {
            Error::corrupt_document(
                &path,
                format!("{e}. File may be corrupted. Try restoring from backup."),
            )
        })?;

        tracing::debug!(
            environment,
            records = document.records.len(),
            "Loaded document"
        );
        Ok(Some(document))
    }

    async fn save(
        &self,
        environment: &str,
        document: &mut DesiredStateDocument,
    ) -> Result<(), Error> {
        let path = self.document_path(environment);

        if path.exists() {
            match self.snapshot(environment).await {
                Ok(_) => self.prune_configured(environment).await,
                Err(e) => tracing::warn!(environment, error = %e, "Failed to create backup"),
            }
        }

        document.last_sync = Some(Utc::now());
        let json = serde_json::to_vec_pretty(document)?;
        Self::write_atomic(&path, &json).await?;

        tracing::info!(
            environment,
            path = %path.display(),
            records = document.records.len(),
            "Document saved"
        );
        Ok(())
    }

    async fn backup(&self, environment: &str) -> Result<PathBuf, Error> {
        let backup = self.snapshot(environment).await?;
        self.prune_configured(environment).await;
        Ok(backup)
    }

    async fn list_backups(&self, environment: &str) -> Result<Vec<BackupInfo>, Error> {
        let dir = self.backup_dir(environment);
        let prefix = self.backup_prefix(environment);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified: DateTime<Utc> = metadata.modified()?.into();
            backups.push(BackupInfo {
                path: entry.path(),
                size: metadata.len(),
                modified,
            });
        }

        backups.sort_by(|a, b| {
            let name_a = a.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let name_b = b.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let key_a = (a.modified, Self::backup_sequence(&name_a, &prefix));
            let key_b = (b.modified, Self::backup_sequence(&name_b, &prefix));
            key_b.cmp(&key_a)
        });

        Ok(backups)
    }

    async fn prune(&self, environment: &str, keep: usize) -> Result<Vec<PathBuf>, Error> {
        if keep == 0 {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for backup in self.list_backups(environment).await?.into_iter().skip(keep) {
            match fs::remove_file(&backup.path).await {
                Ok(()) => {
                    tracing::info!(environment, path = %backup.path.display(), "Removed old backup");
                    removed.push(backup.path);
                }
                Err(e) => {
                    tracing::warn!(
                        environment,
                        path = %backup.path.display(),
                        error = %e,
                        "Failed to remove old backup"
                    );
                }
            }
        }
        Ok(removed)
    }

    async fn restore(&self, environment: &str, backup: &Path) -> Result<PathBuf, Error> {
        let bytes = fs::read(backup)
            .await
            .map_err(|e| Error::invalid_backup(backup, format!("failed to read: {e}")))?;

        serde_json::from_slice::<DesiredStateDocument>(&bytes)
            .map_err(|e| Error::invalid_backup(backup, e.to_string()))?;

        let path = self.document_path(environment);
        if path.exists() {
            let undo = self.snapshot(environment).await?;
            tracing::info!(environment, path = %undo.display(), "Current document backed up before restore");
            self.prune_configured(environment).await;
        }

        Self::write_atomic(&path, &bytes).await?;

        tracing::info!(
            environment,
            from = %backup.display(),
            "Document restored from backup"
        );
        Ok(path)
    }
}
