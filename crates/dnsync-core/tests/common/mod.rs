//! Test doubles and common utilities for reconciler contract tests
//!
//! The doubles keep state in memory and count calls so tests can assert on
//! exactly which remote operations a run issued.

#![allow(dead_code)]

use async_trait::async_trait;
use dnsync_core::config::{ReconcilerConfig, StoreConfig};
use dnsync_core::error::{Error, Result};
use dnsync_core::model::{NewRecord, RemoteRecord, qualify_name};
use dnsync_core::traits::{BackupInfo, CreateOutcome, DeleteOutcome, DocumentStore, RemoteDns};
use dnsync_core::{DesiredStateDocument, FileSnapshotStore, Reconciler, SyncEvent};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const DOMAIN: &str = "example.com";

/// An in-memory remote authority that tracks calls
pub struct MockRemoteDns {
    domain: String,
    records: Mutex<Vec<RemoteRecord>>,
    next_id: AtomicUsize,
    /// Call counters
    list_call_count: AtomicUsize,
    create_call_count: AtomicUsize,
    delete_call_count: AtomicUsize,
    /// (remote_id, expected address) of every verification
    verifications: Mutex<Vec<(String, Ipv4Addr)>>,
    /// Recorded create payloads
    created: Mutex<Vec<NewRecord>>,
    /// Recorded delete ids
    deleted: Mutex<Vec<String>>,
    /// Failure injection
    fail_list: AtomicBool,
    fail_create_for: Mutex<HashSet<Ipv4Addr>>,
    fail_delete_for: Mutex<HashSet<String>>,
    /// When set, verification never sees the created record
    lagging: AtomicBool,
}

impl MockRemoteDns {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            records: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            list_call_count: AtomicUsize::new(0),
            create_call_count: AtomicUsize::new(0),
            delete_call_count: AtomicUsize::new(0),
            verifications: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            fail_list: AtomicBool::new(false),
            fail_create_for: Mutex::new(HashSet::new()),
            fail_delete_for: Mutex::new(HashSet::new()),
            lagging: AtomicBool::new(false),
        }
    }

    /// Seed a record that exists at the remote before the test starts
    pub fn seed(&self, id: &str, name: &str, address: Ipv4Addr, comment: &str) {
        self.records
            .lock()
            .unwrap()
            .push(remote_record(id, name, address, comment));
    }

    pub fn records(&self) -> Vec<RemoteRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    pub fn create_call_count(&self) -> usize {
        self.create_call_count.load(Ordering::SeqCst)
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_call_count.load(Ordering::SeqCst)
    }

    /// Total mutations issued
    pub fn mutation_count(&self) -> usize {
        self.create_call_count() + self.delete_call_count()
    }

    pub fn created(&self) -> Vec<NewRecord> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn verifications(&self) -> Vec<(String, Ipv4Addr)> {
        self.verifications.lock().unwrap().clone()
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create_for(&self, address: Ipv4Addr) {
        self.fail_create_for.lock().unwrap().insert(address);
    }

    pub fn fail_delete_for(&self, remote_id: &str) {
        self.fail_delete_for
            .lock()
            .unwrap()
            .insert(remote_id.to_string());
    }

    pub fn set_lagging(&self, lagging: bool) {
        self.lagging.store(lagging, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteDns for MockRemoteDns {
    async fn list_records(&self) -> Result<Vec<RemoteRecord>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::remote_unavailable("connection refused"));
        }
        Ok(self.records())
    }

    async fn create_record(&self, record: &NewRecord) -> Result<CreateOutcome> {
        self.create_call_count.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(record.clone());

        if self
            .fail_create_for
            .lock()
            .unwrap()
            .contains(&record.address)
        {
            return Err(Error::remote_rejected(Some(400), "invalid content"));
        }

        let remote_id = format!("rec-new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut created = remote_record(
            &remote_id,
            &qualify_name(&record.name, &self.domain),
            record.address,
            &record.comment,
        );
        created.ttl = record.effective_ttl();
        created.proxied = record.proxied;
        self.records.lock().unwrap().push(created);

        let verified = self.verify_record(&remote_id, record.address).await;
        Ok(CreateOutcome {
            remote_id,
            verified,
        })
    }

    async fn delete_record(&self, remote_id: &str) -> Result<DeleteOutcome> {
        self.delete_call_count.fetch_add(1, Ordering::SeqCst);
        self.deleted.lock().unwrap().push(remote_id.to_string());

        if self.fail_delete_for.lock().unwrap().contains(remote_id) {
            return Err(Error::remote_rejected(Some(404), "record not found"));
        }

        self.records.lock().unwrap().retain(|r| r.remote_id != remote_id);
        Ok(DeleteOutcome { confirmed: true })
    }

    async fn verify_record(&self, remote_id: &str, expected: Ipv4Addr) -> bool {
        self.verifications
            .lock()
            .unwrap()
            .push((remote_id.to_string(), expected));
        if self.lagging.load(Ordering::SeqCst) {
            return false;
        }
        self.records()
            .iter()
            .any(|r| r.remote_id == remote_id && r.address == expected)
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A file store whose saves can be made to fail
pub struct FlakyDocumentStore {
    inner: FileSnapshotStore,
    fail_saves: AtomicBool,
    save_call_count: AtomicUsize,
}

impl FlakyDocumentStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            inner: FileSnapshotStore::new(StoreConfig::new(data_dir)),
            fail_saves: AtomicBool::new(false),
            save_call_count: AtomicUsize::new(0),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_call_count(&self) -> usize {
        self.save_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn load(&self, environment: &str) -> Result<Option<DesiredStateDocument>> {
        self.inner.load(environment).await
    }

    async fn save(&self, environment: &str, document: &mut DesiredStateDocument) -> Result<()> {
        self.save_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        self.inner.save(environment, document).await
    }

    async fn backup(&self, environment: &str) -> Result<PathBuf> {
        self.inner.backup(environment).await
    }

    async fn list_backups(&self, environment: &str) -> Result<Vec<BackupInfo>> {
        self.inner.list_backups(environment).await
    }

    async fn prune(&self, environment: &str, keep: usize) -> Result<Vec<PathBuf>> {
        self.inner.prune(environment, keep).await
    }

    async fn restore(&self, environment: &str, backup: &Path) -> Result<PathBuf> {
        self.inner.restore(environment, backup).await
    }
}

/// Build a remote record as the authority would list it
pub fn remote_record(id: &str, name: &str, address: Ipv4Addr, comment: &str) -> RemoteRecord {
    RemoteRecord {
        remote_id: id.to_string(),
        record_type: "A".to_string(),
        name: name.to_string(),
        address,
        ttl: 60,
        proxied: false,
        comment: comment.to_string(),
        tags: Vec::new(),
        created_at: None,
        modified_at: None,
    }
}

pub fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

/// A reconciler over a file store in `data_dir` with one "test" environment
pub struct Harness {
    pub reconciler: Arc<Reconciler>,
    pub events: mpsc::Receiver<SyncEvent>,
    pub remote: Arc<MockRemoteDns>,
    pub store: Arc<FlakyDocumentStore>,
}

impl Harness {
    pub fn new(data_dir: &Path) -> Self {
        let store = Arc::new(FlakyDocumentStore::new(data_dir));
        let (reconciler, events) = Reconciler::new(store.clone(), ReconcilerConfig::default())
            .expect("reconciler construction succeeds");
        let remote = Arc::new(MockRemoteDns::new(DOMAIN));
        reconciler.register_environment("test", remote.clone());

        Self {
            reconciler: Arc::new(reconciler),
            events,
            remote,
            store,
        }
    }

    pub async fn document(&self) -> Option<DesiredStateDocument> {
        self.store.load("test").await.expect("document loads")
    }

    /// Events published so far
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
