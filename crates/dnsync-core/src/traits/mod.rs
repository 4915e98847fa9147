//! Core traits for dnsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RemoteDns`]: List, create and delete records at the remote authority
//! - [`DocumentStore`]: Persist desired state with a backup trail

pub mod document_store;
pub mod remote_dns;

pub use document_store::{BackupInfo, DocumentStore};
pub use remote_dns::{CreateOutcome, DeleteOutcome, RemoteDns, RemoteDnsFactory};
