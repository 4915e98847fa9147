//! Data model shared by the store, the remote client and the reconciler
//!
//! ## File Format
//!
//! ```json
//! {
//!   "environment": "test",
//!   "domain": "example.com",
//!   "last_sync": "2025-01-09T12:00:00Z",
//!   "records": [
//!     {
//!       "identity": "3f1c0e9a7b2d4c61",
//!       "alias": "frankfurt-1",
//!       "description": "Imported from remote on 2025-01-09",
//!       "account": "Pool1",
//!       "type": "A",
//!       "name": "us.xmr.example.com",
//!       "address": "10.0.0.2",
//!       "ttl": 60,
//!       "proxied": false,
//!       "comment": "frankfurt-1",
//!       "first_seen_at": "2025-01-09T12:00:00Z",
//!       "last_activated_at": "2025-01-09T12:00:00Z"
//!     }
//!   ],
//!   "account_tags": ["Pool1", "Pool2"],
//!   "container_tags": ["Group1"]
//! }
//! ```

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::identity::RecordIdentity;

/// TTL applied when a caller passes zero
pub const DEFAULT_TTL: u32 = 60;

/// The only record type this system manages
pub const RECORD_TYPE_A: &str = "A";

/// Qualify a short name (`us.xmr`) with the zone domain.
///
/// The result is lowercase. Names that are not the domain or one of its
/// subdomains get the domain appended.
pub fn qualify_name(name: &str, domain: &str) -> String {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() || in_zone(&name, &domain) {
        name
    } else {
        format!("{name}.{domain}")
    }
}

/// True when `name` is `domain` or a subdomain of it, ignoring case
pub fn in_zone(name: &str, domain: &str) -> bool {
    name.eq_ignore_ascii_case(domain) || zone_prefix(name, domain).is_some()
}

/// Strip the zone domain from a fully-qualified name
pub fn short_name<'a>(fqdn: &'a str, domain: &str) -> &'a str {
    zone_prefix(fqdn, domain).unwrap_or(fqdn)
}

/// The labels of `name` in front of `.domain`, if any
fn zone_prefix<'a>(name: &'a str, domain: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(domain.len())?;
    let suffix = name.get(split..)?;
    if domain.is_empty() || !suffix.eq_ignore_ascii_case(domain) {
        return None;
    }
    name.get(..split)?
        .strip_suffix('.')
        .filter(|rest| !rest.is_empty())
}

/// Diff key: fully-qualified name plus address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub name: String,
    pub address: Ipv4Addr,
}

impl RecordKey {
    /// Keys compare names case-insensitively; the name is stored lowercase
    pub fn new(name: impl Into<String>, address: Ipv4Addr) -> Self {
        let mut name = name.into();
        name.make_ascii_lowercase();
        Self { name, address }
    }

    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::derive(&self.name, self.address)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.address)
    }
}

/// The two independently maintained tag vocabularies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Account,
    Container,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKind::Account => f.write_str("account"),
            TagKind::Container => f.write_str("container"),
        }
    }
}

impl FromStr for TagKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "account" => Ok(TagKind::Account),
            "container" => Ok(TagKind::Container),
            other => Err(Error::invalid_input(format!(
                "Invalid tag type '{other}'. Valid types: account, container"
            ))),
        }
    }
}

/// Remote-only state attached to a record while reconciling; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteState {
    pub remote_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// One logical DNS entry the operator wants to be able to activate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredRecord {
    /// Empty only in documents written before identities existed
    #[serde(default)]
    pub identity: RecordIdentity,

    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    #[serde(rename = "type", default = "default_record_type")]
    pub record_type: String,
    pub name: String,
    pub address: Ipv4Addr,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activated_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    pub remote: Option<RemoteState>,
}

fn default_record_type() -> String {
    RECORD_TYPE_A.to_string()
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

impl DesiredRecord {
    /// Create a freshly seen record for `name -> address`
    pub fn new(name: impl Into<String>, address: Ipv4Addr, now: DateTime<Utc>) -> Self {
        let name = name.into();
        Self {
            identity: RecordIdentity::derive(&name, address),
            alias: String::new(),
            description: String::new(),
            notes: String::new(),
            account: None,
            container: None,
            record_type: default_record_type(),
            name,
            address,
            ttl: DEFAULT_TTL,
            proxied: false,
            comment: String::new(),
            tags: Vec::new(),
            first_seen_at: Some(now),
            last_activated_at: None,
            remote: None,
        }
    }

    /// Import a record discovered at the remote authority
    pub fn imported(remote: &RemoteRecord, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        let alias = if remote.comment.is_empty() {
            format!("server-{}", remote.address.to_string().replace('.', "-"))
        } else {
            remote.comment.clone()
        };

        Self {
            alias,
            description: description.into(),
            ttl: remote.ttl,
            proxied: remote.proxied,
            comment: remote.comment.clone(),
            tags: remote.tags.clone(),
            last_activated_at: Some(now),
            remote: Some(remote.remote_state()),
            ..Self::new(remote.name.clone(), remote.address, now)
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.name.clone(), self.address)
    }

    pub fn matches_key(&self, key: &RecordKey) -> bool {
        self.name.eq_ignore_ascii_case(&key.name) && self.address == key.address
    }

    pub fn tag(&self, kind: TagKind) -> Option<&str> {
        match kind {
            TagKind::Account => self.account.as_deref(),
            TagKind::Container => self.container.as_deref(),
        }
    }

    /// Set or clear (empty value) a classification tag
    pub fn set_tag(&mut self, kind: TagKind, value: &str) {
        let value = value.trim();
        let value = (!value.is_empty()).then(|| value.to_string());
        match kind {
            TagKind::Account => self.account = value,
            TagKind::Container => self.container = value,
        }
    }

    /// Assign the derived identity when missing; returns whether it changed
    pub fn ensure_identity(&mut self) -> bool {
        if self.identity.is_empty() {
            self.identity = RecordIdentity::derive(&self.name, self.address);
            true
        } else {
            false
        }
    }
}

/// Selects a local record by identity, falling back to `(name, address)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSelector {
    pub identity: Option<RecordIdentity>,
    pub key: Option<RecordKey>,
}

impl RecordSelector {
    pub fn by_identity(identity: RecordIdentity) -> Self {
        Self {
            identity: Some(identity),
            key: None,
        }
    }

    pub fn by_key(key: RecordKey) -> Self {
        Self {
            identity: None,
            key: Some(key),
        }
    }

    pub fn with_fallback(identity: RecordIdentity, key: RecordKey) -> Self {
        Self {
            identity: Some(identity),
            key: Some(key),
        }
    }
}

impl fmt::Display for RecordSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.identity, &self.key) {
            (Some(id), Some(key)) => write!(f, "{id} ({key})"),
            (Some(id), None) => write!(f, "{id}"),
            (None, Some(key)) => write!(f, "{key}"),
            (None, None) => f.write_str("<empty selector>"),
        }
    }
}

/// Desired state of one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredStateDocument {
    pub environment: String,
    pub domain: String,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records: Vec<DesiredRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub account_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_tags: Vec<String>,
}

impl DesiredStateDocument {
    pub fn empty(environment: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            domain: domain.into(),
            last_sync: None,
            records: Vec::new(),
            account_tags: Vec::new(),
            container_tags: Vec::new(),
        }
    }

    /// Index of the record a selector points at: identity first, then key
    pub fn position(&self, selector: &RecordSelector) -> Option<usize> {
        let by_identity = selector.identity.as_ref().and_then(|id| {
            self.records
                .iter()
                .position(|r| !r.identity.is_empty() && &r.identity == id)
        });

        by_identity.or_else(|| {
            selector
                .key
                .as_ref()
                .and_then(|key| self.records.iter().position(|r| r.matches_key(key)))
        })
    }

    pub fn find(&self, selector: &RecordSelector) -> Option<&DesiredRecord> {
        self.position(selector).map(|i| &self.records[i])
    }

    pub fn find_mut(&mut self, selector: &RecordSelector) -> Option<&mut DesiredRecord> {
        self.position(selector).map(move |i| &mut self.records[i])
    }

    /// Migrate entries written before identities existed
    pub fn assign_missing_identities(&mut self) -> usize {
        self.records
            .iter_mut()
            .map(DesiredRecord::ensure_identity)
            .filter(|changed| *changed)
            .count()
    }

    pub fn vocabulary(&self, kind: TagKind) -> &[String] {
        match kind {
            TagKind::Account => &self.account_tags,
            TagKind::Container => &self.container_tags,
        }
    }

    /// Append a tag to a vocabulary if absent, keeping it sorted
    pub fn add_vocabulary_tag(&mut self, kind: TagKind, name: &str) -> bool {
        let tags = match kind {
            TagKind::Account => &mut self.account_tags,
            TagKind::Container => &mut self.container_tags,
        };
        if tags.iter().any(|t| t == name) {
            return false;
        }
        tags.push(name.to_string());
        tags.sort();
        true
    }

    /// Fill empty vocabularies with defaults
    pub fn apply_default_vocabularies(&mut self, accounts: &[String], containers: &[String]) {
        if self.account_tags.is_empty() {
            self.account_tags = accounts.to_vec();
        }
        if self.container_tags.is_empty() {
            self.container_tags = containers.to_vec();
        }
    }
}

/// The remote authority's view of one A record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub remote_id: String,
    pub record_type: String,
    pub name: String,
    pub address: Ipv4Addr,
    pub ttl: u32,
    pub proxied: bool,
    pub comment: String,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.name.clone(), self.address)
    }

    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::derive(&self.name, self.address)
    }

    pub fn remote_state(&self) -> RemoteState {
        RemoteState {
            remote_id: self.remote_id.clone(),
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }
}

/// Payload for a single remote create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Short or fully-qualified name; the client qualifies it
    pub name: String,
    pub address: Ipv4Addr,
    /// Stored as the remote record's comment
    pub comment: String,
    pub proxied: bool,
    /// Zero means [`DEFAULT_TTL`]
    pub ttl: u32,
}

impl NewRecord {
    pub fn new(name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            address,
            comment: String::new(),
            proxied: false,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn effective_ttl(&self) -> u32 {
        if self.ttl == 0 { DEFAULT_TTL } else { self.ttl }
    }
}

/// One entry of the operator's desired activation set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    /// Short (`us.xmr`) or fully-qualified name
    pub name: String,
    pub address: Ipv4Addr,
    #[serde(default)]
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl ActivationRequest {
    pub fn new(name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            address,
            alias: String::new(),
            account: None,
            container: None,
            proxied: false,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_tag(mut self, kind: TagKind, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match kind {
            TagKind::Account => self.account = value,
            TagKind::Container => self.container = value,
        }
        self
    }

    pub fn effective_ttl(&self) -> u32 {
        if self.ttl == 0 { DEFAULT_TTL } else { self.ttl }
    }

    /// Alias to display and store as the remote comment
    pub fn effective_alias(&self, domain: &str) -> String {
        if self.alias.trim().is_empty() {
            short_name(&qualify_name(&self.name, domain), domain).to_string()
        } else {
            self.alias.trim().to_string()
        }
    }
}

/// Outcome of a single attempted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailStatus {
    Success,
    /// Applied, but the remote has not confirmed it yet
    Warning,
    Error,
}

/// Progress line for operator-facing display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDetail {
    pub message: String,
    pub status: DetailStatus,
}

impl OperationDetail {
    pub fn new(status: DetailStatus, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

/// Result of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// False when any operation failed
    pub success: bool,
    pub message: String,
    /// Operations that reached the remote authority
    pub applied: usize,
    pub failed: usize,
    pub details: Vec<OperationDetail>,
}
