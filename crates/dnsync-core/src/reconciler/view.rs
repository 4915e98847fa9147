//! Unified operator view: desired records and remote records grouped by address

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::identity::RecordIdentity;
use crate::model::{DesiredStateDocument, RecordKey, RecordSelector, RemoteRecord, short_name};

/// One name-variant under an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewEntry {
    pub identity: RecordIdentity,
    /// Name with the domain stripped (`us.xmr`)
    pub name: String,
    pub fqdn: String,
    pub alias: String,
    pub account: Option<String>,
    pub container: Option<String>,
    pub proxied: bool,
    pub ttl: u32,
    pub active: bool,
    /// Only set for active entries
    pub remote_id: Option<String>,
}

/// Every known entry for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressGroup {
    pub address: Ipv4Addr,
    /// Distinct aliases joined by `"; "`
    pub names: String,
    /// First non-empty notes among the group's records
    pub notes: String,
    pub entries: Vec<ViewEntry>,
    pub has_active_entries: bool,
}

impl AddressGroup {
    fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            names: String::new(),
            notes: String::new(),
            entries: Vec::new(),
            has_active_entries: false,
        }
    }

    fn add_alias(&mut self, alias: &str) {
        if alias.is_empty() || self.names.split("; ").any(|n| n == alias) {
            return;
        }
        if !self.names.is_empty() {
            self.names.push_str("; ");
        }
        self.names.push_str(alias);
    }

    fn add_notes(&mut self, notes: &str) {
        if self.notes.is_empty() && !notes.is_empty() {
            self.notes = notes.to_string();
        }
    }
}

/// Desired ∪ remote, grouped by address and sorted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnifiedView {
    pub environment: String,
    pub domain: String,
    pub groups: Vec<AddressGroup>,
    /// Distinct addresses
    pub total_servers: usize,
    pub active_count: usize,
    pub inactive_count: usize,
    pub account_tags: Vec<String>,
    pub container_tags: Vec<String>,
}

impl UnifiedView {
    /// Build the view from a loaded document and a fresh remote listing.
    ///
    /// Remote records resolve their local metadata by identity first, then by
    /// `(name, address)`. A local record is inactive when the remote lists
    /// nothing under its key or identity.
    pub fn build(document: &DesiredStateDocument, remote: &[RemoteRecord]) -> Self {
        let domain = document.domain.as_str();
        let mut groups: BTreeMap<Ipv4Addr, AddressGroup> = BTreeMap::new();
        let mut active_count = 0;

        let mut remote_keys: HashSet<RecordKey> = HashSet::new();
        let mut remote_identities: HashSet<RecordIdentity> = HashSet::new();

        for record in remote {
            let key = record.key();
            let identity = record.identity();
            let short = short_name(&record.name, domain);
            let local = document.find(&RecordSelector::with_fallback(identity.clone(), key.clone()));

            let alias = local
                .map(|l| l.alias.as_str())
                .filter(|a| !a.is_empty())
                .or_else(|| Some(record.comment.as_str()).filter(|c| !c.is_empty()))
                .unwrap_or(short)
                .to_string();

            let group = groups
                .entry(record.address)
                .or_insert_with(|| AddressGroup::new(record.address));
            group.add_alias(&alias);
            if let Some(local) = local {
                group.add_notes(&local.notes);
            }
            group.has_active_entries = true;
            group.entries.push(ViewEntry {
                identity: identity.clone(),
                name: short.to_string(),
                fqdn: record.name.clone(),
                alias,
                account: local.and_then(|l| l.account.clone()),
                container: local.and_then(|l| l.container.clone()),
                proxied: record.proxied,
                ttl: record.ttl,
                active: true,
                remote_id: Some(record.remote_id.clone()),
            });
            active_count += 1;

            remote_keys.insert(key);
            remote_identities.insert(identity);
        }

        let mut inactive_count = 0;
        for local in &document.records {
            let active = remote_keys.contains(&local.key())
                || (!local.identity.is_empty() && remote_identities.contains(&local.identity));
            if active {
                continue;
            }

            let identity = if local.identity.is_empty() {
                RecordIdentity::derive(&local.name, local.address)
            } else {
                local.identity.clone()
            };

            let group = groups
                .entry(local.address)
                .or_insert_with(|| AddressGroup::new(local.address));
            group.add_alias(&local.alias);
            group.add_notes(&local.notes);
            group.entries.push(ViewEntry {
                identity,
                name: short_name(&local.name, domain).to_string(),
                fqdn: local.name.clone(),
                alias: local.alias.clone(),
                account: local.account.clone(),
                container: local.container.clone(),
                proxied: local.proxied,
                ttl: local.ttl,
                active: false,
                remote_id: None,
            });
            inactive_count += 1;
        }

        let groups: Vec<AddressGroup> = groups.into_values().collect();

        Self {
            environment: document.environment.clone(),
            domain: document.domain.clone(),
            total_servers: groups.len(),
            groups,
            active_count,
            inactive_count,
            account_tags: document.account_tags.clone(),
            container_tags: document.container_tags.clone(),
        }
    }

    pub fn group(&self, address: Ipv4Addr) -> Option<&AddressGroup> {
        self.groups.iter().find(|g| g.address == address)
    }
}
