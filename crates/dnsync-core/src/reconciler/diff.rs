//! Diff planning between the remote record set and a desired activation set
//!
//! Keys are `(fully-qualified name, address)`. A desired key missing at the
//! remote is created; a remote key nobody asked for is deleted. Keys present
//! on both sides are left alone, even when ttl or proxied differ: those are
//! reported as drift and need a deactivate/reactivate cycle to change.

use std::collections::BTreeMap;

use crate::model::{ActivationRequest, RecordKey, RemoteRecord, qualify_name};

/// A create the reconciler should issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCreate {
    /// Key with the name already qualified
    pub key: RecordKey,
    pub request: ActivationRequest,
}

/// Operations needed to converge the remote on the desired set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub creates: Vec<PlannedCreate>,
    /// Every remote record under a key that is not desired, duplicates included
    pub deletes: Vec<RemoteRecord>,
    pub unchanged: Vec<RecordKey>,
    /// Unchanged keys whose ttl or proxied flag differs from the request
    pub drifted: Vec<RecordKey>,
}

impl SyncPlan {
    /// Build the plan. Deterministic: keys are visited in sorted order.
    ///
    /// When the same key is requested twice, the last request wins.
    pub fn build(domain: &str, remote: &[RemoteRecord], desired: &[ActivationRequest]) -> Self {
        let mut wanted: BTreeMap<RecordKey, &ActivationRequest> = BTreeMap::new();
        for request in desired {
            let key = RecordKey::new(qualify_name(&request.name, domain), request.address);
            wanted.insert(key, request);
        }

        let mut current: BTreeMap<RecordKey, Vec<&RemoteRecord>> = BTreeMap::new();
        for record in remote {
            current.entry(record.key()).or_default().push(record);
        }

        let mut plan = SyncPlan::default();

        for (key, request) in &wanted {
            match current.get(key) {
                None => plan.creates.push(PlannedCreate {
                    key: key.clone(),
                    request: ActivationRequest {
                        name: key.name.clone(),
                        ..(*request).clone()
                    },
                }),
                Some(records) => {
                    let ttl = request.effective_ttl();
                    if records
                        .iter()
                        .any(|r| r.ttl != ttl || r.proxied != request.proxied)
                    {
                        plan.drifted.push(key.clone());
                    }
                    plan.unchanged.push(key.clone());
                }
            }
        }

        for (key, records) in current {
            if !wanted.contains_key(&key) {
                plan.deletes.extend(records.into_iter().cloned());
            }
        }

        plan
    }

    /// Number of remote mutations this plan will issue
    pub fn operation_count(&self) -> usize {
        self.creates.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }
}
