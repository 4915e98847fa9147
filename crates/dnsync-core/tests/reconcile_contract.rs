//! Contract Test: Reconciliation by Diff
//!
//! Constraints verified:
//! - Only keys that differ between desired and remote are touched
//! - Re-running with the same desired set is a no-op
//! - Per-key failures are reported without aborting the batch
//! - A listing failure aborts the run before any mutation
//! - Persistence failure after applied changes never rolls them back
//!
//! If this test fails, the reconciler no longer converges correctly.

mod common;

use common::*;
use dnsync_core::{ActivationRequest, DetailStatus, Error, SyncEvent, TagKind};
use tempfile::tempdir;

#[tokio::test]
async fn reconcile_twice_is_idempotent() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.seed("rec-1", "xmr.example.com", addr(1), "frankfurt-1");

    let desired = vec![
        ActivationRequest::new("xmr", addr(1)),
        ActivationRequest::new("us.xmr", addr(2)).with_alias("dallas"),
    ];

    let first = h.reconciler.reconcile("test", desired.clone()).await.unwrap();
    assert_eq!(first.applied, 1);
    assert_eq!(h.remote.mutation_count(), 1);

    let second = h.reconciler.reconcile("test", desired).await.unwrap();
    assert_eq!(second.applied, 0);
    assert!(second.details.is_empty());
    assert_eq!(second.message, "No changes required");
    assert_eq!(
        h.remote.mutation_count(),
        1,
        "second run must not issue any remote mutation"
    );
}

#[tokio::test]
async fn mixed_case_name_matches_lowercase_remote() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.seed("rec-1", "us.xmr.example.com", addr(1), "dallas");

    let result = h
        .reconciler
        .reconcile("test", vec![ActivationRequest::new("US.xmr", addr(1))])
        .await
        .unwrap();

    assert_eq!(result.applied, 0);
    assert_eq!(result.message, "No changes required");
    assert_eq!(
        h.remote.mutation_count(),
        0,
        "names differing only in case are the same record"
    );

    let view = h.reconciler.view("test").await.unwrap();
    assert_eq!(view.active_count, 1);
}

#[tokio::test]
async fn diff_creates_missing_and_deletes_unwanted() {
    // remote {A, B}, desired {B, C} → create C, delete A, leave B
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.seed("rec-a", "a.example.com", addr(1), "alpha");
    h.remote.seed("rec-b", "b.example.com", addr(2), "bravo");

    let result = h
        .reconciler
        .reconcile(
            "test",
            vec![
                ActivationRequest::new("b", addr(2)),
                ActivationRequest::new("c", addr(3)),
            ],
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.applied, 2);
    assert_eq!(h.remote.create_call_count(), 1);
    assert_eq!(h.remote.created()[0].name, "c.example.com");
    assert_eq!(h.remote.deleted(), vec!["rec-a".to_string()]);

    let ids: Vec<String> = h.remote.records().into_iter().map(|r| r.remote_id).collect();
    assert!(ids.contains(&"rec-b".to_string()), "B must be left untouched");
    assert!(!ids.contains(&"rec-a".to_string()));
}

#[tokio::test]
async fn empty_desired_set_deletes_remote_record() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.seed("rec-1", "xmr.example.com", addr(1), "frankfurt-1");

    // First view imports the record into the document
    h.reconciler.view("test").await.unwrap();

    let result = h.reconciler.reconcile("test", Vec::new()).await.unwrap();

    assert_eq!(h.remote.create_call_count(), 0);
    assert_eq!(h.remote.delete_call_count(), 1);
    assert_eq!(result.details.len(), 1);
    assert_eq!(result.details[0].status, DetailStatus::Success);
    assert!(result.details[0].message.contains("10.0.0.1"));

    // Deactivation never drops local knowledge of the record
    let doc = h.document().await.unwrap();
    assert_eq!(doc.records.len(), 1);
    assert_eq!(doc.records[0].alias, "frankfurt-1");
}

#[tokio::test]
async fn create_uses_default_ttl_and_verifies() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());

    let result = h
        .reconciler
        .reconcile(
            "test",
            vec![ActivationRequest::new("us.xmr", addr(2)).with_ttl(0)],
        )
        .await
        .unwrap();

    assert!(result.success);
    let created = h.remote.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "us.xmr.example.com");
    assert_eq!(created[0].ttl, 60);
    assert!(!created[0].proxied);
    assert_eq!(created[0].comment, "us.xmr", "alias defaults to the short name");

    let verifications = h.remote.verifications();
    assert_eq!(verifications.len(), 1);
    assert_eq!(verifications[0].1, addr(2));
    assert_eq!(result.details[0].status, DetailStatus::Success);
}

#[tokio::test]
async fn unverified_create_is_a_warning_not_a_failure() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.set_lagging(true);

    let result = h
        .reconciler
        .reconcile("test", vec![ActivationRequest::new("xmr", addr(1))])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.applied, 1);
    assert_eq!(result.details[0].status, DetailStatus::Warning);
}

#[tokio::test]
async fn per_key_failures_do_not_abort_batch() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.seed("rec-old", "old.example.com", addr(9), "old");
    h.remote.fail_create_for(addr(1));
    h.remote.fail_delete_for("rec-old");

    let result = h
        .reconciler
        .reconcile(
            "test",
            vec![
                ActivationRequest::new("bad", addr(1)),
                ActivationRequest::new("good", addr(2)),
            ],
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.applied, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(result.details.len(), 3);
    assert_eq!(
        result
            .details
            .iter()
            .filter(|d| d.status == DetailStatus::Error)
            .count(),
        2
    );
    // Creates are issued before deletes
    assert_eq!(h.remote.create_call_count(), 2);
    assert_eq!(h.remote.delete_call_count(), 1);
}

#[tokio::test]
async fn listing_failure_aborts_run() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.fail_list(true);

    let result = h
        .reconciler
        .reconcile("test", vec![ActivationRequest::new("xmr", addr(1))])
        .await;

    assert!(matches!(result, Err(Error::RemoteUnavailable(_))));
    assert_eq!(h.remote.mutation_count(), 0);
    assert_eq!(h.store.save_call_count(), 0);
}

#[tokio::test]
async fn noop_run_skips_persist() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.seed("rec-1", "xmr.example.com", addr(1), "");

    h.reconciler
        .reconcile("test", vec![ActivationRequest::new("xmr", addr(1))])
        .await
        .unwrap();

    assert_eq!(h.store.save_call_count(), 0);
    assert!(h.document().await.is_none());
}

#[tokio::test]
async fn activation_is_recorded_in_document() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());

    h.reconciler
        .reconcile(
            "test",
            vec![
                ActivationRequest::new("us.xmr", addr(2))
                    .with_alias("dallas")
                    .with_tag(TagKind::Account, "Pool2")
                    .with_proxied(true),
            ],
        )
        .await
        .unwrap();

    let doc = h.document().await.unwrap();
    assert_eq!(doc.records.len(), 1);
    let record = &doc.records[0];
    assert_eq!(record.name, "us.xmr.example.com");
    assert_eq!(record.alias, "dallas");
    assert_eq!(record.account.as_deref(), Some("Pool2"));
    assert!(record.proxied);
    assert!(record.last_activated_at.is_some());
    assert_eq!(
        record.identity,
        dnsync_core::RecordIdentity::derive("us.xmr.example.com", addr(2))
    );

    // Reactivating after a deactivation keeps the same local entry
    h.reconciler.reconcile("test", Vec::new()).await.unwrap();
    h.reconciler
        .reconcile("test", vec![ActivationRequest::new("us.xmr", addr(2))])
        .await
        .unwrap();
    let doc = h.document().await.unwrap();
    assert_eq!(doc.records.len(), 1);
    assert_eq!(doc.records[0].alias, "dallas");
}

#[tokio::test]
async fn persist_failure_keeps_remote_changes() {
    let dir = tempdir().unwrap();
    let mut h = Harness::new(dir.path());
    h.store.fail_saves(true);

    let result = h
        .reconciler
        .reconcile("test", vec![ActivationRequest::new("xmr", addr(1))])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.applied, 1);
    assert_eq!(h.remote.records().len(), 1, "remote change is not rolled back");
    assert_eq!(h.remote.delete_call_count(), 0);

    let events = h.drain_events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SyncEvent::PersistFailed { .. }))
    );
    assert!(matches!(events.last(), Some(SyncEvent::RunFinished { applied: 1, failed: 0, .. })));
}

#[tokio::test]
async fn events_describe_the_run() {
    let dir = tempdir().unwrap();
    let mut h = Harness::new(dir.path());
    h.remote.seed("rec-1", "old.example.com", addr(1), "old");

    h.reconciler
        .reconcile("test", vec![ActivationRequest::new("new", addr(2))])
        .await
        .unwrap();

    let events = h.drain_events();
    assert!(matches!(events.first(), Some(SyncEvent::RunStarted { requested: 1, .. })));
    assert!(events.iter().any(|e| matches!(e, SyncEvent::RecordCreated { verified: true, .. })));
    assert!(events.iter().any(|e| matches!(e, SyncEvent::RecordDeleted { confirmed: true, .. })));
    assert!(events.iter().any(|e| matches!(e, SyncEvent::DocumentSaved { .. })));
    assert!(events.iter().all(|e| e.environment() == "test"));
}

#[tokio::test]
async fn drifted_properties_are_left_unchanged() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());
    h.remote.seed("rec-1", "xmr.example.com", addr(1), "");

    let result = h
        .reconciler
        .reconcile(
            "test",
            vec![ActivationRequest::new("xmr", addr(1)).with_ttl(300).with_proxied(true)],
        )
        .await
        .unwrap();

    assert_eq!(result.applied, 0);
    assert_eq!(h.remote.mutation_count(), 0);
}

#[tokio::test]
async fn empty_name_is_rejected() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());

    let result = h
        .reconciler
        .reconcile("test", vec![ActivationRequest::new("  ", addr(1))])
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(h.remote.list_call_count(), 0);
}

#[tokio::test]
async fn unknown_environment_is_a_config_error() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());

    let result = h.reconciler.reconcile("production", Vec::new()).await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn concurrent_runs_keep_document_consistent() {
    let dir = tempdir().unwrap();
    let h = Harness::new(dir.path());

    let mut handles = Vec::new();
    for i in 1..=5u8 {
        let reconciler = std::sync::Arc::clone(&h.reconciler);
        handles.push(tokio::spawn(async move {
            reconciler
                .create_single_entry("test", ActivationRequest::new(format!("node{i}"), addr(i)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let doc = h.document().await.unwrap();
    assert_eq!(doc.records.len(), 5, "no write may be lost");
}
