//! Testing utilities for the Vigil workspace
//!
//! Shared fixtures, recording collaborators and a store with switchable failures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use vigil_core::{
    collections, BoxError, DailyMetrics, DocumentStore, FollowUpScheduler, MemoryStore,
    Notification, Notifier, RawResult, StoreError, StoreExt, StoreResult,
};
use vigil_policy::Policy;

/// Fixed "now" used across tests: 2026-05-15 00:05 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 15, 0, 5, 0).unwrap()
}

pub fn raw_result(minutes_ago: i64, passed: u64, failed: u64, latency: f64) -> RawResult {
    RawResult::new(fixed_now() - Duration::minutes(minutes_ago), passed, failed).with_latency(latency)
}

pub fn daily_metrics(pass_rate: f64, regression_count: u64, avg_latency: f64) -> DailyMetrics {
    DailyMetrics {
        date: NaiveDate::from_ymd_opt(2026, 5, 14).unwrap(),
        pass_rate,
        avg_latency,
        p95_latency: None,
        error_rate: 1.0 - pass_rate,
        regression_count,
        top_fail_cases: Vec::new(),
        reliability_score: pass_rate,
        test_count: 100,
        tests_passed: 0,
        tests_failed: 0,
        regressions: Vec::new(),
        last_updated: fixed_now(),
        extra: BTreeMap::new(),
    }
}

/// Org `acme` (policy denies `delete_data`), tenant `acme-eu` (allows
/// `deploy_model`, `delete_data`), team `payments` under `acme-eu`.
pub async fn seed_org_tree(store: &MemoryStore) {
    let docs: [(&str, &str, Value); 3] = [
        (collections::ORGS, "acme", json!({"name": "Acme", "policyRef": "acme-org"})),
        (
            collections::TENANTS,
            "acme-eu",
            json!({"orgId": "acme", "policyRef": "acme-eu"}),
        ),
        (
            collections::TEAMS,
            "payments",
            json!({"orgId": "acme", "tenantId": "acme-eu"}),
        ),
    ];
    for (collection, key, doc) in docs {
        store.put(collection, key, doc).await.unwrap();
    }
    store
        .save(
            collections::POLICIES,
            "acme-org",
            &Policy::new("acme-org").denying(["delete_data"]),
        )
        .await
        .unwrap();
    store
        .save(
            collections::POLICIES,
            "acme-eu",
            &Policy::new("acme-eu").allowing(["deploy_model", "delete_data"]),
        )
        .await
        .unwrap();
}

/// Notifier that keeps every payload; can be told to fail the next N calls
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failures: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(times: usize) -> Arc<Self> {
        let notifier = Self::default();
        notifier.failures.store(times, Ordering::SeqCst);
        Arc::new(notifier)
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), BoxError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err("webhook unavailable".into());
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingScheduler {
    jobs: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn jobs(&self) -> Vec<String> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl FollowUpScheduler for RecordingScheduler {
    async fn schedule(&self, job: &str) -> Result<(), BoxError> {
        self.jobs.lock().push(job.to_string());
        Ok(())
    }
}

/// Memory store whose writes can be switched off
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Value>> {
        self.inner.get(collection, key).await
    }

    async fn put(&self, collection: &str, key: &str, doc: Value) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("write to {collection}/{key} rejected")));
        }
        self.inner.put(collection, key, doc).await
    }

    async fn recent(&self, collection: &str, limit: usize) -> StoreResult<Vec<(String, Value)>> {
        self.inner.recent(collection, limit).await
    }

    async fn recent_before(
        &self,
        collection: &str,
        before: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<(String, Value)>> {
        self.inner.recent_before(collection, before, limit).await
    }
}
