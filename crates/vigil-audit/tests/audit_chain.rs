use rejecting::RejectingStore;
use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use vigil_audit::prelude::*;
use vigil_audit::{AuditEntry, GENESIS_HASH};
use vigil_core::{collections, DocumentStore, MemoryStore, StoreExt};

fn base() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 15, 9, 0, 0).unwrap()
}

fn gate(team: &str, action: &str, outcome: Outcome) -> AuditEvent {
    AuditEvent::new(Actor::system(), action, outcome)
        .with_subject(Subject::service("copilot", Some(team.to_string())))
}

async fn populated() -> (Arc<MemoryStore>, AuditLog) {
    let store = Arc::new(MemoryStore::new());
    let log = AuditLog::new(store.clone());
    let events = [
        gate("payments", "deploy_model", Outcome::Blocked),
        gate("search", "deploy_model", Outcome::Allowed),
        gate("payments", "export", Outcome::Allowed),
        AuditEvent::new(Actor::user("alice").with_role("admin"), "policy_compile", Outcome::Applied)
            .with_subject(Subject::policy("default-governance")),
    ];
    for (i, event) in events.into_iter().enumerate() {
        log.append_at(event, base() + Duration::seconds(i as i64))
            .await
            .unwrap();
    }
    (store, log)
}

#[tokio::test]
async fn entries_chain_from_genesis() {
    let (_store, log) = populated().await;

    let all = log.list(&AuditFilter::default()).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[3].prev_hash, GENESIS_HASH);
    for pair in all.windows(2) {
        assert_eq!(pair[0].prev_hash, pair[1].hash);
    }
    assert_eq!(log.verify_integrity().await.unwrap(), 4);
}

#[tokio::test]
async fn list_filters_newest_first() {
    let (_store, log) = populated().await;

    let payments = log
        .list(&AuditFilter::default().with_team("payments"))
        .await
        .unwrap();
    let actions: Vec<_> = payments.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["export", "deploy_model"]);

    let deploys = log
        .list(&AuditFilter::default().with_action("deploy_model").with_limit(1))
        .await
        .unwrap();
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].outcome, Outcome::Allowed);

    let by_alice = log
        .list(&AuditFilter::default().with_actor("alice"))
        .await
        .unwrap();
    assert_eq!(by_alice.len(), 1);
    assert_eq!(by_alice[0].actor.role.as_deref(), Some("admin"));
}

#[tokio::test]
async fn filtered_list_stops_reading_once_enough_match() {
    let (store, log) = populated().await;
    // sorts below every issued id, so only a full scan would decode it
    store
        .put(collections::AUDIT_LOGS, "0", json!({"not": "an entry"}))
        .await
        .unwrap();

    let exports = log
        .list(&AuditFilter::default().with_action("export").with_limit(1))
        .await
        .unwrap();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].subject.team_id.as_deref(), Some("payments"));

    let deploys = log
        .list(&AuditFilter::default().with_action("deploy_model").with_limit(2))
        .await
        .unwrap();
    let teams: Vec<_> = deploys.iter().map(|e| e.subject.team_id.as_deref()).collect();
    assert_eq!(teams, vec![Some("search"), Some("payments")]);

    // too few matches: the scan reaches the undecodable document
    assert!(log
        .list(&AuditFilter::default().with_actor("nobody"))
        .await
        .is_err());
}

#[tokio::test]
async fn tampering_is_detected() {
    let (store, log) = populated().await;
    let mut victim = log
        .list(&AuditFilter::default().with_action("export"))
        .await
        .unwrap()
        .remove(0);
    victim.outcome = Outcome::Blocked;
    store
        .save(collections::AUDIT_LOGS, &victim.id.to_string(), &victim)
        .await
        .unwrap();

    let err = log.verify_integrity().await.unwrap_err();
    assert!(matches!(err, AuditError::IntegrityViolation { ref id, .. } if *id == victim.id.to_string()));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn reopened_log_continues_chain() {
    let (store, log) = populated().await;
    let head = log.list(&AuditFilter::default().with_limit(1)).await.unwrap().remove(0);
    drop(log);

    let reopened = AuditLog::new(store);
    let next = reopened
        .append_at(gate("payments", "export", Outcome::Allowed), base())
        .await
        .unwrap();

    assert_eq!(next.prev_hash, head.hash);
    assert!(next.id > head.id);
    assert_eq!(reopened.verify_integrity().await.unwrap(), 5);
}

#[tokio::test]
async fn explain_joins_are_best_effort() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(collections::MODEL_CARDS, "2.1", json!({"version": "2.1", "owner": "ml"}))
        .await
        .unwrap();
    let log = AuditLog::new(store.clone());

    let with_card = log
        .append(
            AuditEvent::new(Actor::system(), "retuning", Outcome::Blocked)
                .with_model("copilot", Some("2.1".into()))
                .with_policy_ref("missing-policy")
                .with_matched_rules(["runtimeOps.disabled"]),
        )
        .await
        .unwrap();

    let explanation = log.explain(&with_card.id.to_string()).await.unwrap();
    let report = explanation.report().unwrap();
    assert_eq!(report.model_card.as_ref().unwrap()["owner"], "ml");
    assert_eq!(report.policy, None);
    assert_eq!(
        report.why,
        vec![
            "Policy match: runtimeOps.disabled".to_string(),
            "Model: copilot (v2.1)".to_string(),
            "Action: retuning".to_string(),
        ]
    );
    assert_eq!(report.integrity.hash, with_card.hash);
}

#[tokio::test]
async fn explain_unknown_id_is_not_found() {
    let log = AuditLog::new(Arc::new(MemoryStore::new()));
    let explanation = log.explain("01J0000000000000000000000").await.unwrap();

    assert_eq!(
        explanation,
        Explanation::NotFound {
            log_id: "01J0000000000000000000000".to_string()
        }
    );
    let value = serde_json::to_value(&explanation).unwrap();
    assert_eq!(value["status"], "not_found");
}

#[tokio::test]
async fn failed_write_does_not_advance_head() {
    let store = Arc::new(RejectingStore::new());
    let log = AuditLog::new(store.clone());

    store.reject(true);
    let err = log
        .append(gate("payments", "export", Outcome::Allowed))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    store.reject(false);
    let entry: AuditEntry = log
        .append(gate("payments", "export", Outcome::Allowed))
        .await
        .unwrap();
    assert_eq!(entry.prev_hash, GENESIS_HASH);
    assert_eq!(store.inner.recent(collections::AUDIT_LOGS, 10).await.unwrap().len(), 1);
}

mod rejecting {
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use vigil_core::{DocumentStore, MemoryStore, StoreError, StoreResult};

    /// Memory store whose writes can be switched off
    pub struct RejectingStore {
        pub inner: MemoryStore,
        reject: AtomicBool,
    }

    impl RejectingStore {
        pub fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                reject: AtomicBool::new(false),
            }
        }

        pub fn reject(&self, on: bool) {
            self.reject.store(on, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DocumentStore for RejectingStore {
        async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Value>> {
            self.inner.get(collection, key).await
        }

        async fn put(&self, collection: &str, key: &str, doc: Value) -> StoreResult<()> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("writes rejected".into()));
            }
            self.inner.put(collection, key, doc).await
        }

        async fn recent(&self, collection: &str, limit: usize) -> StoreResult<Vec<(String, Value)>> {
            self.inner.recent(collection, limit).await
        }
    }
}
