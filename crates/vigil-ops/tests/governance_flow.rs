use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use vigil_audit::{Actor, AuditFilter, Explanation, Outcome};
use vigil_core::{
    collections, DailyMetrics, DocumentStore, LimiterConfig, MemoryStore, Severity, StoreExt,
    VigilConfig,
};
use vigil_ops::prelude::*;
use vigil_ops::{COMPILE_ACTION, EVALUATE_ACTION, INIT_ACTION, NOTIFIER_DEPENDENCY};
use vigil_policy::{AlertRecord, RuntimeOps};
use vigil_test_utils::{
    fixed_now, raw_result, FlakyStore, RecordingNotifier, RecordingScheduler,
};

const GUARD_POLICY: &str = r#"
id: default-governance
rules:
  - { metric: passRate, operator: "<", value: 0.9, action: alert }
  - { metric: regressionCount, operator: ">", value: 3, action: block_risky_ops }
actions:
  alert: { notifySlack: true }
  block_risky_ops: { disableIntent: [deploy_model] }
scope:
  services: [copilot]
  teams: [payments]
"#;

async fn ingest_failing_runs(governance: &Governance) {
    for minutes_ago in [30, 20, 10] {
        governance
            .ingest(&raw_result(minutes_ago, 5, 5, 300.0))
            .await
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn collapse_blocks_everything_and_is_audited() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let scheduler = RecordingScheduler::new();
    let governance = Governance::new(store.clone(), VigilConfig::default())
        .with_notifier(notifier.clone())
        .with_scheduler(scheduler.clone());

    governance.init_policy(Actor::user("ops"), fixed_now()).await.unwrap();
    ingest_failing_runs(&governance).await;

    let metrics = governance.run_aggregation(fixed_now()).await.unwrap().unwrap();
    assert_eq!(metrics.pass_rate, 0.5);
    assert_eq!(metrics.test_count, 30);

    let report = governance.run_evaluation(fixed_now()).await.unwrap().unwrap();
    assert_eq!(report.failed_effects, 0);
    assert!(report.evaluation.runtime_ops.blocks_everything());

    let ops = governance.queries().get_runtime_ops().await.unwrap();
    assert!(ops.is_disabled("deploy_model"));
    assert!(ops.reason.unwrap().starts_with("Governance policy default-governance"));

    let alert: AlertRecord = store
        .load(collections::ALERTS, &report.alert_id.unwrap().to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.rules_triggered.len(), 3);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.starts_with("Governance Alert\nDate: 2026-05-15"));
    assert!(scheduler.jobs().is_empty());

    let err = governance
        .gatekeeper()
        .enforce("copilot", None, Some("deploy_model"))
        .await
        .unwrap_err();
    assert!(err.is_blocked());

    let queries = governance.queries();
    let evaluations = queries
        .list_audit(&AuditFilter::default().with_action(EVALUATE_ACTION))
        .await
        .unwrap();
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].id, report.audit_id);

    let Explanation::Found(explained) = queries.explain(&report.audit_id.to_string()).await.unwrap() else {
        panic!("evaluation entry should explain");
    };
    assert_eq!(explained.policy.as_ref().unwrap()["policyId"], "default-governance");
    assert!(explained.why[0].starts_with("Policy match: passRate < 0.9 → alert"));

    let inits = queries
        .list_audit(&AuditFilter::default().with_action(INIT_ACTION))
        .await
        .unwrap();
    assert_eq!(inits[0].actor.uid, "ops");
    assert_eq!(queries.verify_audit().await.unwrap(), 3);
}

#[tokio::test]
async fn aggregation_rerun_is_idempotent_and_keeps_foreign_fields() {
    let store = Arc::new(MemoryStore::new());
    let governance = Governance::new(store.clone(), VigilConfig::default());
    ingest_failing_runs(&governance).await;

    let first = governance.run_aggregation(fixed_now()).await.unwrap().unwrap();
    let mut doc = store
        .get(collections::GOVERNANCE, &first.key())
        .await
        .unwrap()
        .unwrap();
    doc["slaBreaches"] = json!(2);
    store.put(collections::GOVERNANCE, &first.key(), doc).await.unwrap();

    let second = governance.run_aggregation(fixed_now()).await.unwrap().unwrap();
    let third = governance.run_aggregation(fixed_now()).await.unwrap().unwrap();

    assert_eq!(second, third);
    assert_eq!(second.pass_rate, first.pass_rate);
    assert_eq!(second.extra["slaBreaches"], json!(2));
    assert_eq!(store.len(collections::GOVERNANCE), 1);
}

#[tokio::test]
async fn aggregation_rerun_later_in_the_day_is_equal() {
    let store = Arc::new(MemoryStore::new());
    let governance = Governance::new(store.clone(), VigilConfig::default());
    ingest_failing_runs(&governance).await;

    let later = fixed_now() + chrono::Duration::minutes(10);
    let first = governance.run_aggregation(fixed_now()).await.unwrap().unwrap();
    let second = governance.run_aggregation(later).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(second.last_updated, later);
    let stored: DailyMetrics = store
        .load(collections::GOVERNANCE, &first.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_updated, later);
    assert_eq!(store.len(collections::GOVERNANCE), 1);
}

#[tokio::test]
async fn nothing_to_do_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let governance = Governance::new(store.clone(), VigilConfig::default());

    assert!(governance.run_aggregation(fixed_now()).await.unwrap().is_none());
    assert!(governance.run_evaluation(fixed_now()).await.unwrap().is_none());
    assert!(store.is_empty(collections::GOVERNANCE));
    assert!(store.is_empty(collections::RUNTIME_OPS));
    assert_eq!(
        governance.queries().get_runtime_ops().await.unwrap(),
        RuntimeOps::default()
    );
    assert!(governance.queries().get_policy("nope").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn notification_retried_then_given_up() {
    let store = Arc::new(MemoryStore::new());
    let flaky = RecordingNotifier::failing(2);
    let governance = Governance::new(store.clone(), VigilConfig::default()).with_notifier(flaky.clone());
    ingest_failing_runs(&governance).await;
    governance.run_aggregation(fixed_now()).await.unwrap();

    let report = governance.run_evaluation(fixed_now()).await.unwrap().unwrap();
    assert_eq!(report.failed_effects, 0);
    assert_eq!(flaky.sent().len(), 1);

    let down = RecordingNotifier::failing(10);
    let governance = Governance::new(store, VigilConfig::default()).with_notifier(down.clone());
    let report = governance.run_evaluation(fixed_now()).await.unwrap().unwrap();
    assert_eq!(report.failed_effects, 1);
    assert!(down.sent().is_empty());
    assert_eq!(governance.breakers().get(NOTIFIER_DEPENDENCY).stats().failure_count, 3);
}

#[tokio::test(start_paused = true)]
async fn backup_channel_takes_over_when_primary_is_down() {
    let store = Arc::new(MemoryStore::new());
    let primary = RecordingNotifier::failing(10);
    let backup = RecordingNotifier::new();
    let governance = Governance::new(store, VigilConfig::default())
        .with_notifier(primary.clone())
        .with_backup_notifier("email", backup.clone());
    ingest_failing_runs(&governance).await;
    governance.run_aggregation(fixed_now()).await.unwrap();

    let report = governance.run_evaluation(fixed_now()).await.unwrap().unwrap();
    assert_eq!(report.failed_effects, 0);
    assert!(primary.sent().is_empty());
    assert_eq!(backup.sent().len(), 1);
    assert!(backup.sent()[0].text.starts_with("Governance Alert"));

    let breakers = governance.breakers();
    assert_eq!(breakers.get(NOTIFIER_DEPENDENCY).stats().failure_count, 3);
    assert_eq!(breakers.get("email").stats().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn notifications_wait_for_the_rate_limit() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let mut config = VigilConfig::default();
    config.limiter = LimiterConfig {
        max_calls: 1,
        window_ms: 1_000,
    };
    let governance = Governance::new(store, config).with_notifier(notifier.clone());
    ingest_failing_runs(&governance).await;
    governance.run_aggregation(fixed_now()).await.unwrap();

    let started = tokio::time::Instant::now();
    governance.run_evaluation(fixed_now()).await.unwrap().unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(1));

    let report = governance.run_evaluation(fixed_now()).await.unwrap().unwrap();
    assert_eq!(report.failed_effects, 0);
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert_eq!(notifier.sent().len(), 2);
}

#[tokio::test]
async fn failed_write_keeps_previous_document() {
    let store = FlakyStore::new();
    let governance = Governance::new(store.clone(), VigilConfig::default());
    ingest_failing_runs(&governance).await;
    let before = governance.run_aggregation(fixed_now()).await.unwrap().unwrap();

    governance.ingest(&raw_result(1, 10, 0, 100.0)).await.unwrap();
    store.fail_writes(true);
    let err = governance.run_aggregation(fixed_now()).await.unwrap_err();
    assert!(err.is_retryable());

    let stored: DailyMetrics = store
        .load(collections::GOVERNANCE, &before.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, before);

    store.fail_writes(false);
    let after = governance.run_aggregation(fixed_now()).await.unwrap().unwrap();
    assert!(after.pass_rate > before.pass_rate);
}

#[tokio::test]
async fn compile_is_audited_either_way() {
    let store = Arc::new(MemoryStore::new());
    let governance = Governance::new(store, VigilConfig::default());
    let admin = Actor::user("alice").with_role("admin");

    let policy = governance
        .compile_policy(GUARD_POLICY, admin.clone(), fixed_now())
        .await
        .unwrap();
    assert_eq!(policy.compiled_by.as_deref(), Some("alice"));
    assert_eq!(policy.scope.services, vec!["copilot".to_string()]);

    let err = governance
        .compile_policy("rules: []", admin, fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Policy(_)));

    let entries = governance
        .queries()
        .list_audit(&AuditFilter::default().with_action(COMPILE_ACTION).with_actor("alice"))
        .await
        .unwrap();
    let outcomes: Vec<_> = entries.iter().map(|e| e.outcome).collect();
    assert_eq!(outcomes, vec![Outcome::Failed, Outcome::Applied]);
}

#[tokio::test]
async fn snapshot_round_trip_keeps_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let store = Arc::new(MemoryStore::open(&path).unwrap());
    let governance = Governance::new(store.clone(), VigilConfig::default());
    governance.init_policy(Actor::user("ops"), fixed_now()).await.unwrap();
    store.persist(&path).unwrap();

    let reopened = Arc::new(MemoryStore::open(&path).unwrap());
    let governance = Governance::new(reopened, VigilConfig::default());
    governance
        .compile_policy(GUARD_POLICY, Actor::user("alice"), fixed_now())
        .await
        .unwrap();
    assert_eq!(governance.queries().verify_audit().await.unwrap(), 2);
}
