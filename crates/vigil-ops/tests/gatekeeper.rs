use pretty_assertions::assert_eq;
use std::sync::Arc;
use vigil_audit::{Actor, AuditFilter, Outcome};
use vigil_core::{collections, MemoryStore, StoreExt, VigilConfig};
use vigil_ops::prelude::*;
use vigil_policy::{DecisionBasis, Policy, PolicyError, RuntimeOps, ScopeLevel, ScopeRef, Verdict};
use vigil_test_utils::{fixed_now, seed_org_tree};

async fn governed(store: &Arc<MemoryStore>, disabled: &[&str]) -> Governance {
    let mut policy = Policy::new("default-governance");
    policy.scope.services = vec!["copilot".to_string()];
    policy.scope.teams = vec!["payments".to_string()];
    store
        .save(collections::POLICIES, "default-governance", &policy)
        .await
        .unwrap();

    let mut ops = RuntimeOps::cleared(fixed_now());
    ops.disabled = disabled.iter().map(|s| (*s).to_string()).collect();
    store.save(collections::RUNTIME_OPS, "global", &ops).await.unwrap();

    Governance::new(store.clone(), VigilConfig::default())
}

#[tokio::test]
async fn runtime_ops_block_named_action() {
    let store = Arc::new(MemoryStore::new());
    let governance = governed(&store, &["deploy_model"]).await;
    let gate = governance.gatekeeper();

    let err = gate
        .enforce("copilot", Some("payments"), Some("deploy_model"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "blocked_by_policy: deploy_model (action_blocked:deploy_model)");

    gate.enforce("copilot", Some("payments"), Some("summarize")).await.unwrap();
    gate.enforce("copilot", Some("payments"), None).await.unwrap();

    let entries = governance
        .queries()
        .list_audit(&AuditFilter::default().with_team("payments"))
        .await
        .unwrap();
    let seen: Vec<_> = entries.iter().map(|e| (e.action.as_str(), e.outcome)).collect();
    assert_eq!(
        seen,
        vec![
            ("invoke", Outcome::Allowed),
            ("summarize", Outcome::Allowed),
            ("deploy_model", Outcome::Blocked),
        ]
    );
    assert_eq!(entries[2].matched_rules, vec!["runtimeOps.disabled".to_string()]);
    assert_eq!(entries[2].policy_ref.as_deref(), Some("default-governance"));
}

#[tokio::test]
async fn scope_decides_what_is_governed() {
    let store = Arc::new(MemoryStore::new());
    let governance = governed(&store, &["*"]).await;
    let gate = governance.gatekeeper();

    // outside the service scope: not governed, even with everything disabled
    gate.enforce("search", Some("payments"), Some("deploy_model")).await.unwrap();

    let err = gate
        .enforce("copilot", Some("growth"), Some("summarize"))
        .await
        .unwrap_err();
    match err {
        OpsError::Blocked { reason, .. } => assert_eq!(reason, "team_not_in_scope:growth"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(governance.queries().verify_audit().await.unwrap(), 2);
}

#[tokio::test]
async fn missing_policy_allows() {
    let store = Arc::new(MemoryStore::new());
    let governance = Governance::new(store, VigilConfig::default());

    governance
        .gatekeeper()
        .enforce("copilot", Some("payments"), Some("deploy_model"))
        .await
        .unwrap();

    let entries = governance.queries().list_audit(&AuditFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].matched_rules, vec!["policy.missing".to_string()]);
}

#[tokio::test]
async fn org_deny_survives_tenant_allow() {
    let store = Arc::new(MemoryStore::new());
    seed_org_tree(&store).await;
    let governance = Governance::new(store.clone(), VigilConfig::default());
    let gate = governance.gatekeeper();
    let scope = ScopeRef::org("acme").tenant("acme-eu").team("payments");

    let decision = gate.decide(&scope, "delete_data").await.unwrap();
    assert_eq!(decision.verdict, Verdict::Deny);
    assert_eq!(decision.basis, DecisionBasis::Denied { level: ScopeLevel::Org });

    let decision = gate.decide(&scope, "deploy_model").await.unwrap();
    assert!(decision.is_allowed());
    assert_eq!(decision.rule_label(), "allow@tenant");

    let decision = gate.decide(&scope, "rotate_keys").await.unwrap();
    assert_eq!(decision.basis, DecisionBasis::Default);
    assert!(!decision.is_allowed());

    // no governance policy stored, so only the decision gates
    let err = gate.authorize(&scope, "copilot", "delete_data").await.unwrap_err();
    assert!(err.is_blocked());
    gate.authorize(&scope, "copilot", "deploy_model").await.unwrap();

    let entries = governance
        .queries()
        .list_audit(&AuditFilter::default().with_action("delete_data"))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.outcome == Outcome::Blocked));
    assert_eq!(entries[0].subject.service.as_deref(), Some("copilot"));
    assert_eq!(
        entries[0].matched_rules,
        vec!["policy.missing".to_string(), "deny@org".to_string()]
    );
}

#[tokio::test]
async fn runtime_block_precedes_decision() {
    let store = Arc::new(MemoryStore::new());
    seed_org_tree(&store).await;
    let governance = governed(&store, &["deploy_model"]).await;
    let scope = ScopeRef::org("acme").tenant("acme-eu").team("payments");

    let err = governance
        .gatekeeper()
        .authorize(&scope, "copilot", "deploy_model")
        .await
        .unwrap_err();
    match err {
        OpsError::Blocked { reason, .. } => assert_eq!(reason, "action_blocked:deploy_model"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unknown_org_is_a_reference_error() {
    let store = Arc::new(MemoryStore::new());
    seed_org_tree(&store).await;
    let governance = Governance::new(store, VigilConfig::default());

    let err = governance
        .gatekeeper()
        .decide(&ScopeRef::org("globex"), "deploy_model")
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Policy(PolicyError::OrgNotFound { .. })));
    assert!(!err.is_retryable());
    assert!(governance.queries().list_audit(&AuditFilter::default()).await.unwrap().is_empty());
}

const OPEN_POLICY: &str = r#"
id: default-governance
rules:
  - { metric: passRate, operator: "<", value: 0.9, action: alert }
actions:
  alert: { notifySlack: true }
scope:
  services: [copilot]
  teams: [payments, growth]
"#;

#[tokio::test]
async fn policy_is_cached_until_rewritten_through_governance() {
    let store = Arc::new(MemoryStore::new());
    let governance = governed(&store, &[]).await;
    let gate = governance.gatekeeper();

    let err = gate.enforce("copilot", Some("growth"), None).await.unwrap_err();
    assert!(err.is_blocked());

    // a direct store write is not seen while the cached copy is live
    let mut widened = Policy::new("default-governance");
    widened.scope.services = vec!["copilot".to_string()];
    widened.scope.teams = vec!["payments".to_string(), "growth".to_string()];
    store
        .save(collections::POLICIES, "default-governance", &widened)
        .await
        .unwrap();
    assert!(gate.enforce("copilot", Some("growth"), None).await.is_err());

    governance
        .compile_policy(OPEN_POLICY, Actor::user("alice"), fixed_now())
        .await
        .unwrap();
    gate.enforce("copilot", Some("growth"), None).await.unwrap();
    governance
        .gatekeeper()
        .enforce("copilot", Some("growth"), None)
        .await
        .unwrap();
}
