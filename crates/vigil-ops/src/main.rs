use anyhow::{Context, Result};
use chrono::Utc;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vigil_audit::{Actor, Explanation};
use vigil_core::{MemoryStore, RawResult, VigilConfig};
use vigil_ops::{Governance, OpsError};
use vigil_policy::ScopeRef;

/// Exit code when governance refuses an action
const EXIT_BLOCKED: i32 = 2;

fn cli() -> Command {
    let actor = Arg::new("actor")
        .long("actor")
        .default_value("cli")
        .help("Actor uid recorded in the audit log");

    Command::new("vigil")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resilience and adaptive governance core")
        .subcommand_required(true)
        .arg(
            Arg::new("state")
                .long("state")
                .global(true)
                .default_value("vigil-state.json")
                .value_parser(value_parser!(PathBuf))
                .help("JSON snapshot of the document store"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("init")
                .about("Write the built-in governance policy and clear runtime ops")
                .arg(actor.clone()),
        )
        .subcommand(
            Command::new("ingest")
                .about("Store raw QA results from a JSON file (object or array)")
                .arg(Arg::new("file").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(Command::new("aggregate").about("Run the daily aggregation job"))
        .subcommand(Command::new("evaluate").about("Run the policy evaluation job"))
        .subcommand(
            Command::new("policy")
                .about("Policy documents")
                .subcommand_required(true)
                .subcommand(
                    Command::new("get")
                        .about("Print a policy document")
                        .arg(Arg::new("id").help("Policy id (defaults to the configured policy)")),
                )
                .subcommand(
                    Command::new("compile")
                        .about("Compile a YAML policy source and store it")
                        .arg(Arg::new("file").required(true).value_parser(value_parser!(PathBuf)))
                        .arg(actor),
                ),
        )
        .subcommand(Command::new("runtime-ops").about("Print current runtime ops"))
        .subcommand(
            Command::new("audit")
                .about("List audit entries, newest first")
                .arg(Arg::new("limit").long("limit").value_parser(value_parser!(usize)))
                .arg(Arg::new("team").long("team"))
                .arg(Arg::new("action").long("action"))
                .arg(Arg::new("actor").long("actor"))
                .arg(
                    Arg::new("verify")
                        .long("verify")
                        .action(ArgAction::SetTrue)
                        .help("Verify the hash chain instead of listing"),
                ),
        )
        .subcommand(
            Command::new("explain")
                .about("Explain an audited decision")
                .arg(Arg::new("log-id").required(true)),
        )
        .subcommand(
            Command::new("decide")
                .about("Resolve allow/deny for an action in an org/tenant/team scope")
                .arg(Arg::new("org").long("org").required(true))
                .arg(Arg::new("tenant").long("tenant"))
                .arg(Arg::new("team").long("team"))
                .arg(Arg::new("service").long("service").help("Also run the runtime gate for this service"))
                .arg(Arg::new("action").long("action").required(true)),
        )
        .subcommand(
            Command::new("enforce")
                .about("Check a service call against policy scope and runtime ops")
                .arg(Arg::new("service").long("service").required(true))
                .arg(Arg::new("team").long("team"))
                .arg(Arg::new("action").long("action")),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn string<'a>(args: &'a ArgMatches, name: &str) -> Option<&'a str> {
    args.get_one::<String>(name).map(String::as_str)
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    string(args, name).with_context(|| format!("missing --{name}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_results(path: &Path) -> Result<Vec<RawResult>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let results = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(results)
}

/// Print a refusal and map it to the blocked exit code
fn blocked_or_err<T>(result: Result<T, OpsError>) -> Result<Result<T, i32>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(OpsError::Blocked { action, reason }) => {
            print_json(&serde_json::json!({
                "allowed": false,
                "action": action,
                "reason": reason,
            }))?;
            Ok(Err(EXIT_BLOCKED))
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(matches: &ArgMatches, governance: &Governance) -> Result<i32> {
    let now = Utc::now();
    match matches.subcommand() {
        Some(("init", args)) => {
            let policy = governance
                .init_policy(Actor::user(required(args, "actor")?).with_role("admin"), now)
                .await?;
            print_json(&policy)?;
        }
        Some(("ingest", args)) => {
            let path = args.get_one::<PathBuf>("file").context("missing file")?;
            let results = read_results(path)?;
            for result in &results {
                governance.ingest(result).await?;
            }
            println!("Ingested {} results", results.len());
        }
        Some(("aggregate", _)) => match governance.run_aggregation(now).await? {
            Some(metrics) => print_json(&metrics)?,
            None => println!("No QA results to aggregate"),
        },
        Some(("evaluate", _)) => match governance.run_evaluation(now).await? {
            Some(report) => print_json(&serde_json::json!({
                "policyId": report.evaluation.policy_id,
                "metricsDate": report.evaluation.metrics_date,
                "matched": report.evaluation.matched_labels(),
                "runtimeOps": report.evaluation.runtime_ops,
                "alertId": report.alert_id,
                "auditId": report.audit_id,
                "failedEffects": report.failed_effects,
            }))?,
            None => println!("No governance metrics to evaluate"),
        },
        Some(("policy", sub)) => match sub.subcommand() {
            Some(("get", args)) => {
                let id = string(args, "id").unwrap_or(&governance.config().governance.policy_id);
                match governance.queries().get_policy(id).await? {
                    Some(policy) => print_json(&policy)?,
                    None => {
                        println!("Policy {id} not found");
                        return Ok(1);
                    }
                }
            }
            Some(("compile", args)) => {
                let path = args.get_one::<PathBuf>("file").context("missing file")?;
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let actor = Actor::user(required(args, "actor")?).with_role("admin");
                let policy = governance.compile_policy(&source, actor, now).await?;
                print_json(&policy)?;
            }
            _ => anyhow::bail!("unknown policy command"),
        },
        Some(("runtime-ops", _)) => print_json(&governance.queries().get_runtime_ops().await?)?,
        Some(("audit", args)) => {
            let queries = governance.queries();
            if args.get_flag("verify") {
                let count = queries.verify_audit().await?;
                println!("Audit chain intact: {count} entries");
            } else {
                let mut filter = queries.audit_filter();
                if let Some(limit) = args.get_one::<usize>("limit") {
                    filter = filter.with_limit(*limit);
                }
                if let Some(team) = string(args, "team") {
                    filter = filter.with_team(team);
                }
                if let Some(action) = string(args, "action") {
                    filter = filter.with_action(action);
                }
                if let Some(actor) = string(args, "actor") {
                    filter = filter.with_actor(actor);
                }
                let entries = queries.list_audit(&filter).await?;
                print_json(&serde_json::json!({
                    "count": entries.len(),
                    "items": entries,
                }))?;
            }
        }
        Some(("explain", args)) => {
            let explanation = governance.queries().explain(required(args, "log-id")?).await?;
            print_json(&explanation)?;
            if let Explanation::NotFound { .. } = explanation {
                return Ok(1);
            }
        }
        Some(("decide", args)) => {
            let mut scope = ScopeRef::org(required(args, "org")?);
            if let Some(tenant) = string(args, "tenant") {
                scope = scope.tenant(tenant);
            }
            if let Some(team) = string(args, "team") {
                scope = scope.team(team);
            }
            let action = required(args, "action")?;
            let gate = governance.gatekeeper();
            let result = match string(args, "service") {
                Some(service) => gate.authorize(&scope, service, action).await,
                None => gate.decide(&scope, action).await,
            };
            match blocked_or_err(result)? {
                Ok(decision) => {
                    print_json(&decision)?;
                    if !decision.is_allowed() {
                        return Ok(EXIT_BLOCKED);
                    }
                }
                Err(code) => return Ok(code),
            }
        }
        Some(("enforce", args)) => {
            let result = governance
                .gatekeeper()
                .enforce(required(args, "service")?, string(args, "team"), string(args, "action"))
                .await;
            match blocked_or_err(result)? {
                Ok(()) => print_json(&serde_json::json!({ "allowed": true }))?,
                Err(code) => return Ok(code),
            }
        }
        _ => anyhow::bail!("unknown command"),
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => VigilConfig::load(path)?,
        None => VigilConfig::default(),
    };
    let state = matches
        .get_one::<PathBuf>("state")
        .context("missing --state")?
        .clone();

    let store = Arc::new(MemoryStore::open(&state)?);
    let governance = Governance::new(store.clone(), config);

    let code = run(&matches, &governance).await;
    store.persist(&state)?;
    let code = code?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
