//! Policy-as-code compiler
//!
//! Turns a YAML policy source into a stored [`Policy`]. The source must be
//! a mapping with a non-empty `id`; every other key follows the stored
//! document layout (`rules`, `actions`, `allow`, `deny`, `scope`, ...).
//!
//! ```yaml
//! id: copilot-guard
//! version: 2
//! rules:
//!   - { metric: passRate, operator: "<", value: 0.8, action: alert }
//! deny: [bulk_delete]
//! ```

use crate::error::{PolicyError, PolicyResult};
use crate::policy::Policy;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Key holding the original source text in the compiled document
pub const SOURCE_KEY: &str = "yamlSource";

/// Compile YAML source into a policy stamped with who compiled it and when
///
/// # Errors
/// - `PolicyError::Yaml` on malformed YAML
/// - `PolicyError::Compile` if the source is not a mapping, lacks `id`,
///   has an invalid field or a non-finite threshold
pub fn compile_policy(source: &str, compiled_by: &str, now: DateTime<Utc>) -> PolicyResult<Policy> {
    let doc: Value = serde_yaml::from_str(source)?;
    let Value::Object(mut fields) = doc else {
        return Err(PolicyError::compile("policy source must be a mapping"));
    };

    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        _ => return Err(PolicyError::compile("policy must have an 'id' field")),
    };
    fields.insert("policyId".to_string(), Value::String(id));
    fields.remove(SOURCE_KEY);

    let mut policy: Policy = serde_json::from_value(Value::Object(fields))
        .map_err(|e| PolicyError::compile(e.to_string()))?;

    if let Some(rule) = policy.rules.iter().find(|r| !r.threshold.is_finite()) {
        return Err(PolicyError::compile(format!(
            "rule on {} has a non-finite threshold",
            rule.metric
        )));
    }

    policy.compiled_at = Some(now);
    policy.compiled_by = Some(compiled_by.to_string());
    policy
        .attributes
        .insert(SOURCE_KEY.to_string(), Value::String(source.to_string()));
    Ok(policy)
}
