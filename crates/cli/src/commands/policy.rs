use rust_decimal::Decimal;
use serde_json::json;

use signoff_core::domain::member::TenantId;
use signoff_core::domain::policy::ApprovalPolicy;
use signoff_core::PolicyCriteria;

use crate::commands::{
    build_runtime, failure_result, load_config, open_engine, parse_kind, CommandFailure,
    CommandResult,
};

fn policy_json(policy: &ApprovalPolicy) -> serde_json::Value {
    json!({
        "id": policy.id.0,
        "name": policy.name,
        "priority": policy.priority,
        "min_amount": policy.min_amount.map(|v| v.to_string()),
        "max_amount": policy.max_amount.map(|v| v.to_string()),
        "min_days": policy.min_days.map(|v| v.to_string()),
        "max_days": policy.max_days.map(|v| v.to_string()),
        "levels": policy
            .levels
            .iter()
            .map(|level| json!({
                "level_order": level.level_order,
                "required_role": level.required_role.as_str(),
            }))
            .collect::<Vec<_>>(),
    })
}

fn parse_decimal(label: &'static str, value: &str) -> Result<Decimal, CommandFailure> {
    value
        .parse::<Decimal>()
        .map_err(|error| ("invalid_threshold", format!("invalid {label} `{value}`: {error}"), 7))
}

pub fn list(tenant: &str, kind: &str) -> CommandResult {
    let config = match load_config("policies") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("policies") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let tenant = TenantId(tenant.to_string());
    let result = runtime.block_on(async {
        let kind = parse_kind(kind)?;
        let (pool, engine) = open_engine(&config).await?;
        engine
            .ensure_default_policies(&tenant, kind)
            .await
            .map_err(|error| ("workflow", error.to_string(), 6u8))?;

        use signoff_db::repositories::PolicyRepository;
        let policies = signoff_db::repositories::SqlPolicyRepository::new(pool.clone());
        let all = policies
            .list_active(&tenant, kind)
            .await
            .map_err(|error| ("repository", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, CommandFailure>(all)
    });

    match result {
        Ok(all) => {
            let data = all.iter().map(policy_json).collect::<Vec<_>>();
            CommandResult::success_with_data(
                "policies",
                format!("{} active policies", data.len()),
                Some(serde_json::Value::Array(data)),
            )
        }
        Err(failure) => failure_result("policies", failure),
    }
}

pub fn applicable(
    tenant: &str,
    kind: &str,
    days: Option<&str>,
    amount: Option<&str>,
) -> CommandResult {
    let config = match load_config("applicable") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("applicable") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let tenant = TenantId(tenant.to_string());
    let result = runtime.block_on(async {
        let kind = parse_kind(kind)?;
        let criteria = PolicyCriteria {
            days: days.map(|value| parse_decimal("day count", value)).transpose()?,
            amount: amount.map(|value| parse_decimal("amount", value)).transpose()?,
        };

        let (pool, engine) = open_engine(&config).await?;
        let policy = engine
            .find_applicable_policy(&tenant, kind, &criteria)
            .await
            .map_err(|error| ("workflow", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, CommandFailure>(policy)
    });

    match result {
        Ok(Some(policy)) => CommandResult::success_with_data(
            "applicable",
            format!("policy `{}` governs this request", policy.name),
            Some(policy_json(&policy)),
        ),
        Ok(None) => CommandResult::success(
            "applicable",
            "no policy matches; the request proceeds without an approval chain",
        ),
        Err(failure) => failure_result("applicable", failure),
    }
}
