use serde_json::json;

use signoff_core::domain::step::ApprovalStep;

use crate::commands::{
    build_runtime, failure_result, load_config, open_engine, request_ref, CommandFailure,
    CommandResult,
};

fn step_json(step: &ApprovalStep) -> serde_json::Value {
    json!({
        "id": step.id.0,
        "level_order": step.level_order,
        "required_role": step.required_role.as_str(),
        "status": step.status.as_str(),
        "approver": step.approver_name,
        "actioned_at": step.actioned_at.map(|value| value.to_rfc3339()),
        "notes": step.notes,
    })
}

pub fn show(kind: &str, id: &str) -> CommandResult {
    let config = match load_config("chain") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("chain") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let request = request_ref(kind, id)?;
        let (pool, engine) = open_engine(&config).await?;
        let chain = engine
            .approval_chain(&request)
            .await
            .map_err(|error| ("workflow", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, CommandFailure>(chain)
    });

    match result {
        Ok(chain) if chain.is_empty() => {
            CommandResult::success("chain", "no approval chain exists for this request")
        }
        Ok(chain) => {
            let data = chain.iter().map(step_json).collect::<Vec<_>>();
            CommandResult::success_with_data(
                "chain",
                format!("{} steps", data.len()),
                Some(serde_json::Value::Array(data)),
            )
        }
        Err(failure) => failure_result("chain", failure),
    }
}

pub fn summary(kind: &str, id: &str) -> CommandResult {
    let config = match load_config("summary") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("summary") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let request = request_ref(kind, id)?;
        let (pool, engine) = open_engine(&config).await?;
        let summary = engine
            .chain_summary(&request)
            .await
            .map_err(|error| ("workflow", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, CommandFailure>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success_with_data(
            "summary",
            format!("chain status: {}", summary.status.as_str()),
            Some(json!({
                "status": summary.status.as_str(),
                "total_steps": summary.total_steps,
                "completed_steps": summary.completed_steps,
                "current_step": summary.current_step,
            })),
        ),
        Err(failure) => failure_result("summary", failure),
    }
}
