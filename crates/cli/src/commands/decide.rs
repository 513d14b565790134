use serde_json::json;

use signoff_core::domain::member::MemberId;
use signoff_core::domain::step::ApprovalDecision;
use signoff_engine::ProcessOutcome;

use crate::commands::{
    build_runtime, failure_result, load_config, open_engine, request_ref, CommandFailure,
    CommandResult,
};

pub fn run(
    kind: &str,
    id: &str,
    approver: &str,
    requester: &str,
    reject: bool,
    notes: Option<String>,
) -> CommandResult {
    let command = if reject { "reject" } else { "approve" };

    let config = match load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let decision = if reject { ApprovalDecision::Reject } else { ApprovalDecision::Approve };
    let approver = MemberId(approver.to_string());
    let requester = MemberId(requester.to_string());

    let result = runtime.block_on(async {
        let request = request_ref(kind, id)?;
        let (pool, engine) = open_engine(&config).await?;
        let outcome = engine
            .process_request_approval(&request, &approver, &requester, decision, notes)
            .await
            .map_err(|error| ("workflow", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, CommandFailure>(outcome)
    });

    match result {
        Ok(ProcessOutcome::Denied { decision }) => CommandResult::success_with_data(
            command,
            format!("not authorized: {}", decision.reason),
            Some(json!({ "allowed": false, "reason": decision.reason })),
        ),
        Ok(ProcessOutcome::Processed(processed)) => CommandResult::success_with_data(
            command,
            format!(
                "step {} resolved; chain {}",
                processed.step.level_order,
                if processed.chain_complete { "complete" } else { "still pending" }
            ),
            Some(json!({
                "step_id": processed.step.id.0,
                "level_order": processed.step.level_order,
                "status": processed.step.status.as_str(),
                "chain_complete": processed.chain_complete,
                "summary_status": processed.summary.status.as_str(),
                "current_step": processed.summary.current_step,
            })),
        ),
        Err(failure) => failure_result(command, failure),
    }
}
