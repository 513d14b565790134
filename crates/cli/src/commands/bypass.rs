use serde_json::json;

use signoff_core::domain::member::MemberId;

use crate::commands::{
    build_runtime, failure_result, load_config, open_engine, request_ref, CommandFailure,
    CommandResult,
};

pub fn run(kind: &str, id: &str, admin: &str, note: Option<String>) -> CommandResult {
    let config = match load_config("bypass") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("bypass") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let admin = MemberId(admin.to_string());
    let result = runtime.block_on(async {
        let request = request_ref(kind, id)?;
        let (pool, engine) = open_engine(&config).await?;

        // The engine performs no authorization on this path; the operator
        // invoking it is trusted the same way the HTTP callers are required
        // to gate on admin before calling.
        let outcome = engine
            .admin_bypass(&request, &admin, note)
            .await
            .map_err(|error| ("workflow", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, CommandFailure>(outcome)
    });

    match result {
        Ok(outcome) => CommandResult::success_with_data(
            "bypass",
            format!("{} steps force-approved", outcome.steps_approved),
            Some(json!({
                "steps_approved": outcome.steps_approved,
                "summary_status": outcome.summary.status.as_str(),
            })),
        ),
        Err(failure) => failure_result("bypass", failure),
    }
}
