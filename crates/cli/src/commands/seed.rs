use signoff_db::{migrations, SeedDataset};

use crate::commands::{build_runtime, connect, failure_result, load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let seeded = SeedDataset::apply(&pool)
            .await
            .map_err(|error| ("seed", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, crate::commands::CommandFailure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "seeded tenant `{}` with {} members and {} policies",
                seeded.tenant.0, seeded.members_seeded, seeded.policies_seeded
            ),
        ),
        Err(failure) => failure_result("seed", failure),
    }
}
