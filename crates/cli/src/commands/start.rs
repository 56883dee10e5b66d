use crate::commands::{prepare, CommandResult};
use hostline_db::{connect_with_config, migrations};

/// Preflight for `hostline-server`: config, database and schema must all be usable.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("start") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "start",
            format!(
                "preflight passed; hostline-server will listen on {}:{} (llm: {}, environment: {})",
                config.server.bind_address,
                config.server.port,
                config.llm.resolved_provider().as_str(),
                config.app.environment.as_str()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
