use std::time::Instant;

use crate::commands::CommandResult;
use hostline_agent::{AgentRuntime, CallSession};
use hostline_core::config::{AppConfig, LlmProvider, LoadOptions};
use hostline_core::domain::call::CallSid;
use hostline_db::{connect_with_settings, migrations, DbPool, RestaurantSeedDataset};
use serde::Serialize;
use tokio::runtime::Runtime;

const SMOKE_CALL_SID: &str = "CA-smoke";
const SMOKE_TURNS: &[(&str, &str)] =
    &[("menu_turn", "What's on the menu?"), ("reservation_turn", "book a table for 4 people")];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Runs a scripted call through the mock LLM against a seeded in-memory database.
pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();
    let downstream = ["database_setup", "agent_runtime", "menu_turn", "reservation_turn"];

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(pass("config_validation", elapsed_ms, "configuration loaded and validated"));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("config_validation", elapsed_ms, error.to_string()));
            checks.extend(downstream.iter().copied().map(skipped));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(fail("database_setup", 0, format!("failed to initialize async runtime: {error}")));
            checks.extend(downstream[1..].iter().copied().map(skipped));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let db_started = Instant::now();
    let pool = match runtime.block_on(seeded_memory_pool()) {
        Ok(pool) => {
            checks.push(pass(
                "database_setup",
                elapsed_since(db_started),
                "in-memory database migrated and seeded",
            ));
            pool
        }
        Err(message) => {
            checks.push(fail("database_setup", elapsed_since(db_started), message));
            checks.extend(downstream[1..].iter().copied().map(skipped));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let agent_started = Instant::now();
    let agent = match smoke_agent(&config, pool.clone()) {
        Ok((agent, session)) => {
            checks.push(pass(
                "agent_runtime",
                elapsed_since(agent_started),
                format!("mock agent ready ({} tools)", agent.tools().specs().len()),
            ));
            Some((agent, session))
        }
        Err(message) => {
            checks.push(fail("agent_runtime", elapsed_since(agent_started), message));
            checks.extend(downstream[2..].iter().copied().map(skipped));
            None
        }
    };

    if let Some((agent, mut session)) = agent {
        for &(name, utterance) in SMOKE_TURNS {
            checks.push(run_turn(&runtime, &agent, &mut session, name, utterance));
        }
    }

    runtime.block_on(async {
        pool.close().await;
    });

    finalize_report(checks, elapsed_since(started))
}

async fn seeded_memory_pool() -> Result<DbPool, String> {
    let pool = connect_with_settings("sqlite::memory:", 1, 5)
        .await
        .map_err(|error| format!("failed to open in-memory database: {error}"))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| format!("migration execution failed: {error}"))?;
    RestaurantSeedDataset::load(&pool).await.map_err(|error| format!("seed failed: {error}"))?;
    let verification = RestaurantSeedDataset::verify(&pool)
        .await
        .map_err(|error| format!("seed verification failed: {error}"))?;
    if !verification.all_present {
        return Err("seed verification reported missing rows".to_string());
    }
    Ok(pool)
}

fn smoke_agent(config: &AppConfig, pool: DbPool) -> Result<(AgentRuntime, CallSession), String> {
    let mut config = config.clone();
    config.llm.provider = LlmProvider::Mock;

    let agent = hostline_agent::build_runtime(&config, pool, None)
        .map_err(|error| format!("agent runtime failed to build: {error:#}"))?;
    let session = agent
        .open_session(CallSid(SMOKE_CALL_SID.to_string()), Some("+15550000000".to_string()), None)
        .map_err(|error| format!("call session failed to open: {error:#}"))?;
    Ok((agent, session))
}

fn run_turn(
    runtime: &Runtime,
    agent: &AgentRuntime,
    session: &mut CallSession,
    name: &'static str,
    utterance: &str,
) -> SmokeCheck {
    let started = Instant::now();
    let actions_before = session.record.actions.len();
    let reply = runtime.block_on(agent.respond(session, utterance));
    let new_actions = &session.record.actions[actions_before..];
    let elapsed_ms = elapsed_since(started);

    if reply.text.trim().is_empty() {
        return fail(name, elapsed_ms, format!("empty reply to `{utterance}`"));
    }
    if new_actions.is_empty() {
        return fail(name, elapsed_ms, format!("no tool action for `{utterance}`: {}", reply.text));
    }

    let tools = new_actions.iter().map(|action| action.tool_name.as_str()).collect::<Vec<_>>();
    pass(name, elapsed_ms, format!("replied via {}", tools.join(", ")))
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn elapsed_since(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn pass(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn fail(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
