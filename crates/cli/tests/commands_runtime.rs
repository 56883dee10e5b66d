use std::env;
use std::sync::{Mutex, OnceLock};

use hostline_cli::commands::{chat, migrate, seed, smoke, start};
use serde_json::Value;

const MEMORY_DB: (&str, &str) = ("HOSTLINE_DATABASE_URL", "sqlite::memory:");

#[test]
fn start_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB], || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("0.0.0.0:8000"), "unexpected message: {message}");
        assert!(message.contains("llm: mock"), "unexpected message: {message}");
    });
}

#[test]
fn start_returns_config_failure_for_live_llm_without_key() {
    with_env(&[MEMORY_DB, ("HOSTLINE_LLM_PROVIDER", "openai")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn start_returns_db_failure_for_unreachable_database() {
    with_env(&[("HOSTLINE_DATABASE_URL", "sqlite:///nonexistent-dir/deeper/hostline.db")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 4, "expected database connectivity failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_loads_restaurant_dataset() {
    with_env(&[MEMORY_DB], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or_default();
        assert!(
            message.starts_with("restaurant dataset ready: 17 menu items, 6 tables"),
            "unexpected message: {message}"
        );
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("hostline.db").display());

    with_env(&[("HOSTLINE_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_message = parse_payload(&first.output)["message"].as_str().map(str::to_owned);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");

        assert_ne!(first_message.as_deref(), second_payload["message"].as_str());
        assert!(second_payload["message"]
            .as_str()
            .unwrap_or_default()
            .ends_with("0 specials added, 0 reservations added"));
    });
}

#[test]
fn smoke_returns_success_report_with_valid_env() {
    with_env(&[MEMORY_DB], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");

        let checks = payload["checks"].as_array().expect("checks array");
        let names: Vec<&str> = checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(
            names,
            ["config_validation", "database_setup", "agent_runtime", "menu_turn", "reservation_turn"]
        );
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[MEMORY_DB, ("HOSTLINE_LLM_PROVIDER", "openai")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn chat_runs_messages_through_mock_agent() {
    with_env(&[MEMORY_DB], || {
        let messages = vec!["What's on the menu?".to_string(), "Thanks, goodbye".to_string()];
        let result = chat::run(&messages, chat::DEFAULT_CALL_SID);
        assert_eq!(result.exit_code, 0, "expected chat success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "chat");
        assert_eq!(payload["call_sid"], chat::DEFAULT_CALL_SID);
        assert_eq!(payload["provider"], "mock");

        let turns = payload["turns"].as_array().expect("turns array");
        assert_eq!(turns.len(), 2);
        assert!(!turns[0]["agent"].as_str().unwrap_or_default().is_empty());
        assert_eq!(turns[0]["tools"][0], "get_menu_categories");
        assert_eq!(turns[1]["ends_call"], true);
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "HOSTLINE_APP_ENV",
        "HOSTLINE_DEBUG",
        "HOSTLINE_DATABASE_URL",
        "HOSTLINE_DATABASE_MAX_CONNECTIONS",
        "HOSTLINE_DATABASE_TIMEOUT_SECS",
        "HOSTLINE_LLM_PROVIDER",
        "HOSTLINE_LLM_API_KEY",
        "HOSTLINE_LLM_BASE_URL",
        "HOSTLINE_LLM_MODEL",
        "HOSTLINE_SPEECH_STT_PROVIDER",
        "HOSTLINE_SPEECH_TTS_PROVIDER",
        "HOSTLINE_TELEPHONY_ACCOUNT_SID",
        "HOSTLINE_TELEPHONY_AUTH_TOKEN",
        "HOSTLINE_STORAGE_KIND",
        "HOSTLINE_SERVER_BIND_ADDRESS",
        "HOSTLINE_SERVER_PORT",
        "HOSTLINE_LOGGING_LEVEL",
        "HOSTLINE_LOGGING_FORMAT",
        "HOSTLINE_LOG_LEVEL",
        "HOSTLINE_LOG_FORMAT",
        "OPENAI_API_KEY",
        "DATABASE_URL",
        "DEBUG",
        "LOG_LEVEL",
        "APP_ENV",
        "HOST",
        "PORT",
        "TWILIO_ACCOUNT_SID",
        "TWILIO_AUTH_TOKEN",
        "TWILIO_API_KEY",
        "TWILIO_API_SECRET",
        "TWILIO_PHONE_NUMBER",
        "STORAGE_TYPE",
        "LOCAL_STORAGE_PATH",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
