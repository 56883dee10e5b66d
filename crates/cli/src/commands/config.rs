use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hostline_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One reported setting: dotted key, rendered value, and the env names that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
        Field { key, value, env_keys }
    }

    vec![
        field(
            "app.environment",
            config.app.environment.as_str().to_string(),
            &["HOSTLINE_APP_ENV", "APP_ENV"],
        ),
        field("app.debug", config.app.debug.to_string(), &["HOSTLINE_DEBUG", "DEBUG"]),
        field("database.url", config.database.url.clone(), &["HOSTLINE_DATABASE_URL", "DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["HOSTLINE_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "llm.provider",
            format!(
                "{} (resolved: {})",
                config.llm.provider.as_str(),
                config.llm.resolved_provider().as_str()
            ),
            &["HOSTLINE_LLM_PROVIDER"],
        ),
        field("llm.model", config.llm.model.clone(), &["HOSTLINE_LLM_MODEL"]),
        field("llm.base_url", config.llm.base_url.clone(), &["HOSTLINE_LLM_BASE_URL"]),
        field(
            "llm.api_key",
            redact_secret(config.llm.api_key.as_ref()),
            &["HOSTLINE_LLM_API_KEY", "OPENAI_API_KEY"],
        ),
        field(
            "speech.stt_provider",
            format!("{:?}", config.speech.stt_provider),
            &["HOSTLINE_SPEECH_STT_PROVIDER"],
        ),
        field(
            "speech.tts_provider",
            format!("{:?}", config.speech.tts_provider),
            &["HOSTLINE_SPEECH_TTS_PROVIDER"],
        ),
        field(
            "telephony.account_sid",
            redact_identifier(config.telephony.account_sid.as_deref()),
            &["HOSTLINE_TELEPHONY_ACCOUNT_SID", "TWILIO_ACCOUNT_SID"],
        ),
        field(
            "telephony.auth_token",
            redact_secret(config.telephony.auth_token.as_ref()),
            &["HOSTLINE_TELEPHONY_AUTH_TOKEN", "TWILIO_AUTH_TOKEN"],
        ),
        field(
            "telephony.phone_number",
            config.telephony.phone_number.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["HOSTLINE_TELEPHONY_PHONE_NUMBER", "TWILIO_PHONE_NUMBER"],
        ),
        field(
            "telephony.validate_signatures",
            format!(
                "{} (enforced: {})",
                config.telephony.validate_signatures,
                config.enforces_webhook_signatures()
            ),
            &["HOSTLINE_TELEPHONY_VALIDATE_SIGNATURES"],
        ),
        field("restaurant.name", config.restaurant.name.clone(), &["HOSTLINE_RESTAURANT_NAME"]),
        field("storage.kind", format!("{:?}", config.storage.kind), &["HOSTLINE_STORAGE_KIND", "STORAGE_TYPE"]),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["HOSTLINE_SERVER_BIND_ADDRESS", "HOST"],
        ),
        field("server.port", config.server.port.to_string(), &["HOSTLINE_SERVER_PORT", "PORT"]),
        field(
            "server.admin_token",
            redact_secret(config.server.admin_token.as_ref()),
            &["HOSTLINE_SERVER_ADMIN_TOKEN"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["HOSTLINE_LOGGING_LEVEL", "HOSTLINE_LOG_LEVEL", "LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["HOSTLINE_LOGGING_FORMAT", "HOSTLINE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("hostline.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/hostline.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "<redacted>".to_string(),
        Some(_) => "<empty>".to_string(),
        None => "<unset>".to_string(),
    }
}

/// Keeps the two-letter Twilio prefix (`AC`, `SK`) so the kind of id stays visible.
fn redact_identifier(value: Option<&str>) -> String {
    match value.map(str::trim) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(value) => format!("{}***", value.chars().take(2).collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, redact_identifier, redact_secret};

    #[test]
    fn secrets_never_render_their_value() {
        let token = SecretString::from("sk-live-123".to_string());
        assert_eq!(redact_secret(Some(&token)), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
        assert_eq!(redact_identifier(Some("AC0123456789")), "AC***");
    }

    #[test]
    fn dotted_paths_resolve_inside_toml_tables() {
        let doc: Value = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
    }
}
