use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app: ApplicationConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub telephony: TelephonyConfig,
    pub restaurant: RestaurantConfig,
    pub calls: CallsConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    pub name: String,
    pub version: String,
    pub environment: Environment,
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub organization: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub stt_provider: SttProvider,
    pub tts_provider: TtsProvider,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub say_voice: String,
}

#[derive(Clone, Debug)]
pub struct TelephonyConfig {
    pub account_sid: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<SecretString>,
    pub auth_token: Option<SecretString>,
    pub phone_number: Option<String>,
    pub validate_signatures: bool,
    pub public_base_url: Option<String>,
    pub sms_confirmations: bool,
}

#[derive(Clone, Debug)]
pub struct RestaurantConfig {
    pub name: String,
    pub agent_name: String,
    pub cuisine: String,
    pub address: String,
    pub phone: String,
    pub open_hour: u32,
    pub close_hour: u32,
}

#[derive(Clone, Debug)]
pub struct CallsConfig {
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_tool_rounds: u32,
    pub max_history_messages: usize,
    pub max_input_chars: usize,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub local_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub admin_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub buffer_capacity: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Which chat-completion backend drives the agent. `Auto` resolves to the live API
/// when an api key is configured and to the deterministic mock otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Auto,
    #[serde(rename = "openai")]
    OpenAi,
    Mock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttProvider {
    Auto,
    Whisper,
    Mock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Mock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Database,
    Local,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub debug: Option<bool>,
    pub environment: Option<Environment>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub admin_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: ApplicationConfig {
                name: "Voice AI Restaurant Agent".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                environment: Environment::Production,
                debug: false,
            },
            database: DatabaseConfig {
                url: "sqlite://hostline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Auto,
                api_key: None,
                organization: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            speech: SpeechConfig {
                stt_provider: SttProvider::Auto,
                tts_provider: TtsProvider::Mock,
                stt_model: "whisper-1".to_string(),
                tts_model: "tts-1".to_string(),
                tts_voice: "alloy".to_string(),
                say_voice: "Polly.Joanna-Neural".to_string(),
            },
            telephony: TelephonyConfig {
                account_sid: None,
                api_key: None,
                api_secret: None,
                auth_token: None,
                phone_number: None,
                validate_signatures: true,
                public_base_url: None,
                sms_confirmations: false,
            },
            restaurant: RestaurantConfig {
                name: "Taste of India".to_string(),
                agent_name: "Priya".to_string(),
                cuisine: "Modern Indian Cuisine".to_string(),
                address: "123 Culinary Street, Foodville".to_string(),
                phone: "(555) 123-4567".to_string(),
                open_hour: 11,
                close_hour: 22,
            },
            calls: CallsConfig {
                session_ttl_secs: 3600,
                sweep_interval_secs: 300,
                max_tool_rounds: 5,
                max_history_messages: 40,
                max_input_chars: 2000,
            },
            storage: StorageConfig {
                kind: StorageKind::Database,
                local_path: PathBuf::from("./storage"),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
                admin_token: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
                buffer_capacity: 500,
            },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Validation(format!(
                "app.environment `{other}` must be one of development|staging|production"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected auto|openai|mock)"
            ))),
        }
    }
}

impl std::str::FromStr for SttProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "whisper" => Ok(Self::Whisper),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::Validation(format!(
                "unsupported stt provider `{other}` (expected auto|whisper|mock)"
            ))),
        }
    }
}

impl std::str::FromStr for TtsProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::Validation(format!(
                "unsupported tts provider `{other}` (expected openai|mock)"
            ))),
        }
    }
}

impl std::str::FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "local" => Ok(Self::Local),
            other => Err(ConfigError::Validation(format!(
                "unsupported storage kind `{other}` (expected database|local)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    /// Provider actually used at runtime; never returns `Auto`.
    pub fn resolved_provider(&self) -> LlmProvider {
        match self.provider {
            LlmProvider::Auto if self.has_api_key() => LlmProvider::OpenAi,
            LlmProvider::Auto => LlmProvider::Mock,
            explicit => explicit,
        }
    }
}

impl TelephonyConfig {
    /// Secret used to verify `X-Twilio-Signature`. The account auth token is preferred.
    pub fn signing_secret(&self) -> Option<&SecretString> {
        self.auth_token
            .as_ref()
            .or(self.api_secret.as_ref())
            .filter(|secret| !secret.expose_secret().trim().is_empty())
    }

    /// Basic-auth pair for the REST API: api key + secret, or account sid + auth token.
    pub fn rest_credentials(&self) -> Option<(String, SecretString)> {
        let account_sid = self.account_sid.as_ref()?;
        match (&self.api_key, &self.api_secret, &self.auth_token) {
            (Some(key), Some(secret), _) => Some((key.clone(), secret.clone())),
            (_, _, Some(token)) => Some((account_sid.clone(), token.clone())),
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hostline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.logging.level = normalize_log_level(&config.logging.level);
        config.validate()?;

        Ok(config)
    }

    /// Speech recognition falls back to the keyword mock in debug mode or without an api key.
    pub fn stt_uses_mock(&self) -> bool {
        match self.speech.stt_provider {
            SttProvider::Mock => true,
            SttProvider::Whisper => false,
            SttProvider::Auto => self.app.debug || !self.llm.has_api_key(),
        }
    }

    /// Signature checks are skipped in debug mode or when no signing secret exists.
    pub fn enforces_webhook_signatures(&self) -> bool {
        self.telephony.validate_signatures
            && !self.app.debug
            && self.telephony.signing_secret().is_some()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(app) = patch.app {
            if let Some(name) = app.name {
                self.app.name = name;
            }
            if let Some(environment) = app.environment {
                self.app.environment = environment.parse()?;
            }
            if let Some(debug) = app.debug {
                self.app.debug = debug;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider.parse()?;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(organization) = llm.organization {
                self.llm.organization = Some(organization);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(speech) = patch.speech {
            if let Some(stt_provider) = speech.stt_provider {
                self.speech.stt_provider = stt_provider.parse()?;
            }
            if let Some(tts_provider) = speech.tts_provider {
                self.speech.tts_provider = tts_provider.parse()?;
            }
            if let Some(stt_model) = speech.stt_model {
                self.speech.stt_model = stt_model;
            }
            if let Some(tts_model) = speech.tts_model {
                self.speech.tts_model = tts_model;
            }
            if let Some(tts_voice) = speech.tts_voice {
                self.speech.tts_voice = tts_voice;
            }
            if let Some(say_voice) = speech.say_voice {
                self.speech.say_voice = say_voice;
            }
        }

        if let Some(telephony) = patch.telephony {
            if let Some(account_sid) = telephony.account_sid {
                self.telephony.account_sid = Some(account_sid);
            }
            if let Some(api_key) = telephony.api_key {
                self.telephony.api_key = Some(api_key);
            }
            if let Some(api_secret_value) = telephony.api_secret {
                self.telephony.api_secret = Some(secret_value(api_secret_value));
            }
            if let Some(auth_token_value) = telephony.auth_token {
                self.telephony.auth_token = Some(secret_value(auth_token_value));
            }
            if let Some(phone_number) = telephony.phone_number {
                self.telephony.phone_number = Some(phone_number);
            }
            if let Some(validate_signatures) = telephony.validate_signatures {
                self.telephony.validate_signatures = validate_signatures;
            }
            if let Some(public_base_url) = telephony.public_base_url {
                self.telephony.public_base_url = Some(public_base_url);
            }
            if let Some(sms_confirmations) = telephony.sms_confirmations {
                self.telephony.sms_confirmations = sms_confirmations;
            }
        }

        if let Some(restaurant) = patch.restaurant {
            if let Some(name) = restaurant.name {
                self.restaurant.name = name;
            }
            if let Some(agent_name) = restaurant.agent_name {
                self.restaurant.agent_name = agent_name;
            }
            if let Some(cuisine) = restaurant.cuisine {
                self.restaurant.cuisine = cuisine;
            }
            if let Some(address) = restaurant.address {
                self.restaurant.address = address;
            }
            if let Some(phone) = restaurant.phone {
                self.restaurant.phone = phone;
            }
            if let Some(open_hour) = restaurant.open_hour {
                self.restaurant.open_hour = open_hour;
            }
            if let Some(close_hour) = restaurant.close_hour {
                self.restaurant.close_hour = close_hour;
            }
        }

        if let Some(calls) = patch.calls {
            if let Some(session_ttl_secs) = calls.session_ttl_secs {
                self.calls.session_ttl_secs = session_ttl_secs;
            }
            if let Some(sweep_interval_secs) = calls.sweep_interval_secs {
                self.calls.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(max_tool_rounds) = calls.max_tool_rounds {
                self.calls.max_tool_rounds = max_tool_rounds;
            }
            if let Some(max_history_messages) = calls.max_history_messages {
                self.calls.max_history_messages = max_history_messages;
            }
            if let Some(max_input_chars) = calls.max_input_chars {
                self.calls.max_input_chars = max_input_chars;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(kind) = storage.kind {
                self.storage.kind = kind.parse()?;
            }
            if let Some(local_path) = storage.local_path {
                self.storage.local_path = local_path;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(admin_token_value) = server.admin_token {
                self.server.admin_token = Some(secret_value(admin_token_value));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
            if let Some(buffer_capacity) = logging.buffer_capacity {
                self.logging.buffer_capacity = buffer_capacity;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HOSTLINE_APP_NAME") {
            self.app.name = value;
        }
        if let Some((key, value)) = read_env_any(&["HOSTLINE_APP_ENV", "APP_ENV"]) {
            self.app.environment = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value })?;
        }
        if let Some((key, value)) = read_env_any(&["HOSTLINE_DEBUG", "DEBUG"]) {
            self.app.debug = parse_bool(key, &value)?;
        }

        if let Some((_, value)) = read_env_any(&["HOSTLINE_DATABASE_URL", "DATABASE_URL"]) {
            self.database.url = value;
        }
        if let Some(value) = read_env("HOSTLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("HOSTLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HOSTLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HOSTLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some((_, value)) = read_env_any(&["HOSTLINE_LLM_API_KEY", "OPENAI_API_KEY"]) {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some((_, value)) = read_env_any(&["HOSTLINE_LLM_ORGANIZATION", "OPENAI_ORG_ID"]) {
            self.llm.organization = Some(value);
        }
        if let Some(value) = read_env("HOSTLINE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("HOSTLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("HOSTLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("HOSTLINE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("HOSTLINE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("HOSTLINE_SPEECH_STT_PROVIDER") {
            self.speech.stt_provider = value.parse()?;
        }
        if let Some(value) = read_env("HOSTLINE_SPEECH_TTS_PROVIDER") {
            self.speech.tts_provider = value.parse()?;
        }
        if let Some(value) = read_env("HOSTLINE_SPEECH_TTS_VOICE") {
            self.speech.tts_voice = value;
        }
        if let Some(value) = read_env("HOSTLINE_SPEECH_SAY_VOICE") {
            self.speech.say_voice = value;
        }

        if let Some((_, value)) =
            read_env_any(&["HOSTLINE_TELEPHONY_ACCOUNT_SID", "TWILIO_ACCOUNT_SID"])
        {
            self.telephony.account_sid = Some(value);
        }
        if let Some((_, value)) = read_env_any(&["HOSTLINE_TELEPHONY_API_KEY", "TWILIO_API_KEY"]) {
            self.telephony.api_key = Some(value);
        }
        if let Some((_, value)) =
            read_env_any(&["HOSTLINE_TELEPHONY_API_SECRET", "TWILIO_API_SECRET"])
        {
            self.telephony.api_secret = Some(secret_value(value));
        }
        if let Some((_, value)) =
            read_env_any(&["HOSTLINE_TELEPHONY_AUTH_TOKEN", "TWILIO_AUTH_TOKEN"])
        {
            self.telephony.auth_token = Some(secret_value(value));
        }
        if let Some((_, value)) =
            read_env_any(&["HOSTLINE_TELEPHONY_PHONE_NUMBER", "TWILIO_PHONE_NUMBER"])
        {
            self.telephony.phone_number = Some(value);
        }
        if let Some(value) = read_env("HOSTLINE_TELEPHONY_VALIDATE_SIGNATURES") {
            self.telephony.validate_signatures =
                parse_bool("HOSTLINE_TELEPHONY_VALIDATE_SIGNATURES", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_TELEPHONY_PUBLIC_BASE_URL") {
            self.telephony.public_base_url = Some(value);
        }
        if let Some(value) = read_env("HOSTLINE_TELEPHONY_SMS_CONFIRMATIONS") {
            self.telephony.sms_confirmations =
                parse_bool("HOSTLINE_TELEPHONY_SMS_CONFIRMATIONS", &value)?;
        }

        if let Some(value) = read_env("HOSTLINE_RESTAURANT_NAME") {
            self.restaurant.name = value;
        }
        if let Some(value) = read_env("HOSTLINE_RESTAURANT_AGENT_NAME") {
            self.restaurant.agent_name = value;
        }
        if let Some(value) = read_env("HOSTLINE_RESTAURANT_OPEN_HOUR") {
            self.restaurant.open_hour = parse_u32("HOSTLINE_RESTAURANT_OPEN_HOUR", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_RESTAURANT_CLOSE_HOUR") {
            self.restaurant.close_hour = parse_u32("HOSTLINE_RESTAURANT_CLOSE_HOUR", &value)?;
        }

        if let Some(value) = read_env("HOSTLINE_CALLS_SESSION_TTL_SECS") {
            self.calls.session_ttl_secs = parse_u64("HOSTLINE_CALLS_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_CALLS_MAX_TOOL_ROUNDS") {
            self.calls.max_tool_rounds = parse_u32("HOSTLINE_CALLS_MAX_TOOL_ROUNDS", &value)?;
        }

        if let Some((_, value)) = read_env_any(&["HOSTLINE_STORAGE_KIND", "STORAGE_TYPE"]) {
            self.storage.kind = value.parse()?;
        }
        if let Some((_, value)) =
            read_env_any(&["HOSTLINE_STORAGE_LOCAL_PATH", "LOCAL_STORAGE_PATH"])
        {
            self.storage.local_path = PathBuf::from(value);
        }

        if let Some((_, value)) = read_env_any(&["HOSTLINE_SERVER_BIND_ADDRESS", "HOST"]) {
            self.server.bind_address = value;
        }
        if let Some((key, value)) = read_env_any(&["HOSTLINE_SERVER_PORT", "PORT"]) {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HOSTLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("HOSTLINE_SERVER_ADMIN_TOKEN") {
            self.server.admin_token = Some(secret_value(value));
        }

        let log_level = read_env_any(&["HOSTLINE_LOGGING_LEVEL", "HOSTLINE_LOG_LEVEL", "LOG_LEVEL"]);
        if let Some((_, value)) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env_any(&["HOSTLINE_LOGGING_FORMAT", "HOSTLINE_LOG_FORMAT"]);
        if let Some((_, value)) = log_format {
            self.logging.format = value.parse()?;
        }
        if let Some(value) = read_env("HOSTLINE_LOGGING_BUFFER_CAPACITY") {
            self.logging.buffer_capacity = parse_usize("HOSTLINE_LOGGING_BUFFER_CAPACITY", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(debug) = overrides.debug {
            self.app.debug = debug;
        }
        if let Some(environment) = overrides.environment {
            self.app.environment = environment;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(admin_token) = overrides.admin_token {
            self.server.admin_token = Some(secret_value(admin_token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_app(&self.app)?;
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_speech(&self.speech, &self.llm)?;
        validate_telephony(&self.telephony)?;
        validate_restaurant(&self.restaurant)?;
        validate_calls(&self.calls)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hostline.toml"), PathBuf::from("config/hostline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// Accepts the python-style level names operators already use (`WARNING`, `CRITICAL`).
fn normalize_log_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

fn validate_app(app: &ApplicationConfig) -> Result<(), ConfigError> {
    if app.name.trim().is_empty() {
        return Err(ConfigError::Validation("app.name must not be empty".to_string()));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.provider == LlmProvider::OpenAi && !llm.has_api_key() {
        return Err(ConfigError::Validation(
            "llm.api_key is required for the openai provider (set OPENAI_API_KEY or HOSTLINE_LLM_API_KEY)"
                .to_string(),
        ));
    }

    if !is_http_url(&llm.base_url) {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_speech(speech: &SpeechConfig, llm: &LlmConfig) -> Result<(), ConfigError> {
    if speech.stt_provider == SttProvider::Whisper && !llm.has_api_key() {
        return Err(ConfigError::Validation(
            "speech.stt_provider `whisper` requires llm.api_key".to_string(),
        ));
    }

    if speech.tts_provider == TtsProvider::OpenAi && !llm.has_api_key() {
        return Err(ConfigError::Validation(
            "speech.tts_provider `openai` requires llm.api_key".to_string(),
        ));
    }

    if speech.say_voice.trim().is_empty() {
        return Err(ConfigError::Validation("speech.say_voice must not be empty".to_string()));
    }

    Ok(())
}

fn validate_telephony(telephony: &TelephonyConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &telephony.public_base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "telephony.public_base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if telephony.sms_confirmations {
        if telephony.phone_number.is_none() {
            return Err(ConfigError::Validation(
                "telephony.sms_confirmations requires telephony.phone_number".to_string(),
            ));
        }
        if telephony.rest_credentials().is_none() {
            return Err(ConfigError::Validation(
                "telephony.sms_confirmations requires telephony.account_sid with api_key/api_secret or auth_token"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_restaurant(restaurant: &RestaurantConfig) -> Result<(), ConfigError> {
    if restaurant.name.trim().is_empty() || restaurant.agent_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "restaurant.name and restaurant.agent_name must not be empty".to_string(),
        ));
    }

    if restaurant.close_hour > 24 {
        return Err(ConfigError::Validation(
            "restaurant.close_hour must be in range 1..=24".to_string(),
        ));
    }

    if restaurant.open_hour >= restaurant.close_hour {
        return Err(ConfigError::Validation(
            "restaurant.open_hour must be before restaurant.close_hour".to_string(),
        ));
    }

    Ok(())
}

fn validate_calls(calls: &CallsConfig) -> Result<(), ConfigError> {
    if calls.session_ttl_secs == 0 || calls.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "calls.session_ttl_secs and calls.sweep_interval_secs must be greater than zero"
                .to_string(),
        ));
    }

    if calls.max_tool_rounds == 0 || calls.max_tool_rounds > 10 {
        return Err(ConfigError::Validation(
            "calls.max_tool_rounds must be in range 1..=10".to_string(),
        ));
    }

    if calls.max_history_messages < 4 {
        return Err(ConfigError::Validation(
            "calls.max_history_messages must be at least 4".to_string(),
        ));
    }

    if calls.max_input_chars == 0 {
        return Err(ConfigError::Validation(
            "calls.max_input_chars must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => {
            return Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            ))
        }
    }

    if logging.buffer_capacity == 0 {
        return Err(ConfigError::Validation(
            "logging.buffer_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_any<'a>(keys: &[&'a str]) -> Option<(&'a str, String)> {
    keys.iter().find_map(|key| read_env(key).map(|value| (*key, value)))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    app: Option<AppPatch>,
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    speech: Option<SpeechPatch>,
    telephony: Option<TelephonyPatch>,
    restaurant: Option<RestaurantPatch>,
    calls: Option<CallsPatch>,
    storage: Option<StoragePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AppPatch {
    name: Option<String>,
    environment: Option<String>,
    debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<String>,
    api_key: Option<String>,
    organization: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechPatch {
    stt_provider: Option<String>,
    tts_provider: Option<String>,
    stt_model: Option<String>,
    tts_model: Option<String>,
    tts_voice: Option<String>,
    say_voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelephonyPatch {
    account_sid: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    auth_token: Option<String>,
    phone_number: Option<String>,
    validate_signatures: Option<bool>,
    public_base_url: Option<String>,
    sms_confirmations: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RestaurantPatch {
    name: Option<String>,
    agent_name: Option<String>,
    cuisine: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    open_hour: Option<u32>,
    close_hour: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CallsPatch {
    session_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    max_tool_rounds: Option<u32>,
    max_history_messages: Option<usize>,
    max_input_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    kind: Option<String>,
    local_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    admin_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
    buffer_capacity: Option<usize>,
}
