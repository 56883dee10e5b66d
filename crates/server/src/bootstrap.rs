use std::sync::{Arc, Mutex};
use std::time::Instant;

use sqlx::migrate::MigrateError;
use sysinfo::System;
use thiserror::Error;
use tracing::info;

use hostline_agent::{ConversationStore, ReservationNotifier};
use hostline_core::config::{AppConfig, ConfigError};
use hostline_db::{connect_with_config, migrations, DbPool, SqlCallRecordRepository};
use hostline_voice::{TwilioClient, VoiceError, VoiceResponses};

use crate::export::CallExporter;
use crate::logs::LogBuffer;
use crate::notify::SmsConfirmation;
use crate::state::{AppState, Shutdown};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] MigrateError),
    #[error("voice backend setup failed: {0}")]
    Voice(#[from] VoiceError),
    #[error("agent runtime setup failed: {0}")]
    Agent(String),
}

pub async fn bootstrap_with_config(
    config: AppConfig,
    logs: LogBuffer,
) -> Result<AppState, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        environment = config.app.environment.as_str(),
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    build_state(config, db_pool, logs)
}

/// Assembles the shared state around an already migrated pool.
pub fn build_state(
    config: AppConfig,
    db_pool: DbPool,
    logs: LogBuffer,
) -> Result<AppState, BootstrapError> {
    let telephony = TwilioClient::from_config(&config.telephony)?;
    let notifier = SmsConfirmation::from_config(&config, telephony.as_ref())
        .map(|notifier| Arc::new(notifier) as Arc<dyn ReservationNotifier>);

    let agent = hostline_agent::build_runtime(&config, db_pool.clone(), notifier)
        .map_err(|error| BootstrapError::Agent(format!("{error:#}")))?;
    let speech_to_text = hostline_voice::speech_to_text(&config)?;
    let text_to_speech = hostline_voice::text_to_speech(&config)?;
    let exporter = CallExporter::new(
        Arc::new(SqlCallRecordRepository::new(db_pool.clone())),
        &config.storage,
    );

    info!(
        event_name = "system.bootstrap.backends_selected",
        correlation_id = "bootstrap",
        llm = agent.llm().provider(),
        stt = speech_to_text.name(),
        tts = text_to_speech.name(),
        telephony = telephony.is_some(),
        signatures_enforced = config.enforces_webhook_signatures(),
        "voice and agent backends selected"
    );

    Ok(AppState {
        responses: VoiceResponses::new(config.speech.say_voice.clone()),
        config: Arc::new(config),
        db_pool,
        agent: Arc::new(agent),
        conversations: ConversationStore::new(),
        speech_to_text,
        text_to_speech,
        telephony,
        exporter,
        logs,
        shutdown: Shutdown::default(),
        started_at: Instant::now(),
        system: Arc::new(Mutex::new(System::new())),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use hostline_core::config::AppConfig;
    use hostline_db::{connect_with_settings, migrations, RestaurantSeedDataset};

    use super::build_state;
    use crate::logs::LogBuffer;
    use crate::state::AppState;

    pub async fn state_with(config: AppConfig) -> AppState {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        RestaurantSeedDataset::load(&pool).await.expect("seed");
        build_state(config, pool, LogBuffer::new(100)).expect("state")
    }

    pub async fn state() -> AppState {
        state_with(AppConfig::default()).await
    }
}

#[cfg(test)]
mod tests {
    use hostline_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

    use super::{bootstrap_with_config, AppState, BootstrapError};
    use crate::logs::LogBuffer;

    async fn bootstrap(options: LoadOptions, logs: LogBuffer) -> Result<AppState, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?, logs).await
    }

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_owned()),
                llm_provider: Some(LlmProvider::Mock),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_selects_mock_backends() {
        let state = bootstrap(overrides("sqlite::memory:"), LogBuffer::new(10))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('menu_item', 'reservation', 'call_record')",
        )
        .fetch_one(&state.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 3);

        assert_eq!(state.agent.llm().provider(), "mock");
        assert_eq!(state.speech_to_text.name(), "mock");
        assert!(state.telephony.is_none());
        assert!(state.conversations.is_empty().await);
    }

    #[tokio::test]
    async fn unreachable_database_fails_fast() {
        let result =
            bootstrap(overrides("sqlite:///nonexistent-dir/deeper/calls.db"), LogBuffer::new(10)).await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.starts_with("database connection failed"), "{message}");
    }
}
