use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::info;

use hostline_core::domain::call::CallStatus;

use crate::state::AppState;

/// Periodically closes call sessions whose status callback never arrived.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    tokio::spawn(run(state))
}

pub async fn run(state: AppState) {
    let interval_secs = state.config.calls.sweep_interval_secs.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        event_name = "system.sweeper.start",
        correlation_id = "sweeper",
        interval_secs,
        ttl_secs = state.config.calls.session_ttl_secs,
        "idle session sweeper started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_once(&state).await;
            }
            reason = state.shutdown.triggered() => {
                info!(
                    event_name = "system.sweeper.stopping",
                    correlation_id = "sweeper",
                    reason = ?reason,
                    "shutdown observed"
                );
                break;
            }
        }
    }

    info!(event_name = "system.sweeper.stopped", correlation_id = "sweeper", "idle session sweeper stopped");
}

/// Exports expired sessions as failed and returns how many were closed.
pub async fn sweep_once(state: &AppState) -> usize {
    let ttl_secs = i64::try_from(state.config.calls.session_ttl_secs).unwrap_or(i64::MAX);
    let expired = state
        .conversations
        .sweep_expired(Utc::now(), chrono::Duration::seconds(ttl_secs))
        .await;
    if expired.is_empty() {
        return 0;
    }

    let count = expired.len();
    let exported = state.exporter.finish_all(expired, CallStatus::Failed).await;
    info!(
        event_name = "system.sweeper.swept",
        correlation_id = "sweeper",
        expired = count,
        exported,
        "idle call sessions closed"
    );
    count
}
