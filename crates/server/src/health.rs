use std::sync::PoisonError;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use sysinfo::{get_current_pid, ProcessesToUpdate};
use tracing::warn;

use hostline_db::DbPool;

use crate::state::AppState;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub environment: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsResponse {
    pub uptime: u64,
    pub memory_usage: f64,
    pub cpu_usage: f32,
    pub active_connections: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/readiness", get(readiness))
        .route("/metrics", get(metrics))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: state.config.app.version.clone(),
        environment: state.config.app.environment.as_str(),
    })
}

pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = ReadinessResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let (memory_usage, cpu_usage) = process_usage(&state);
    Json(MetricsResponse {
        uptime: state.started_at.elapsed().as_secs(),
        memory_usage,
        cpu_usage,
        active_connections: state.conversations.len().await,
    })
}

/// Resident memory in MB and CPU percent of this process since the previous refresh.
fn process_usage(state: &AppState) -> (f64, f32) {
    let pid = match get_current_pid() {
        Ok(pid) => pid,
        Err(error) => {
            warn!(
                event_name = "system.metrics.pid_unavailable",
                correlation_id = "metrics",
                error = %error,
                "process id unavailable for metrics"
            );
            return (0.0, 0.0);
        }
    };

    let mut system = state.system.lock().unwrap_or_else(PoisonError::into_inner);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map_or((0.0, 0.0), |process| {
        let memory_mb = process.memory() as f64 / BYTES_PER_MB;
        ((memory_mb * 100.0).round() / 100.0, process.cpu_usage())
    })
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use hostline_core::domain::call::CallSid;

    use crate::bootstrap::test_support::state;
    use crate::health::{health, metrics, readiness};

    #[tokio::test]
    async fn health_reports_version_and_environment() {
        let state = state().await;

        let Json(payload) = health(State(state.clone())).await;

        assert_eq!(payload.status, "healthy");
        assert_eq!(payload.version, state.config.app.version);
        assert_eq!(payload.environment, "production");
    }

    #[tokio::test]
    async fn readiness_is_ok_when_database_is_reachable() {
        let state = state().await;

        let (status, Json(payload)) = readiness(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
    }

    #[tokio::test]
    async fn readiness_degrades_when_database_is_closed() {
        let state = state().await;
        state.db_pool.close().await;

        let (status, Json(payload)) = readiness(State(state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(payload.database.detail.starts_with("database query failed"));
    }

    #[tokio::test]
    async fn metrics_count_active_call_sessions() {
        let state = state().await;
        let session = state
            .agent
            .open_session(CallSid("CA-metrics".to_owned()), None, None)
            .expect("session");
        state.conversations.open(session).await;

        let Json(payload) = metrics(State(state)).await;

        assert_eq!(payload.active_connections, 1);
        assert!(payload.memory_usage >= 0.0);
    }
}
