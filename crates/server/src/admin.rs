//! Operator endpoints: effective config, recent logs and restart.
//!
//! Access is open in debug mode. Otherwise every request must carry
//! `Authorization: Bearer <server.admin_token>`; without a configured token the admin
//! surface stays closed.

use axum::extract::{Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use hostline_voice::signature::secrets_match;

use crate::logs::LogEntry;
use crate::state::{AppState, ShutdownReason};

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub description: &'static str,
    pub editable: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub level: Option<String>,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/config", get(config))
        .route("/admin/logs", get(logs))
        .route("/admin/restart", post(restart))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.config.app.debug {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    let authorized = match (presented, state.config.server.admin_token.as_ref()) {
        (Some(presented), Some(expected)) => {
            !presented.is_empty() && secrets_match(presented, expected.expose_secret())
        }
        _ => false,
    };

    if !authorized {
        warn!(
            event_name = "system.admin.unauthorized",
            correlation_id = "admin",
            path = %request.uri().path(),
            "admin request rejected"
        );
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({"error": "Unauthorized"})),
        )
            .into_response();
    }

    next.run(request).await
}

pub async fn config(State(state): State<AppState>) -> Json<Vec<ConfigEntry>> {
    let config = &state.config;
    let entry = |key, value: String, description| ConfigEntry {
        key,
        value,
        description,
        editable: false,
    };

    Json(vec![
        entry("APP_NAME", config.app.name.clone(), "Application name"),
        entry("APP_VERSION", config.app.version.clone(), "Application version"),
        entry("DEBUG", config.app.debug.to_string(), "Debug mode"),
        entry("LOG_LEVEL", config.logging.level.clone(), "Logging level"),
        entry("APP_ENV", config.app.environment.as_str().to_owned(), "Deployment environment"),
        entry(
            "LLM_PROVIDER",
            state.agent.llm().provider().to_owned(),
            "Language model backend in use",
        ),
        entry("LLM_MODEL", state.agent.llm().model().to_owned(), "Language model name"),
    ])
}

pub async fn logs(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Json<Vec<LogEntry>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Json(state.logs.recent(limit, query.level.as_deref()))
}

pub async fn restart(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    info!(
        event_name = "system.admin.restart",
        correlation_id = "admin",
        "restart requested"
    );
    state.shutdown.trigger(ShutdownReason::Restart);
    (StatusCode::ACCEPTED, Json(json!({"message": "Restart initiated"})))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use secrecy::SecretString;
    use serde_json::Value;
    use tower::ServiceExt;

    use hostline_core::config::AppConfig;

    use crate::bootstrap::test_support::state_with;
    use crate::logs::LogEntry;
    use crate::routes::router;
    use crate::state::ShutdownReason;

    fn guarded_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.admin_token = Some(SecretString::from("s3cret".to_owned()));
        config
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_rejected() {
        let state = state_with(guarded_config()).await;

        let response = router(state.clone())
            .oneshot(Request::get("/admin/config").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );

        let (status, _) = send(
            router(state),
            Request::get("/admin/config")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn same_length_token_with_one_wrong_byte_is_rejected() {
        let state = state_with(guarded_config()).await;

        let (status, body) = send(
            router(state),
            Request::get("/admin/config")
                .header(header::AUTHORIZATION, "Bearer s3creT")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn config_lists_effective_settings() {
        let state = state_with(guarded_config()).await;

        let (status, body) = send(
            router(state),
            Request::get("/admin/config")
                .header(header::AUTHORIZATION, "Bearer s3cret")
                .body(Body::empty())
                .expect("request"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let keys: Vec<&str> =
            body.as_array().expect("list").iter().filter_map(|entry| entry["key"].as_str()).collect();
        assert_eq!(
            keys,
            ["APP_NAME", "APP_VERSION", "DEBUG", "LOG_LEVEL", "APP_ENV", "LLM_PROVIDER", "LLM_MODEL"]
        );
        assert_eq!(body[5]["value"], "mock");
        assert_eq!(body[0]["editable"], false);
    }

    #[tokio::test]
    async fn debug_mode_opens_logs_with_level_filter() {
        let mut config = AppConfig::default();
        config.app.debug = true;
        let state = state_with(config).await;
        for (level, message) in [("INFO", "one"), ("WARN", "two"), ("INFO", "three")] {
            state.logs.push(LogEntry {
                timestamp: "2026-06-10T09:30:00Z".to_owned(),
                level: level.to_owned(),
                message: message.to_owned(),
                context: serde_json::Map::new(),
            });
        }

        let (status, body) = send(
            router(state.clone()),
            Request::get("/admin/logs?level=warning").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["message"], "two");

        let (_, body) = send(
            router(state),
            Request::get("/admin/logs?limit=2").body(Body::empty()).expect("request"),
        )
        .await;
        let messages: Vec<&str> =
            body.as_array().expect("list").iter().filter_map(|entry| entry["message"].as_str()).collect();
        assert_eq!(messages, ["two", "three"]);
    }

    #[tokio::test]
    async fn restart_triggers_shutdown_with_restart_code() {
        let state = state_with(guarded_config()).await;

        let (status, body) = send(
            router(state.clone()),
            Request::post("/admin/restart")
                .header(header::AUTHORIZATION, "Bearer s3cret")
                .body(Body::empty())
                .expect("request"),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["message"], "Restart initiated");
        assert_eq!(state.shutdown.reason(), Some(ShutdownReason::Restart));
    }
}
