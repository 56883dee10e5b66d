use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use hostline_agent::{ChatMessage, CompletionRequest};

use crate::state::AppState;

const LLM_PROBE_PROMPT: &str = "Say hello in one short sentence.";

#[derive(Debug, Deserialize)]
pub struct TtsForm {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SttForm {
    pub audio_url: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/test/tts", post(test_tts))
        .route("/test/stt", post(test_stt))
        .route("/test-openai", get(test_openai))
        .route("/test-twilio", get(test_twilio))
}

pub async fn test_tts(State(state): State<AppState>, Form(form): Form<TtsForm>) -> Json<Value> {
    let audio = state.text_to_speech.synthesize(&form.text).await;
    Json(json!({
        "audio_base64": audio.audio_base64(),
        "duration": audio.duration_seconds,
        "content_type": audio.content_type,
    }))
}

pub async fn test_stt(State(state): State<AppState>, Form(form): Form<SttForm>) -> Json<Value> {
    let transcription = state.speech_to_text.transcribe(&form.audio_url).await;
    Json(json!({ "transcription": transcription }))
}

pub async fn test_openai(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let llm = state.agent.llm();
    let correlation_id = Uuid::new_v4().to_string();
    let request = CompletionRequest {
        messages: vec![ChatMessage::user(LLM_PROBE_PROMPT)],
        ..CompletionRequest::default()
    };

    match llm.complete(request).await {
        Ok(completion) => {
            info!(
                event_name = "system.diagnostics.llm_ok",
                correlation_id = %correlation_id,
                provider = llm.provider(),
                "llm probe succeeded"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "provider": llm.provider(),
                    "model": llm.model(),
                    "response": completion.content.unwrap_or_default(),
                })),
            )
        }
        Err(err) => {
            error!(
                event_name = "system.diagnostics.llm_failed",
                correlation_id = %correlation_id,
                provider = llm.provider(),
                error = %format!("{err:#}"),
                "llm probe failed"
            );
            (StatusCode::BAD_GATEWAY, Json(json!({"status": "error", "error": format!("{err:#}")})))
        }
    }
}

pub async fn test_twilio(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let correlation_id = Uuid::new_v4().to_string();
    let Some(client) = state.telephony.as_ref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unconfigured"})));
    };

    match client.fetch_account().await {
        Ok(account) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "account_sid": account.sid,
                "friendly_name": account.friendly_name,
                "account_status": account.status,
            })),
        ),
        Err(err) => {
            error!(
                event_name = "system.diagnostics.twilio_failed",
                correlation_id = %correlation_id,
                error = %err,
                "telephony account lookup failed"
            );
            (StatusCode::BAD_GATEWAY, Json(json!({"status": "error", "error": err.to_string()})))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::bootstrap::test_support::state;
    use crate::routes::router;

    async fn call(request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state().await).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    fn form(uri: &str, body: &'static str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn tts_probe_returns_encoded_audio() {
        let (status, body) = call(form("/test/tts", "text=Hello+there")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!body["audio_base64"].as_str().unwrap_or_default().is_empty());
        assert!(body["duration"].as_f64().is_some());
        assert_eq!(body["content_type"], "audio/mp3");
    }

    #[tokio::test]
    async fn stt_probe_uses_the_configured_backend() {
        let (status, body) =
            call(form("/test/stt", "audio_url=https%3A%2F%2Fexample.com%2Fmenu.wav")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transcription"], "What's on your menu?");
    }

    #[tokio::test]
    async fn llm_probe_reports_mock_provider() {
        let (status, body) =
            call(Request::get("/test-openai").body(Body::empty()).expect("request")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "mock");
        assert!(!body["response"].as_str().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn twilio_probe_without_credentials_is_unconfigured() {
        let (status, body) =
            call(Request::get("/test-twilio").body(Body::empty()).expect("request")).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unconfigured");
    }
}
