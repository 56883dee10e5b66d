//! Voice webhooks posted by Twilio.
//!
//! Every handler answers with TwiML (or a small JSON ack for status callbacks) and never lets
//! an internal failure reach the caller as an HTTP error: the worst case is the
//! "technical difficulties" message.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use hostline_agent::{AgentReply, SharedSession};
use hostline_core::config::TelephonyConfig;
use hostline_core::domain::call::{CallSid, CallStatus};
use hostline_voice::signature::{validate_signature, SIGNATURE_HEADER};
use hostline_voice::webhook::{
    call_sid_or_unknown, DtmfPayload, FallbackPayload, StatusPayload, TranscribePayload,
    VoicePayload,
};
use hostline_voice::Twiml;

use crate::error::ApiError;
use crate::state::AppState;

const MAX_WEBHOOK_BODY_BYTES: usize = 64 * 1024;
const DTMF_MENU: &str =
    "Press 1 for our hours and location. Press 2 to make a reservation. Press 0 to end the call.";
const DTMF_RESERVATION_REQUEST: &str = "I'd like to make a reservation.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/voice", post(voice))
        .route("/webhook/transcribe", post(transcribe))
        .route("/webhook/status", post(status))
        .route("/webhook/fallback", post(fallback))
        .route("/webhook/dtmf", post(dtmf))
}

pub struct TwimlResponse(pub Twiml);

impl IntoResponse for TwimlResponse {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/xml")], self.0.render()).into_response()
    }
}

/// Rejects webhook deliveries whose `X-Twilio-Signature` does not match.
pub async fn verify_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.enforces_webhook_signatures() {
        return next.run(request).await;
    }
    let Some(secret) = state.config.telephony.signing_secret() else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_WEBHOOK_BODY_BYTES).await else {
        return (StatusCode::PAYLOAD_TOO_LARGE, "Webhook body too large").into_response();
    };
    let params: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes).unwrap_or_default();
    let url = signed_url(&state.config.telephony, &parts);
    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if let Err(error) = validate_signature(secret.expose_secret(), &url, &params, signature) {
        warn!(
            event_name = "system.webhook.signature_rejected",
            correlation_id = "unknown",
            url = %url,
            error = %error,
            "webhook signature rejected"
        );
        return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// The URL Twilio signed: the configured public base, or what the proxy reports.
fn signed_url(telephony: &TelephonyConfig, parts: &Parts) -> String {
    let path = parts.uri.path_and_query().map_or("/", |value| value.as_str());
    if let Some(base) = telephony.public_base_url.as_deref() {
        return format!("{}{path}", base.trim_end_matches('/'));
    }

    let header_value = |name: &str| parts.headers.get(name).and_then(|value| value.to_str().ok());
    let scheme = header_value("x-forwarded-proto").unwrap_or("http");
    let host = header_value("x-forwarded-host")
        .or_else(|| header_value(header::HOST.as_str()))
        .unwrap_or("localhost");
    format!("{scheme}://{host}{path}")
}

pub async fn voice(State(state): State<AppState>, Form(payload): Form<VoicePayload>) -> TwimlResponse {
    let call_sid = call_sid_or_unknown(&payload.call_sid);
    info!(
        event_name = "system.webhook.voice",
        correlation_id = %call_sid,
        call_sid = %call_sid,
        caller = payload.from.as_deref().unwrap_or("unknown"),
        "incoming call"
    );

    match open_session(&state, &call_sid, payload.from, payload.to).await {
        Session::Live(_) => TwimlResponse(state.responses.welcome(state.agent.prompts().welcome())),
        Session::Closed => goodbye(&state),
        Session::Unavailable => TwimlResponse(state.responses.error(None)),
    }
}

pub async fn transcribe(
    State(state): State<AppState>,
    Form(payload): Form<TranscribePayload>,
) -> TwimlResponse {
    let call_sid = call_sid_or_unknown(&payload.call_sid);
    let handle = match open_session(&state, &call_sid, payload.from.clone(), None).await {
        Session::Live(handle) => handle,
        Session::Closed => return late_for_closed_call(&state, &call_sid),
        Session::Unavailable => return TwimlResponse(state.responses.error(None)),
    };
    let mut session = handle.lock().await;
    // The status callback may have closed the call while this delivery waited on the lock.
    if state.conversations.is_closed(&call_sid).await {
        return late_for_closed_call(&state, &call_sid);
    }

    if let Some(reply) = payload.recording_sid.as_deref().and_then(|sid| session.replay(sid)) {
        info!(
            event_name = "system.webhook.transcribe.replayed",
            correlation_id = %call_sid,
            recording_sid = payload.recording_sid.as_deref().unwrap_or_default(),
            "recording already answered; replaying reply"
        );
        return render_reply(&state, reply);
    }

    let Some(recording_url) = payload.recording_url.as_deref().filter(|url| !url.trim().is_empty())
    else {
        warn!(
            event_name = "system.webhook.transcribe.no_recording",
            correlation_id = %call_sid,
            "transcribe webhook without a recording url"
        );
        return TwimlResponse(state.responses.fallback(state.agent.prompts().fallback()));
    };

    let transcript = state.speech_to_text.transcribe(recording_url).await;
    info!(
        event_name = "system.webhook.transcribe",
        correlation_id = %call_sid,
        call_sid = %call_sid,
        transcript = %transcript,
        "caller utterance transcribed"
    );
    if transcript.trim().is_empty() {
        return TwimlResponse(state.responses.fallback(state.agent.prompts().fallback()));
    }

    let reply = state.agent.respond(&mut session, &transcript).await;
    if let Some(recording_sid) = payload.recording_sid {
        session.remember(recording_sid, reply.clone());
    }
    render_reply(&state, &reply)
}

pub async fn status(
    State(state): State<AppState>,
    Form(payload): Form<StatusPayload>,
) -> Result<Json<Value>, ApiError> {
    let call_sid = call_sid_or_unknown(&payload.call_sid);
    let provider_status = payload.provider_status();
    info!(
        event_name = "system.webhook.status",
        correlation_id = %call_sid,
        call_sid = %call_sid,
        call_status = %payload.call_status,
        duration = ?payload.duration_secs(),
        "call status update"
    );

    match provider_status {
        Some(provider_status) if provider_status.is_terminal() => {
            // The session stays registered until its record is stored, so a redelivered
            // status callback can retry a failed export.
            if let Some(handle) = state.conversations.get(&call_sid).await {
                let mut session = handle.lock().await;
                let record = session.finish(
                    CallStatus::from(provider_status),
                    Utc::now(),
                    payload.duration_secs(),
                );
                state
                    .exporter
                    .export(&record)
                    .await
                    .map_err(|err| ApiError::new(err, call_sid.as_str(), state.config.app.debug))?;
                state.conversations.close(&call_sid).await;
            } else {
                state.conversations.close(&call_sid).await;
            }
        }
        Some(_) => {}
        None => warn!(
            event_name = "system.webhook.status.unknown",
            correlation_id = %call_sid,
            call_status = %payload.call_status,
            "unrecognized call status"
        ),
    }

    Ok(Json(json!({"status": "received"})))
}

pub async fn fallback(
    State(state): State<AppState>,
    Form(payload): Form<FallbackPayload>,
) -> TwimlResponse {
    let call_sid = call_sid_or_unknown(&payload.call_sid);
    error!(
        event_name = "system.webhook.fallback",
        correlation_id = %call_sid,
        call_sid = %call_sid,
        error_code = payload.error_code.as_deref().unwrap_or("unknown"),
        error_url = payload.error_url.as_deref().unwrap_or_default(),
        "telephony provider reported a call error"
    );
    TwimlResponse(state.responses.error(None))
}

pub async fn dtmf(State(state): State<AppState>, Form(payload): Form<DtmfPayload>) -> TwimlResponse {
    let call_sid = call_sid_or_unknown(&payload.call_sid);
    let digits = payload.digits.as_deref().map(str::trim).unwrap_or_default();
    info!(
        event_name = "system.webhook.dtmf",
        correlation_id = %call_sid,
        digits,
        "keypad input received"
    );

    let prompts = state.agent.prompts();
    match digits {
        "1" => {
            let profile = prompts.profile();
            let message = format!(
                "We're open daily from {}. We're located at {}. Is there anything else I can help you with?",
                profile.hours.label_12h(),
                profile.address
            );
            TwimlResponse(state.responses.agent_response(&message))
        }
        "2" => {
            let handle = match open_session(&state, &call_sid, None, None).await {
                Session::Live(handle) => handle,
                Session::Closed => return late_for_closed_call(&state, &call_sid),
                Session::Unavailable => return TwimlResponse(state.responses.error(None)),
            };
            let mut session = handle.lock().await;
            let reply = state.agent.respond(&mut session, DTMF_RESERVATION_REQUEST).await;
            render_reply(&state, &reply)
        }
        "0" | "#" => goodbye(&state),
        _ => TwimlResponse(state.responses.gather_digits(DTMF_MENU, 1, "#")),
    }
}

fn render_reply(state: &AppState, reply: &AgentReply) -> TwimlResponse {
    if reply.ends_call {
        TwimlResponse(state.responses.goodbye(&reply.text))
    } else {
        TwimlResponse(state.responses.agent_response(&reply.text))
    }
}

fn goodbye(state: &AppState) -> TwimlResponse {
    TwimlResponse(state.responses.goodbye(state.agent.prompts().goodbye()))
}

fn late_for_closed_call(state: &AppState, call_sid: &CallSid) -> TwimlResponse {
    info!(
        event_name = "system.webhook.call_closed",
        correlation_id = %call_sid,
        call_sid = %call_sid,
        "webhook for an ended call; not reopening the session"
    );
    goodbye(state)
}

enum Session {
    Live(SharedSession),
    /// The call already ended; late deliveries must not start a new conversation.
    Closed,
    Unavailable,
}

/// Returns the live session, opening one when the call is not known yet.
async fn open_session(
    state: &AppState,
    call_sid: &CallSid,
    caller: Option<String>,
    callee: Option<String>,
) -> Session {
    if let Some(existing) = state.conversations.get(call_sid).await {
        return Session::Live(existing);
    }
    if state.conversations.is_closed(call_sid).await {
        return Session::Closed;
    }

    match state.agent.open_session(call_sid.clone(), caller, callee) {
        Ok(session) => match state.conversations.open(session).await {
            Some((handle, created)) => {
                if created {
                    info!(
                        event_name = "system.calls.session_opened",
                        correlation_id = %call_sid,
                        call_sid = %call_sid,
                        "call session opened"
                    );
                }
                Session::Live(handle)
            }
            None => Session::Closed,
        },
        Err(err) => {
            error!(
                event_name = "system.calls.session_failed",
                correlation_id = %call_sid,
                error = %format!("{err:#}"),
                "could not open call session"
            );
            Session::Unavailable
        }
    }
}
