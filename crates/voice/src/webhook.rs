//! Form payloads Twilio posts to the voice webhooks.

use serde::Deserialize;

use hostline_core::domain::call::{CallSid, ProviderCallStatus};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct VoicePayload {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TranscribePayload {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "RecordingUrl", default)]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingSid", default)]
    pub recording_sid: Option<String>,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct StatusPayload {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: String,
    #[serde(rename = "CallDuration", default)]
    pub call_duration: Option<String>,
}

impl StatusPayload {
    pub fn provider_status(&self) -> Option<ProviderCallStatus> {
        ProviderCallStatus::parse(&self.call_status)
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.call_duration.as_deref().and_then(|raw| raw.trim().parse().ok())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct FallbackPayload {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "ErrorUrl", default)]
    pub error_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct DtmfPayload {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "Digits", default)]
    pub digits: Option<String>,
}

/// Falls back to a placeholder so a malformed delivery is still traceable in logs.
pub fn call_sid_or_unknown(raw: &str) -> CallSid {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        CallSid("unknown-call".to_owned())
    } else {
        CallSid(trimmed.to_owned())
    }
}
