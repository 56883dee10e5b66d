//! Telephony plumbing for the phone assistant.
//!
//! - **TwiML** (`twiml`) - typed verbs and the canned call-flow replies
//! - **Signatures** (`signature`) - `X-Twilio-Signature` HMAC-SHA1 validation
//! - **Webhooks** (`webhook`) - form payloads Twilio posts to the server
//! - **Speech** (`stt`, `tts`) - Whisper / OpenAI speech backends and deterministic mocks
//! - **REST** (`telephony`) - account lookup and SMS confirmations
//!
//! ```text
//! Twilio ─form─► webhook payloads ─► server ─► agent runtime
//!    ▲                                   │
//!    └──────────── TwiML ◄───────────────┘
//! ```

pub mod error;
pub mod signature;
pub mod stt;
pub mod telephony;
pub mod tts;
pub mod twiml;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use hostline_core::config::{AppConfig, TtsProvider};

pub use error::VoiceError;
pub use stt::{MockSpeechToText, SpeechToText, WhisperSettings, WhisperSpeechToText};
pub use telephony::TwilioClient;
pub use tts::{
    MockTextToSpeech, OpenAiSpeechSettings, OpenAiTextToSpeech, SynthesizedAudio, TextToSpeech,
};
pub use twiml::{clean_for_speech, Twiml, Verb, VoiceResponses};

/// Picks the recognizer for this configuration; the keyword mock when no live backend applies.
pub fn speech_to_text(config: &AppConfig) -> Result<Arc<dyn SpeechToText>, VoiceError> {
    if config.stt_uses_mock() {
        return Ok(Arc::new(MockSpeechToText));
    }
    let api_key = config.llm.api_key.clone().ok_or(VoiceError::Unconfigured("llm.api_key"))?;

    let whisper = WhisperSpeechToText::new(WhisperSettings {
        base_url: config.llm.base_url.clone(),
        api_key,
        model: config.speech.stt_model.clone(),
        timeout: Duration::from_secs(config.llm.timeout_secs),
        recording_credentials: config.telephony.rest_credentials(),
    })?;
    Ok(Arc::new(whisper))
}

pub fn text_to_speech(config: &AppConfig) -> Result<Arc<dyn TextToSpeech>, VoiceError> {
    match (config.speech.tts_provider, config.llm.api_key.clone()) {
        (TtsProvider::OpenAi, Some(api_key)) if config.llm.has_api_key() => {
            let tts = OpenAiTextToSpeech::new(OpenAiSpeechSettings {
                base_url: config.llm.base_url.clone(),
                api_key,
                model: config.speech.tts_model.clone(),
                voice: config.speech.tts_voice.clone(),
                timeout: Duration::from_secs(config.llm.timeout_secs),
            })?;
            Ok(Arc::new(tts))
        }
        (TtsProvider::OpenAi, _) => Err(VoiceError::Unconfigured("llm.api_key")),
        (TtsProvider::Mock, _) => Ok(Arc::new(MockTextToSpeech)),
    }
}
