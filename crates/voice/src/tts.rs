use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::warn;

use crate::error::VoiceError;

pub const AUDIO_CONTENT_TYPE: &str = "audio/mp3";
pub const SYNTHESIS_ERROR_TEXT: &str = "I'm sorry, I encountered an error.";

const PLACEHOLDER_AUDIO: &[u8] = &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05];
const CHARS_PER_SECOND: f64 = 15.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub duration_seconds: f64,
    pub content_type: &'static str,
}

impl SynthesizedAudio {
    fn for_text(text: &str, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            duration_seconds: estimate_duration(text),
            content_type: AUDIO_CONTENT_TYPE,
        }
    }

    pub fn audio_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Rough speaking time: fifteen characters per second.
pub fn estimate_duration(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_SECOND
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str) -> SynthesizedAudio;
}

#[derive(Clone, Debug, Default)]
pub struct MockTextToSpeech;

#[async_trait]
impl TextToSpeech for MockTextToSpeech {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn synthesize(&self, text: &str) -> SynthesizedAudio {
        SynthesizedAudio::for_text(text, PLACEHOLDER_AUDIO.to_vec())
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiSpeechSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub voice: String,
    pub timeout: Duration,
}

pub struct OpenAiTextToSpeech {
    http: reqwest::Client,
    settings: OpenAiSpeechSettings,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

impl OpenAiTextToSpeech {
    pub fn new(settings: OpenAiSpeechSettings) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    async fn try_synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let url = format!("{}/audio/speech", self.settings.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(self.settings.api_key.expose_secret())
            .json(&SpeechRequest {
                model: &self.settings.model,
                voice: &self.settings.voice,
                input: text,
                response_format: "mp3",
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTextToSpeech {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> SynthesizedAudio {
        match self.try_synthesize(text).await {
            Ok(bytes) => SynthesizedAudio::for_text(text, bytes),
            Err(error) => {
                warn!(event_name = "system.voice.tts.failed", error = %error, "synthesis failed");
                SynthesizedAudio::for_text(SYNTHESIS_ERROR_TEXT, PLACEHOLDER_AUDIO.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::{
        estimate_duration, MockTextToSpeech, OpenAiSpeechSettings, OpenAiTextToSpeech,
        TextToSpeech, SYNTHESIS_ERROR_TEXT,
    };

    #[tokio::test]
    async fn mock_returns_placeholder_audio() {
        let audio = MockTextToSpeech.synthesize("Thirty chars of spoken text!!!").await;

        assert_eq!(audio.audio_base64(), "AAECAwQF");
        assert_eq!(audio.content_type, "audio/mp3");
        assert!((audio.duration_seconds - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn backend_failure_speaks_the_apology() {
        let tts = OpenAiTextToSpeech::new(OpenAiSpeechSettings {
            base_url: "http://127.0.0.1:9".to_owned(),
            api_key: SecretString::from("sk-test".to_owned()),
            model: "tts-1".to_owned(),
            voice: "alloy".to_owned(),
            timeout: Duration::from_millis(200),
        })
        .expect("client");

        let audio = tts.synthesize("Welcome to the restaurant").await;
        assert_eq!(audio.duration_seconds, estimate_duration(SYNTHESIS_ERROR_TEXT));
        assert_eq!(audio.audio_base64(), "AAECAwQF");
    }
}
