use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::VoiceError;

pub const UNINTELLIGIBLE: &str = "I couldn't understand what was said.";

#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &'static str;

    /// Never fails: backend errors come back as [`UNINTELLIGIBLE`].
    async fn transcribe(&self, recording_url: &str) -> String;
}

/// Deterministic transcripts chosen by keywords in the recording URL.
#[derive(Clone, Debug, Default)]
pub struct MockSpeechToText;

const MOCK_RULES: &[(&[&str], &str)] = &[
    (&["menu"], "What's on your menu?"),
    (&["special"], "Do you have any specials today?"),
    (
        &["reservation", "book", "table"],
        "I'd like to make a reservation for 4 people tomorrow at 7pm.",
    ),
    (&["vegetarian"], "Do you have vegetarian options?"),
    (&["vegan"], "I'm looking for vegan dishes."),
    (&["gluten"], "Do you have gluten-free options?"),
    (&["chicken"], "Do you have any chicken dishes?"),
    (&["spicy"], "How spicy is your food?"),
    (&["hour", "open"], "What are your opening hours?"),
    (&["location", "address"], "Where are you located?"),
    (&["parking"], "Do you have parking available?"),
    (&["bye", "thank", "goodbye"], "Thank you, goodbye!"),
];

const MOCK_DEFAULT: &str = "Hello, I'm interested in learning more about your restaurant.";

impl MockSpeechToText {
    pub fn transcript_for(recording_url: &str) -> &'static str {
        let lowered = recording_url.to_lowercase();
        MOCK_RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|keyword| lowered.contains(keyword)))
            .map(|(_, transcript)| *transcript)
            .unwrap_or(MOCK_DEFAULT)
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn transcribe(&self, recording_url: &str) -> String {
        Self::transcript_for(recording_url).to_owned()
    }
}

#[derive(Clone, Debug)]
pub struct WhisperSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub timeout: Duration,
    /// Basic-auth pair for downloading protected recordings.
    pub recording_credentials: Option<(String, SecretString)>,
}

pub struct WhisperSpeechToText {
    http: reqwest::Client,
    settings: WhisperSettings,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperSpeechToText {
    pub fn new(settings: WhisperSettings) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    async fn download(&self, recording_url: &str) -> Result<Vec<u8>, VoiceError> {
        let mut request = self.http.get(recording_url);
        if let Some((username, password)) = &self.settings.recording_credentials {
            request = request.basic_auth(username, Some(password.expose_secret()));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn try_transcribe(&self, recording_url: &str) -> Result<String, VoiceError> {
        let audio = self.download(recording_url).await?;
        let part = Part::bytes(audio)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|error| VoiceError::Decode(error.to_string()))?;
        let form = Form::new().text("model", self.settings.model.clone()).part("file", part);

        let url = format!("{}/audio/transcriptions", self.settings.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(self.settings.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(response).await);
        }

        let body: TranscriptionResponse =
            response.json().await.map_err(|error| VoiceError::Decode(error.to_string()))?;
        Ok(body.text.trim().to_owned())
    }
}

#[async_trait]
impl SpeechToText for WhisperSpeechToText {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn transcribe(&self, recording_url: &str) -> String {
        match self.try_transcribe(recording_url).await {
            Ok(text) => {
                info!(
                    event_name = "system.voice.stt.transcribed",
                    chars = text.chars().count(),
                    "recording transcribed"
                );
                text
            }
            Err(error) => {
                warn!(
                    event_name = "system.voice.stt.failed",
                    error = %error,
                    "transcription failed"
                );
                UNINTELLIGIBLE.to_owned()
            }
        }
    }
}
