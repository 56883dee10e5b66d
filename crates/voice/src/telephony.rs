use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;

use hostline_core::config::TelephonyConfig;

use crate::error::VoiceError;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub sid: String,
    pub friendly_name: String,
    pub status: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SmsReceipt {
    pub sid: String,
    pub status: String,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "Body")]
    body: &'a str,
}

/// Minimal Twilio REST client: account lookup and outbound SMS.
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    base_url: String,
    account_sid: String,
    username: String,
    password: SecretString,
}

impl TwilioClient {
    pub fn new(
        account_sid: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("hostline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: TWILIO_API_BASE.to_owned(),
            account_sid: account_sid.into(),
            username: username.into(),
            password,
        })
    }

    /// Returns `Ok(None)` when no REST credentials are configured.
    pub fn from_config(config: &TelephonyConfig) -> Result<Option<Self>, VoiceError> {
        let Some(account_sid) = config.account_sid.clone() else {
            return Ok(None);
        };
        let Some((username, password)) = config.rest_credentials() else {
            return Ok(None);
        };
        Self::new(account_sid, username, password).map(Some)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    fn account_url(&self, suffix: &str) -> String {
        format!("{}/Accounts/{}{}", self.base_url.trim_end_matches('/'), self.account_sid, suffix)
    }

    pub async fn fetch_account(&self) -> Result<AccountInfo, VoiceError> {
        let response = self
            .http
            .get(self.account_url(".json"))
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(response).await);
        }
        response.json().await.map_err(|error| VoiceError::Decode(error.to_string()))
    }

    pub async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<SmsReceipt, VoiceError> {
        let response = self
            .http
            .post(self.account_url("/Messages.json"))
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .form(&OutboundMessage { to, from, body })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(response).await);
        }

        let receipt: SmsReceipt =
            response.json().await.map_err(|error| VoiceError::Decode(error.to_string()))?;
        info!(
            event_name = "system.voice.sms.sent",
            message_sid = %receipt.sid,
            status = %receipt.status,
            "sms queued"
        );
        Ok(receipt)
    }
}
