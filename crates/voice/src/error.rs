use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode upstream response: {0}")]
    Decode(String),
    #[error("{0} is not configured")]
    Unconfigured(&'static str),
    #[error("webhook signature rejected: {0}")]
    Signature(String),
}

impl VoiceError {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Status { status, body }
    }
}
