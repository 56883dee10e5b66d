use std::sync::{Arc, Mutex};
use std::time::Instant;

use sysinfo::System;
use tokio::sync::watch;

use hostline_agent::{AgentRuntime, ConversationStore};
use hostline_core::config::AppConfig;
use hostline_db::DbPool;
use hostline_voice::{SpeechToText, TextToSpeech, TwilioClient, VoiceResponses};

use crate::export::CallExporter;
use crate::logs::LogBuffer;

/// Exit status asking the supervisor to start the process again.
pub const RESTART_EXIT_CODE: u8 = 75;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    Restart,
}

impl ShutdownReason {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Signal => 0,
            Self::Restart => RESTART_EXIT_CODE,
        }
    }
}

/// Broadcast latch: the first trigger wins and every subscriber sees it.
#[derive(Clone, Debug)]
pub struct Shutdown {
    sender: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender: Arc::new(sender) }
    }
}

impl Shutdown {
    pub fn trigger(&self, reason: ShutdownReason) {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ShutdownReason>> {
        self.sender.subscribe()
    }

    /// Resolves once any trigger fires.
    pub async fn triggered(&self) -> ShutdownReason {
        let mut receiver = self.subscribe();
        let reason = match receiver.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ShutdownReason::Signal),
            Err(_) => ShutdownReason::Signal,
        };
        reason
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub agent: Arc<AgentRuntime>,
    pub conversations: ConversationStore,
    pub speech_to_text: Arc<dyn SpeechToText>,
    pub text_to_speech: Arc<dyn TextToSpeech>,
    pub responses: VoiceResponses,
    pub telephony: Option<TwilioClient>,
    pub exporter: CallExporter,
    pub logs: LogBuffer,
    pub shutdown: Shutdown,
    pub started_at: Instant,
    pub system: Arc<Mutex<System>>,
}

#[cfg(test)]
mod tests {
    use super::{Shutdown, ShutdownReason};

    #[tokio::test]
    async fn first_trigger_wins() {
        let shutdown = Shutdown::default();
        assert_eq!(shutdown.reason(), None);

        shutdown.trigger(ShutdownReason::Restart);
        shutdown.trigger(ShutdownReason::Signal);

        assert_eq!(shutdown.triggered().await, ShutdownReason::Restart);
        assert_eq!(shutdown.reason().map(ShutdownReason::exit_code), Some(75));
    }
}
