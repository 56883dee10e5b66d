use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSid(pub String);

impl CallSid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallSid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Call progress as reported by the telephony provider's status callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderCallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl ProviderCallStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" | "initiated" => Some(Self::Queued),
            "ringing" => Some(Self::Ringing),
            "in-progress" | "in_progress" | "answered" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "busy" => Some(Self::Busy),
            "failed" => Some(Self::Failed),
            "no-answer" | "no_answer" => Some(Self::NoAnswer),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// A terminal status ends the conversation session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Busy | Self::Failed | Self::NoAnswer | Self::Canceled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    InProgress,
    Completed,
    Failed,
    Transferring,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Transferring => "transferring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initiated" => Some(Self::Initiated),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "transferring" => Some(Self::Transferring),
            _ => None,
        }
    }
}

impl From<ProviderCallStatus> for CallStatus {
    fn from(value: ProviderCallStatus) -> Self {
        match value {
            ProviderCallStatus::Queued | ProviderCallStatus::Ringing => Self::Initiated,
            ProviderCallStatus::InProgress => Self::InProgress,
            ProviderCallStatus::Completed => Self::Completed,
            ProviderCallStatus::Busy
            | ProviderCallStatus::Failed
            | ProviderCallStatus::NoAnswer
            | ProviderCallStatus::Canceled => Self::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// One tool invocation made by the agent during a call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub tool_name: String,
    pub arguments: Value,
    pub result: Value,
    pub success: bool,
    pub error_message: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_sid: CallSid,
    pub caller: Option<String>,
    pub callee: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub status: CallStatus,
    pub transcript: Vec<ConversationTurn>,
    pub actions: Vec<AgentAction>,
}

impl CallRecord {
    /// Closes the record. The provider's reported duration wins over wall-clock time.
    pub fn finish(
        &mut self,
        status: CallStatus,
        ended_at: DateTime<Utc>,
        provider_duration_secs: Option<i64>,
    ) {
        let measured = (ended_at - self.started_at).num_seconds().max(0);
        self.status = status;
        self.ended_at = Some(ended_at);
        self.duration_seconds = Some(provider_duration_secs.unwrap_or(measured));
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{CallRecord, CallSid, CallStatus, ProviderCallStatus};

    #[test]
    fn provider_statuses_map_onto_record_statuses() {
        let terminal = ["completed", "failed", "busy", "no-answer", "canceled"];
        for raw in terminal {
            let status = ProviderCallStatus::parse(raw).expect("known status");
            assert!(status.is_terminal(), "{raw} should be terminal");
        }

        assert!(!ProviderCallStatus::InProgress.is_terminal());
        assert_eq!(CallStatus::from(ProviderCallStatus::NoAnswer), CallStatus::Failed);
        assert_eq!(CallStatus::from(ProviderCallStatus::Ringing), CallStatus::Initiated);
        assert_eq!(ProviderCallStatus::parse("teleported"), None);
    }

    #[test]
    fn finish_prefers_provider_duration() {
        let started_at = Utc::now() - Duration::seconds(90);
        let mut record = CallRecord {
            call_sid: CallSid("CA1".to_string()),
            caller: Some("+15550100".to_string()),
            callee: None,
            started_at,
            ended_at: None,
            duration_seconds: None,
            status: CallStatus::InProgress,
            transcript: Vec::new(),
            actions: Vec::new(),
        };

        record.finish(CallStatus::Completed, started_at + Duration::seconds(90), Some(87));
        assert_eq!(record.duration_seconds, Some(87));

        record.finish(CallStatus::Completed, started_at + Duration::seconds(90), None);
        assert_eq!(record.duration_seconds, Some(90));
    }
}
