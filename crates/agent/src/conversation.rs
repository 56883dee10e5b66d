//! Per-call conversation state.
//!
//! One [`CallSession`] lives in the [`ConversationStore`] for every active `CallSid`. Webhook
//! deliveries for the same call serialize on the session mutex; the store lock is only held
//! long enough to clone the session handle.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use hostline_core::domain::call::{
    AgentAction, CallRecord, CallSid, CallStatus, ConversationTurn, Role,
};

use crate::llm::ChatMessage;
use crate::runtime::AgentReply;

/// Ordered chat history for one caller, starting with the system prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    conversation_id: CallSid,
    user_id: Option<String>,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(
        conversation_id: CallSid,
        user_id: Option<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self { conversation_id, user_id, messages: vec![ChatMessage::system(system_prompt)] }
    }

    pub fn conversation_id(&self) -> &CallSid {
        &self.conversation_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops every message, system prompt included.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drops everything except system messages.
    pub fn reset(&mut self) {
        self.messages.retain(|message| message.role == Role::System);
    }

    pub(crate) fn messages_mut(&mut self) -> &mut Vec<ChatMessage> {
        &mut self.messages
    }
}

#[derive(Clone, Debug)]
struct ProcessedRecording {
    recording_sid: String,
    reply: AgentReply,
}

#[derive(Debug)]
pub struct CallSession {
    pub record: CallRecord,
    pub conversation: Conversation,
    last_activity: DateTime<Utc>,
    last_recording: Option<ProcessedRecording>,
}

impl CallSession {
    pub fn new(
        call_sid: CallSid,
        caller: Option<String>,
        callee: Option<String>,
        system_prompt: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let conversation = Conversation::new(call_sid.clone(), caller.clone(), system_prompt);
        let record = CallRecord {
            call_sid,
            caller,
            callee,
            started_at: now,
            ended_at: None,
            duration_seconds: None,
            status: CallStatus::InProgress,
            transcript: Vec::new(),
            actions: Vec::new(),
        };
        Self { record, conversation, last_activity: now, last_recording: None }
    }

    pub fn call_sid(&self) -> &CallSid {
        &self.record.call_sid
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    pub fn is_idle(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_activity >= ttl
    }

    /// The stored reply if this recording was already answered.
    pub fn replay(&self, recording_sid: &str) -> Option<&AgentReply> {
        self.last_recording
            .as_ref()
            .filter(|processed| processed.recording_sid == recording_sid)
            .map(|processed| &processed.reply)
    }

    pub fn remember(&mut self, recording_sid: impl Into<String>, reply: AgentReply) {
        self.last_recording = Some(ProcessedRecording { recording_sid: recording_sid.into(), reply });
    }

    pub fn record_turn(&mut self, role: Role, content: impl Into<String>, at: DateTime<Utc>) {
        self.record.transcript.push(ConversationTurn { role, content: content.into(), at });
    }

    pub fn record_actions(&mut self, actions: &[AgentAction]) {
        self.record.actions.extend_from_slice(actions);
    }

    /// Closes the call and hands back the record for export.
    pub fn finish(
        &mut self,
        status: CallStatus,
        ended_at: DateTime<Utc>,
        provider_duration_secs: Option<i64>,
    ) -> CallRecord {
        self.record.finish(status, ended_at, provider_duration_secs);
        self.record.clone()
    }
}

pub type SharedSession = Arc<Mutex<CallSession>>;

/// How many ended calls are remembered so late webhooks cannot reopen them.
const CLOSED_CALL_MEMORY: usize = 1024;

#[derive(Default)]
struct StoreState {
    sessions: HashMap<CallSid, SharedSession>,
    closed: HashSet<CallSid>,
    closed_order: VecDeque<CallSid>,
}

impl StoreState {
    fn mark_closed(&mut self, call_sid: &CallSid) {
        if !self.closed.insert(call_sid.clone()) {
            return;
        }
        self.closed_order.push_back(call_sid.clone());
        while self.closed_order.len() > CLOSED_CALL_MEMORY {
            if let Some(evicted) = self.closed_order.pop_front() {
                self.closed.remove(&evicted);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct ConversationStore {
    state: Arc<RwLock<StoreState>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `session` unless the call is already known. Returns the live handle and
    /// whether it was newly created, so webhook redeliveries keep the existing state.
    /// Returns `None` for a call that was already closed.
    pub async fn open(&self, session: CallSession) -> Option<(SharedSession, bool)> {
        let call_sid = session.call_sid().clone();
        let mut state = self.state.write().await;
        if state.closed.contains(&call_sid) {
            return None;
        }
        if let Some(existing) = state.sessions.get(&call_sid) {
            return Some((existing.clone(), false));
        }
        let handle = Arc::new(Mutex::new(session));
        state.sessions.insert(call_sid, handle.clone());
        Some((handle, true))
    }

    pub async fn get(&self, call_sid: &CallSid) -> Option<SharedSession> {
        self.state.read().await.sessions.get(call_sid).cloned()
    }

    /// Removes the session and refuses to open the call again.
    pub async fn close(&self, call_sid: &CallSid) -> Option<SharedSession> {
        let mut state = self.state.write().await;
        state.mark_closed(call_sid);
        state.sessions.remove(call_sid)
    }

    pub async fn is_closed(&self, call_sid: &CallSid) -> bool {
        self.state.read().await.closed.contains(call_sid)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sessions.is_empty()
    }

    /// Removes sessions idle for at least `ttl`. Sessions busy with a webhook are skipped
    /// and reconsidered on the next sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<SharedSession> {
        let mut state = self.state.write().await;
        let expired: Vec<CallSid> = state
            .sessions
            .iter()
            .filter(|(_, handle)| {
                handle.try_lock().map(|session| session.is_idle(now, ttl)).unwrap_or(false)
            })
            .map(|(call_sid, _)| call_sid.clone())
            .collect();

        expired
            .iter()
            .filter_map(|call_sid| {
                state.mark_closed(call_sid);
                state.sessions.remove(call_sid)
            })
            .collect()
    }

    /// Empties the store, e.g. on shutdown.
    pub async fn drain(&self) -> Vec<SharedSession> {
        self.state.write().await.sessions.drain().map(|(_, handle)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use hostline_core::domain::call::{CallSid, CallStatus, Role};

    use super::{CallSession, Conversation, ConversationStore};
    use crate::llm::ChatMessage;
    use crate::runtime::AgentReply;

    fn session(sid: &str, minute: u32) -> CallSession {
        let now = Utc.with_ymd_and_hms(2026, 6, 10, 18, minute, 0).single().expect("instant");
        CallSession::new(
            CallSid(sid.to_owned()),
            Some("+15550001111".to_owned()),
            Some("+15551234567".to_owned()),
            "system prompt",
            now,
        )
    }

    #[test]
    fn reset_keeps_only_the_system_prompt() {
        let mut conversation =
            Conversation::new(CallSid("CA1".to_owned()), Some("+1555".to_owned()), "sys");
        conversation.add_message(ChatMessage::user("hello"));
        conversation.add_message(ChatMessage::assistant("hi there"));
        assert_eq!(conversation.len(), 3);

        conversation.reset();
        assert_eq!(conversation.history(), &[ChatMessage::system("sys")]);

        conversation.clear();
        assert!(conversation.is_empty());
        assert_eq!(conversation.user_id(), Some("+1555"));
    }

    #[test]
    fn replay_matches_only_the_last_recording() {
        let mut session = session("CA1", 0);
        let reply = AgentReply { text: "We open at 11.".to_owned(), actions: Vec::new(), ends_call: false };
        session.remember("RE1", reply.clone());

        assert_eq!(session.replay("RE1"), Some(&reply));
        assert_eq!(session.replay("RE2"), None);
    }

    #[test]
    fn finish_prefers_provider_duration() {
        let mut session = session("CA1", 0);
        session.record_turn(Role::User, "hello", session.last_activity());
        let ended = session.last_activity() + Duration::seconds(90);

        let record = session.finish(CallStatus::Completed, ended, Some(87));
        assert_eq!(record.duration_seconds, Some(87));
        assert_eq!(record.status, CallStatus::Completed);
        assert_eq!(record.transcript.len(), 1);
    }

    #[tokio::test]
    async fn open_is_idempotent_per_call() {
        let store = ConversationStore::new();
        let (first, created) = store.open(session("CA1", 0)).await.expect("open");
        assert!(created);
        first.lock().await.conversation.add_message(ChatMessage::user("hello"));

        let (second, created) = store.open(session("CA1", 5)).await.expect("open");
        assert!(!created);
        assert_eq!(second.lock().await.conversation.len(), 2);
        assert_eq!(store.len().await, 1);

        assert!(store.close(&CallSid("CA1".to_owned())).await.is_some());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_removes_idle_sessions_and_skips_busy_ones() {
        let store = ConversationStore::new();
        store.open(session("CA-old", 0)).await;
        let (busy, _) = store.open(session("CA-busy", 0)).await.expect("open");
        store.open(session("CA-fresh", 50)).await;

        let now = Utc.with_ymd_and_hms(2026, 6, 10, 19, 0, 0).single().expect("instant");
        let guard = busy.lock().await;
        let swept = store.sweep_expired(now, Duration::minutes(30)).await;
        drop(guard);

        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].lock().await.call_sid().as_str(), "CA-old");
        assert!(store.get(&CallSid("CA-busy".to_owned())).await.is_some());
        assert!(store.get(&CallSid("CA-fresh".to_owned())).await.is_some());
        assert!(store.is_closed(&CallSid("CA-old".to_owned())).await);
        assert!(!store.is_closed(&CallSid("CA-busy".to_owned())).await);

        assert_eq!(store.drain().await.len(), 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn closed_calls_cannot_be_reopened() {
        let store = ConversationStore::new();
        store.open(session("CA-done", 0)).await.expect("open");

        assert!(store.close(&CallSid("CA-done".to_owned())).await.is_some());
        assert!(store.is_closed(&CallSid("CA-done".to_owned())).await);
        assert!(store.open(session("CA-done", 5)).await.is_none());
        assert!(store.is_empty().await);

        store.close(&CallSid("CA-never-opened".to_owned())).await;
        assert!(store.open(session("CA-never-opened", 0)).await.is_none());
    }

    #[tokio::test]
    async fn closed_call_memory_is_bounded() {
        let store = ConversationStore::new();
        for index in 0..=super::CLOSED_CALL_MEMORY {
            store.close(&CallSid(format!("CA{index}"))).await;
        }

        assert!(!store.is_closed(&CallSid("CA0".to_owned())).await);
        assert!(store.is_closed(&CallSid("CA1".to_owned())).await);
        assert!(store.open(session("CA0", 0)).await.is_some());
    }
}
