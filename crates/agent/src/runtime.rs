use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use hostline_core::domain::call::{AgentAction, CallSid, Role};

use crate::conversation::CallSession;
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient, ToolChoice};
use crate::prompts::PromptCatalog;
use crate::tools::{Clock, SystemClock, ToolRegistry};

pub const LLM_ERROR_REPLY: &str =
    "I'm sorry, I encountered an error processing your request. Please try again.";

/// What the caller hears next, plus the tool calls made to produce it.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub actions: Vec<AgentAction>,
    pub ends_call: bool,
}

impl AgentReply {
    fn spoken(text: impl Into<String>) -> Self {
        Self { text: text.into(), actions: Vec::new(), ends_call: false }
    }
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    guardrails: GuardrailPolicy,
    prompts: PromptCatalog,
    clock: Arc<dyn Clock>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        guardrails: GuardrailPolicy,
        prompts: PromptCatalog,
    ) -> Self {
        Self { llm, tools, guardrails, prompts, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn prompts(&self) -> &PromptCatalog {
        &self.prompts
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// A fresh session whose conversation starts with today's system prompt.
    pub fn open_session(
        &self,
        call_sid: CallSid,
        caller: Option<String>,
        callee: Option<String>,
    ) -> Result<CallSession> {
        let system_prompt = self.prompts.system_prompt(self.clock.now().date())?;
        Ok(CallSession::new(call_sid, caller, callee, system_prompt, Utc::now()))
    }

    /// Runs one caller utterance through guardrails and the tool-call loop.
    ///
    /// Never fails: LLM errors become the apology line so the call can continue.
    pub async fn respond(&self, session: &mut CallSession, utterance: &str) -> AgentReply {
        session.touch(Utc::now());
        let call_sid = session.call_sid().clone();

        let utterance = match self.guardrails.evaluate(utterance) {
            GuardrailDecision::Allow => utterance.trim().to_owned(),
            GuardrailDecision::Degrade { reason_code, utterance } => {
                warn!(
                    event_name = "system.agent.guardrail.degraded",
                    call_sid = %call_sid,
                    reason_code,
                    "utterance degraded"
                );
                utterance
            }
            GuardrailDecision::Deny { reason_code } => {
                info!(
                    event_name = "system.agent.guardrail.denied",
                    call_sid = %call_sid,
                    reason_code,
                    "utterance denied"
                );
                return AgentReply::spoken(self.prompts.fallback());
            }
            GuardrailDecision::EndCall { reason_code } => {
                info!(
                    event_name = "system.agent.call.farewell",
                    call_sid = %call_sid,
                    reason_code,
                    "caller ended the conversation"
                );
                let goodbye = self.prompts.goodbye().to_owned();
                self.push_user(session, utterance.trim());
                self.push_assistant(session, &goodbye);
                return AgentReply { text: goodbye, actions: Vec::new(), ends_call: true };
            }
        };

        self.push_user(session, &utterance);
        let trimmed = self.guardrails.trim_history(session.conversation.messages_mut());
        if trimmed > 0 {
            info!(
                event_name = "system.agent.history.trimmed",
                call_sid = %call_sid,
                removed = trimmed,
                "conversation history trimmed"
            );
        }

        let specs = self.tools.specs();
        let mut actions = Vec::new();
        let mut last_content: Option<String> = None;

        for round in 1..=self.guardrails.tool_rounds() {
            let request = CompletionRequest {
                messages: session.conversation.history().to_vec(),
                tools: specs.clone(),
                tool_choice: ToolChoice::Auto,
            };

            let completion = match self.llm.complete(request).await {
                Ok(completion) => completion,
                Err(err) => {
                    error!(
                        event_name = "system.agent.llm.failed",
                        call_sid = %call_sid,
                        provider = self.llm.provider(),
                        round,
                        error = %format!("{err:#}"),
                        "llm completion failed"
                    );
                    session.record_actions(&actions);
                    self.push_assistant(session, LLM_ERROR_REPLY);
                    return AgentReply { text: LLM_ERROR_REPLY.to_owned(), actions, ends_call: false };
                }
            };

            let content = completion.content.filter(|text| !text.trim().is_empty());
            if completion.tool_calls.is_empty() {
                let text = content.unwrap_or_else(|| self.prompts.fallback().to_owned());
                session.record_actions(&actions);
                self.push_assistant(session, &text);
                return AgentReply { text, actions, ends_call: false };
            }

            if content.is_some() {
                last_content.clone_from(&content);
            }
            session
                .conversation
                .add_message(ChatMessage::assistant_with_tools(content, completion.tool_calls.clone()));

            for call in completion.tool_calls {
                let outcome = self.tools.dispatch(&call.name, call.arguments.clone()).await;
                session.conversation.add_message(ChatMessage::tool(&call.id, outcome.result.to_string()));
                actions.push(AgentAction {
                    tool_name: call.name,
                    arguments: call.arguments,
                    success: outcome.success(),
                    error_message: outcome.error,
                    result: outcome.result,
                    at: Utc::now(),
                });
            }
        }

        warn!(
            event_name = "system.agent.tool_rounds.exhausted",
            call_sid = %call_sid,
            rounds = self.guardrails.tool_rounds(),
            "tool round limit reached"
        );
        let text = last_content.unwrap_or_else(|| self.prompts.fallback().to_owned());
        session.record_actions(&actions);
        self.push_assistant(session, &text);
        AgentReply { text, actions, ends_call: false }
    }

    fn push_user(&self, session: &mut CallSession, text: &str) {
        session.conversation.add_message(ChatMessage::user(text));
        session.record_turn(Role::User, text, Utc::now());
    }

    fn push_assistant(&self, session: &mut CallSession, text: &str) {
        session.conversation.add_message(ChatMessage::assistant(text));
        session.record_turn(Role::Assistant, text, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;

    use hostline_core::domain::call::{CallSid, Role};
    use hostline_core::domain::restaurant::RestaurantProfile;

    use super::{AgentRuntime, LLM_ERROR_REPLY};
    use crate::guardrails::GuardrailPolicy;
    use crate::llm::{Completion, CompletionRequest, LlmClient, ToolCall};
    use crate::mock::MockLlmClient;
    use crate::prompts::PromptCatalog;
    use crate::tools::test_support::{registry, seed_instant};
    use crate::tools::FixedClock;

    /// Replays queued completions and remembers what it was asked.
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<Completion>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn with(replies: Vec<Result<Completion>>) -> Self {
            Self { replies: Mutex::new(replies.into()), requests: Mutex::default() }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.requests.lock().expect("requests").push(request);
            self.replies
                .lock()
                .expect("replies")
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn tool_call(id: &str, name: &str) -> Completion {
        Completion {
            content: Some("One moment.".to_owned()),
            tool_calls: vec![ToolCall { id: id.to_owned(), name: name.to_owned(), arguments: json!({}) }],
        }
    }

    async fn runtime(llm: Arc<dyn LlmClient>, policy: GuardrailPolicy) -> AgentRuntime {
        let prompts = PromptCatalog::new(RestaurantProfile::default()).expect("prompts");
        AgentRuntime::new(llm, registry().await, policy, prompts)
            .with_clock(Arc::new(FixedClock(seed_instant())))
    }

    fn open(runtime: &AgentRuntime) -> crate::conversation::CallSession {
        runtime
            .open_session(CallSid("CA100".to_owned()), Some("+15550001111".to_owned()), None)
            .expect("session")
    }

    #[tokio::test]
    async fn mock_agent_looks_up_categories_and_summarizes() {
        let llm = MockLlmClient::default().with_clock(Arc::new(FixedClock(seed_instant())));
        let runtime = runtime(Arc::new(llm), GuardrailPolicy::default()).await;
        let mut session = open(&runtime);

        let reply = runtime.respond(&mut session, "What's on the menu?").await;

        assert!(reply.text.starts_with("We have several menu categories including Starters"));
        assert!(!reply.ends_call);
        assert_eq!(reply.actions.len(), 1);
        assert_eq!(reply.actions[0].tool_name, "get_menu_categories");
        assert!(reply.actions[0].success);

        let roles: Vec<Role> = session.conversation.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(session.record.transcript.len(), 2);
        assert_eq!(session.record.actions.len(), 1);
    }

    #[tokio::test]
    async fn mock_agent_checks_tomorrow_for_bookings() {
        let llm = MockLlmClient::default().with_clock(Arc::new(FixedClock(seed_instant())));
        let runtime = runtime(Arc::new(llm), GuardrailPolicy::default()).await;
        let mut session = open(&runtime);

        let reply = runtime.respond(&mut session, "Can I book a table for 4 people?").await;

        let action = &reply.actions[0];
        assert_eq!(action.tool_name, "check_reservation_availability");
        assert_eq!(action.arguments, json!({"date": "2026-06-11", "time": "19:00", "party_size": 4}));
        assert_eq!(action.result["available"], json!(true));
    }

    #[tokio::test]
    async fn system_prompt_opens_the_session() {
        let runtime = runtime(Arc::new(ScriptedLlm::default()), GuardrailPolicy::default()).await;
        let session = open(&runtime);

        let history = session.conversation.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
        assert!(history[0].text().contains("Today: Wednesday, 2026-06-10"));
    }

    #[tokio::test]
    async fn llm_failure_yields_apology() {
        let llm = Arc::new(ScriptedLlm::with(vec![Err(anyhow!("connection reset"))]));
        let runtime = runtime(llm, GuardrailPolicy::default()).await;
        let mut session = open(&runtime);

        let reply = runtime.respond(&mut session, "Do you have naan?").await;
        assert_eq!(reply.text, LLM_ERROR_REPLY);
        assert!(reply.actions.is_empty());
    }

    #[tokio::test]
    async fn round_limit_falls_back_to_last_assistant_content() {
        let llm = Arc::new(ScriptedLlm::with(vec![
            Ok(tool_call("c1", "get_menu_categories")),
            Ok(tool_call("c2", "get_special_pricing")),
            Ok(Completion::text("never reached")),
        ]));
        let policy = GuardrailPolicy { max_tool_rounds: 2, ..GuardrailPolicy::default() };
        let runtime = runtime(llm.clone(), policy).await;
        let mut session = open(&runtime);

        let reply = runtime.respond(&mut session, "Tell me everything").await;

        assert_eq!(reply.text, "One moment.");
        assert_eq!(reply.actions.len(), 2);
        assert_eq!(llm.requests.lock().expect("requests").len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_recorded_as_failed_action() {
        let llm = Arc::new(ScriptedLlm::with(vec![
            Ok(tool_call("c1", "order_pizza")),
            Ok(Completion::text("Sorry, I can't do that.")),
        ]));
        let runtime = runtime(llm.clone(), GuardrailPolicy::default()).await;
        let mut session = open(&runtime);

        let reply = runtime.respond(&mut session, "Order me a pizza").await;

        assert_eq!(reply.text, "Sorry, I can't do that.");
        assert!(!reply.actions[0].success);
        assert_eq!(reply.actions[0].error_message.as_deref(), Some("Unknown tool: order_pizza"));

        let requests = llm.requests.lock().expect("requests");
        let tool_message = requests[1].messages.last().expect("tool message");
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(requests[1].tools.len(), 13);
    }

    #[tokio::test]
    async fn empty_completion_uses_fallback_script() {
        let llm = Arc::new(ScriptedLlm::with(vec![Ok(Completion::default())]));
        let runtime = runtime(llm, GuardrailPolicy::default()).await;
        let mut session = open(&runtime);

        let reply = runtime.respond(&mut session, "hmm").await;
        assert_eq!(reply.text, runtime.prompts().fallback());
    }

    #[tokio::test]
    async fn farewell_and_silence_skip_the_llm() {
        let llm = Arc::new(ScriptedLlm::default());
        let runtime = runtime(llm.clone(), GuardrailPolicy::default()).await;
        let mut session = open(&runtime);

        let silent = runtime.respond(&mut session, "  ").await;
        assert_eq!(silent.text, runtime.prompts().fallback());
        assert!(!silent.ends_call);

        let farewell = runtime.respond(&mut session, "That's all, goodbye").await;
        assert!(farewell.ends_call);
        assert_eq!(farewell.text, runtime.prompts().goodbye());

        assert!(llm.requests.lock().expect("requests").is_empty());
        assert_eq!(session.record.transcript.len(), 2);
    }
}
