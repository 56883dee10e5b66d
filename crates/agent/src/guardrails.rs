use once_cell::sync::Lazy;
use regex::Regex;

use hostline_core::config::CallsConfig;
use hostline_core::domain::call::Role;

use crate::llm::ChatMessage;

static FAREWELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(bye|goodbye|good bye|that's all|that is all)\b").expect("farewell pattern")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    /// Proceed with a shortened utterance.
    Degrade { reason_code: &'static str, utterance: String },
    /// The caller is done; answer with the goodbye script.
    EndCall { reason_code: &'static str },
    /// Nothing usable was said; answer with the fallback script.
    Deny { reason_code: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_input_chars: usize,
    pub max_history_messages: usize,
    pub max_tool_rounds: u32,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_input_chars: 2000, max_history_messages: 40, max_tool_rounds: 5 }
    }
}

impl From<&CallsConfig> for GuardrailPolicy {
    fn from(config: &CallsConfig) -> Self {
        Self {
            max_input_chars: config.max_input_chars,
            max_history_messages: config.max_history_messages,
            max_tool_rounds: config.max_tool_rounds,
        }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, utterance: &str) -> GuardrailDecision {
        let trimmed = utterance.trim();
        if trimmed.is_empty() {
            return GuardrailDecision::Deny { reason_code: "empty_utterance" };
        }

        let normalized = trimmed.to_lowercase().replace('\u{2019}', "'");
        if FAREWELL.is_match(&normalized) {
            return GuardrailDecision::EndCall { reason_code: "caller_farewell" };
        }

        if trimmed.chars().count() > self.max_input_chars {
            let utterance = trimmed.chars().take(self.max_input_chars).collect();
            return GuardrailDecision::Degrade { reason_code: "utterance_truncated", utterance };
        }

        GuardrailDecision::Allow
    }

    /// At least one round, so a reply is always attempted.
    pub fn tool_rounds(&self) -> u32 {
        self.max_tool_rounds.max(1)
    }

    /// Drops the oldest non-system messages beyond `max_history_messages`, then any tool
    /// results left without the assistant turn that requested them. Returns how many went.
    pub fn trim_history(&self, messages: &mut Vec<ChatMessage>) -> usize {
        let before = messages.len();
        let conversational = messages.iter().filter(|message| message.role != Role::System).count();
        let mut excess = conversational.saturating_sub(self.max_history_messages);

        messages.retain(|message| {
            if message.role == Role::System || excess == 0 {
                return true;
            }
            excess -= 1;
            false
        });

        let orphaned = messages
            .iter()
            .skip_while(|message| message.role == Role::System)
            .take_while(|message| message.role == Role::Tool)
            .count();
        if orphaned > 0 {
            let start = messages.iter().take_while(|message| message.role == Role::System).count();
            messages.drain(start..start + orphaned);
        }

        before - messages.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use hostline_core::domain::call::Role;

    use super::{GuardrailDecision, GuardrailPolicy};
    use crate::llm::{ChatMessage, ToolCall};

    #[test]
    fn blank_utterance_is_denied() {
        let policy = GuardrailPolicy::default();
        assert_eq!(policy.evaluate("   "), GuardrailDecision::Deny { reason_code: "empty_utterance" });
    }

    #[test]
    fn farewells_end_the_call() {
        let policy = GuardrailPolicy::default();
        for text in ["Okay, bye!", "Goodbye", "That’s all, thanks", "that is all I needed"] {
            assert_eq!(
                policy.evaluate(text),
                GuardrailDecision::EndCall { reason_code: "caller_farewell" },
                "{text}"
            );
        }
        assert_eq!(policy.evaluate("Can I stop by around noon?"), GuardrailDecision::Allow);
        assert_eq!(policy.evaluate("Is that all on the menu?"), GuardrailDecision::Allow);
    }

    #[test]
    fn long_utterances_are_truncated() {
        let policy = GuardrailPolicy { max_input_chars: 5, ..GuardrailPolicy::default() };
        assert_eq!(
            policy.evaluate("  naan please  "),
            GuardrailDecision::Degrade {
                reason_code: "utterance_truncated",
                utterance: "naan ".to_owned()
            }
        );
    }

    #[test]
    fn zero_round_limit_still_allows_one_round() {
        let policy = GuardrailPolicy { max_tool_rounds: 0, ..GuardrailPolicy::default() };
        assert_eq!(policy.tool_rounds(), 1);
    }

    #[test]
    fn trimming_keeps_system_prompt_and_drops_orphaned_tool_results() {
        let policy = GuardrailPolicy { max_history_messages: 3, ..GuardrailPolicy::default() };
        let call = ToolCall { id: "c1".to_owned(), name: "get_menu_categories".to_owned(), arguments: json!({}) };
        let mut messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("menu?"),
            ChatMessage::assistant_with_tools(None, vec![call]),
            ChatMessage::tool("c1", "[]"),
            ChatMessage::assistant("We have starters."),
            ChatMessage::user("thanks, any specials?"),
        ];

        let removed = policy.trim_history(&mut messages);

        assert_eq!(removed, 3);
        let roles: Vec<Role> = messages.iter().map(|message| message.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant, Role::User]);
    }

    #[test]
    fn short_histories_are_untouched() {
        let policy = GuardrailPolicy::default();
        let mut messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        assert_eq!(policy.trim_history(&mut messages), 0);
        assert_eq!(messages.len(), 2);
    }
}
