//! Agent Runtime - LLM-driven phone conversations for the restaurant
//!
//! This crate is the "brain" behind each call:
//! - Keeps per-call conversation state across webhook deliveries
//! - Enforces guardrails on what the caller said and how much history is sent
//! - Lets the model call restaurant tools (menu, pricing, reservations)
//! - Renders the spoken scripts (system prompt, welcome, goodbye, fallback)
//!
//! # Architecture
//!
//! Each transcribed utterance runs through a bounded loop:
//! 1. **Guardrails** (`guardrails`) - Empty, farewell, or oversized utterances are handled first
//! 2. **Completion** (`llm`, `openai`, `mock`) - History + tool specs go to the model
//! 3. **Tool Execution** (`tools`) - Requested tools run against the database
//! 4. **Response** - The final assistant text becomes TwiML upstream
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main orchestrator (see `runtime` module)
//! - `LlmClient` - Pluggable trait; OpenAI-compatible HTTP or the keyword mock
//! - `ConversationStore` - Per-call sessions keyed by `CallSid`
//!
//! # Safety Principle
//!
//! The model never invents availability or prices. Every figure it speaks comes from a tool
//! result computed by the domain rules in `hostline-core`.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod mock;
pub mod openai;
pub mod prompts;
pub mod runtime;
pub mod tools;

use std::sync::Arc;

use anyhow::Result;

use hostline_core::config::{AppConfig, LlmProvider};
use hostline_core::domain::reservation::{BookingPolicy, OpeningHours};
use hostline_core::domain::restaurant::RestaurantProfile;
use hostline_db::repositories::{SqlMenuRepository, SqlReservationRepository};
use hostline_db::DbPool;

pub use conversation::{CallSession, Conversation, ConversationStore, SharedSession};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{ChatMessage, Completion, CompletionRequest, LlmClient, ToolCall, ToolSpec};
pub use prompts::PromptCatalog;
pub use runtime::{AgentReply, AgentRuntime};
pub use tools::{ReservationNotifier, ToolContext, ToolRegistry};

/// The configured model client: OpenAI-compatible when a key is available, otherwise the mock.
pub fn llm_client(config: &AppConfig) -> Result<Arc<dyn LlmClient>> {
    match config.llm.resolved_provider() {
        LlmProvider::OpenAi => Ok(Arc::new(openai::OpenAiClient::from_config(&config.llm)?)),
        LlmProvider::Auto | LlmProvider::Mock => {
            Ok(Arc::new(mock::MockLlmClient::new(RestaurantProfile::from(&config.restaurant))))
        }
    }
}

/// Wires the model, the thirteen restaurant tools, and the scripts for one restaurant.
pub fn build_runtime(
    config: &AppConfig,
    pool: DbPool,
    notifier: Option<Arc<dyn ReservationNotifier>>,
) -> Result<AgentRuntime> {
    let profile = RestaurantProfile::from(&config.restaurant);
    let context = ToolContext {
        menu: Arc::new(SqlMenuRepository::new(pool.clone())),
        reservations: Arc::new(SqlReservationRepository::new(pool)),
        policy: BookingPolicy::new(OpeningHours {
            open_hour: config.restaurant.open_hour,
            close_hour: config.restaurant.close_hour,
        }),
        clock: Arc::new(tools::SystemClock),
        notifier,
    };

    Ok(AgentRuntime::new(
        llm_client(config)?,
        ToolRegistry::restaurant(context),
        GuardrailPolicy::from(&config.calls),
        PromptCatalog::new(profile)?,
    ))
}
