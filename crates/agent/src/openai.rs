//! OpenAI-compatible chat completions client with function calling.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use hostline_core::config::LlmConfig;
use hostline_core::domain::call::Role;

use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient, ToolCall, ToolSpec};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 4_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    organization: Option<String>,
    model: String,
    retry: RetryPolicy,
}

enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key =
            config.api_key.clone().ok_or_else(|| anyhow!("llm.api_key is not configured"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building llm http client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            organization: config.organization.clone(),
            model: config.model.clone(),
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(wire_tool).collect());
            body["tool_choice"] = Value::String(request.tool_choice.as_str().to_owned());
        }
        body
    }

    async fn attempt(&self, body: &Value) -> Result<Completion, AttemptError> {
        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(body);
        if let Some(organization) = &self.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| AttemptError::Retryable(anyhow!("llm transport error: {error}")))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let error = anyhow!("llm returned {}: {}", status.as_u16(), detail.trim());
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AttemptError::Retryable(error)
            } else {
                AttemptError::Fatal(error)
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|error| AttemptError::Fatal(anyhow!("llm response decode: {error}")))?;
        parsed.into_completion().map_err(AttemptError::Fatal)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = self.request_body(&request);

        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(completion) => {
                    info!(
                        event_name = "system.agent.llm.completed",
                        model = %self.model,
                        attempt,
                        tool_calls = completion.tool_calls.len(),
                        "llm completion received"
                    );
                    return Ok(completion);
                }
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retryable(error)) => {
                    if attempt >= self.retry.max_retries {
                        return Err(error.context("llm retries exhausted"));
                    }
                    warn!(
                        event_name = "system.agent.llm.retry",
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %error,
                        "llm request failed; retrying"
                    );
                    let delay = self.retry.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments.to_string() },
                })
            })
            .collect();
    }
    if message.role == Role::Tool {
        if let Some(id) = &message.tool_call_id {
            wire["tool_call_id"] = Value::String(id.clone());
        }
    }
    wire
}

fn wire_tool(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        },
    })
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl WireResponse {
    fn into_completion(self) -> Result<Completion> {
        let message = self
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| anyhow!("llm response carried no choices"))?;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: parse_arguments(&call.function.arguments),
            })
            .collect();
        Ok(Completion { content: message.content, tool_calls })
    }
}

/// Models occasionally emit an empty string for argument-less calls.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use hostline_core::config::AppConfig;

    use super::{parse_arguments, OpenAiClient, RetryPolicy, WireResponse};
    use crate::llm::{ChatMessage, CompletionRequest, LlmClient, ToolCall, ToolChoice, ToolSpec};

    fn client() -> OpenAiClient {
        let mut config = AppConfig::default().llm;
        config.api_key = Some("sk-test".to_owned().into());
        config.base_url = "http://127.0.0.1:9/v1/".to_owned();
        config.timeout_secs = 1;
        OpenAiClient::from_config(&config).expect("client")
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = AppConfig::default().llm;
        assert!(OpenAiClient::from_config(&config).is_err());
    }

    #[test]
    fn request_body_uses_function_calling_wire_shape() {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system("be brief"),
                ChatMessage::assistant_with_tools(
                    None,
                    vec![ToolCall {
                        id: "call_1".to_owned(),
                        name: "get_menu_categories".to_owned(),
                        arguments: json!({}),
                    }],
                ),
                ChatMessage::tool("call_1", "[]"),
            ],
            tools: vec![ToolSpec {
                name: "get_menu_categories".to_owned(),
                description: "Get a list of all menu categories".to_owned(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
            tool_choice: ToolChoice::Auto,
        };

        let body = client().request_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][2]["role"], "tool");
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
        assert!(body["messages"][0].get("tool_call_id").is_none());
    }

    #[test]
    fn tool_less_request_omits_tool_choice() {
        let request = CompletionRequest {
            messages: vec![ChatMessage::user("hello")],
            ..CompletionRequest::default()
        };
        let body = client().request_body(&request);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn response_tool_arguments_are_decoded() {
        let wire: WireResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "a", "type": "function",
                         "function": {"name": "search_menu_items", "arguments": "{\"query\":\"naan\"}"}},
                        {"id": "b", "type": "function",
                         "function": {"name": "get_special_pricing", "arguments": ""}}
                    ]
                }
            }]
        }))
        .expect("wire response");

        let completion = wire.into_completion().expect("completion");
        assert_eq!(completion.content, None);
        assert_eq!(completion.tool_calls[0].arguments, json!({"query": "naan"}));
        assert_eq!(completion.tool_calls[1].arguments, json!({}));
        assert_eq!(parse_arguments("not json"), json!("not json"));
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(10), Duration::from_millis(4_000));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_after_retries() {
        let client = client().with_retry_policy(RetryPolicy {
            max_retries: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        });

        let error = client
            .complete(CompletionRequest {
                messages: vec![ChatMessage::user("hi")],
                ..CompletionRequest::default()
            })
            .await
            .expect_err("nothing listens on port 9");
        assert!(error.to_string().contains("retries exhausted"));
    }
}
