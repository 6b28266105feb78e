//! Reasoning backend integration.
//!
//! The agent loop consumes a polymorphic "next action" (final answer or tool
//! call) produced by a [`ReasoningProvider`]. The production provider speaks
//! the OpenAI-compatible chat completions protocol; tests script the trait
//! directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Message roles in the chat completions protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,

    #[serde(rename = "type")]
    pub call_type: String,

    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    /// JSON-encoded argument object, as the protocol transmits it
    pub arguments: String,
}

/// One message in the working context sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// The assistant message that carries a tool call request.
    pub fn assistant_tool_call(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(vec![ToolCallRequest {
                id: id.into(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: name.into(),
                    arguments: arguments.to_string(),
                },
            }]),
            tool_call_id: None,
        }
    }

    /// The tool message that answers a tool call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// What the backend decided to do next.
#[derive(Debug, Clone)]
pub enum NextAction {
    /// A final answer for the user.
    Answer(String),

    /// Invoke one named tool with an argument object.
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    /// The backend could not be reached or produced an unusable response.
    /// Fatal to the current agent loop.
    #[error("reasoning backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// The reasoning step behind the agent loop.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Given the working context and the available tool schemas, decide the
    /// next action.
    async fn next_action(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<NextAction, ReasoningError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible client
// ─────────────────────────────────────────────────────────────────────────────

/// Response subset we consume from `POST /chat/completions`.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,

    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

/// Production provider speaking the OpenAI-compatible protocol.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ReasoningError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("atlas-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ReasoningError::BackendUnavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiCompatClient {
    async fn next_action(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<NextAction, ReasoningError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = Value::String("auto".to_string());
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::BackendUnavailable(format!("{}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ReasoningError::BackendUnavailable(format!(
                "backend returned {}: {}",
                status,
                truncate(&detail, 300)
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::BackendUnavailable(format!("unparseable response: {}", e)))?;

        parse_next_action(completion)
    }
}

fn parse_next_action(completion: ChatCompletionResponse) -> Result<NextAction, ReasoningError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ReasoningError::BackendUnavailable("response has no choices".to_string()))?;

    if let Some(calls) = choice.message.tool_calls {
        if let Some(call) = calls.into_iter().next() {
            let arguments =
                serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
            return Ok(NextAction::ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }
    }

    match choice.message.content {
        Some(content) if !content.is_empty() => Ok(NextAction::Answer(content)),
        _ => Err(ReasoningError::BackendUnavailable(
            "backend returned an empty message".to_string(),
        )),
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
