//! Core agent loop implementation.

use std::sync::Arc;

use thiserror::Error;

use crate::llm::{ChatMessage, NextAction, ReasoningError, ReasoningProvider};
use crate::session::{Role, Turn};
use crate::tools::ToolRegistry;

/// Reply returned when the step budget runs out before a final answer.
const STEP_BUDGET_REPLY: &str =
    "I could not complete this request within the allowed number of steps. \
     Try narrowing the question or asking about one data source at a time.";

/// Failures that abort a chat request. Tool-level errors never land here;
/// they are fed back to the reasoning step as structured results.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("reasoning backend unavailable: {0}")]
    ReasoningBackendUnavailable(String),
}

impl From<ReasoningError> for AgentError {
    fn from(e: ReasoningError) -> Self {
        match e {
            ReasoningError::BackendUnavailable(msg) => AgentError::ReasoningBackendUnavailable(msg),
        }
    }
}

/// The conversational agent.
pub struct Agent {
    provider: Arc<dyn ReasoningProvider>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_steps: usize,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ReasoningProvider>,
        tools: Arc<ToolRegistry>,
        system_prompt: String,
        max_steps: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            system_prompt,
            max_steps,
        }
    }

    /// Run one chat exchange: prior history plus a new user message, out
    /// comes the reply text.
    ///
    /// The loop state machine is THINKING -> (ANSWER | TOOL_CALL); a tool
    /// call feeds its result back into the working context and returns to
    /// THINKING. Exhausting the step budget yields an explicit
    /// "could not complete" reply rather than an error.
    pub async fn run(&self, history: &[Turn], user_message: &str) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        for turn in history {
            messages.push(match turn.role {
                Role::User => ChatMessage::user(turn.content.clone()),
                Role::Agent => ChatMessage::assistant(turn.content.clone()),
            });
        }
        messages.push(ChatMessage::user(user_message));

        let tool_schemas = self.tools.schemas();

        for step in 0..self.max_steps {
            tracing::debug!(step = step + 1, "agent thinking");

            match self.provider.next_action(&messages, &tool_schemas).await? {
                NextAction::Answer(reply) => {
                    tracing::debug!(steps = step + 1, "agent produced final answer");
                    return Ok(reply);
                }
                NextAction::ToolCall { id, name, arguments } => {
                    tracing::debug!(tool = %name, "executing tool call");
                    let result = self.tools.invoke(&name, &arguments).await;
                    if result.is_error() {
                        tracing::warn!(tool = %name, "tool call returned an error result");
                    }
                    messages.push(ChatMessage::assistant_tool_call(id.clone(), name, &arguments));
                    messages.push(ChatMessage::tool_result(id, result.to_json()));
                }
            }
        }

        tracing::warn!(max_steps = self.max_steps, "agent step budget exhausted");
        Ok(STEP_BUDGET_REPLY.to_string())
    }
}
