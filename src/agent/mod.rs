//! Agent module - the bounded think/act loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context from the system prompt, session history, and new message
//! 2. Ask the reasoning backend for the next action
//! 3. If it requests a tool call, execute it and feed the structured result back
//! 4. Repeat until a final answer is produced or the step budget runs out

mod agent_loop;
mod prompt;

pub use agent_loop::{Agent, AgentError};
pub use prompt::build_system_prompt;
