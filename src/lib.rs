//! # Atlas Agent
//!
//! A map chat backend: a thin HTTP API in front of a tool-calling LLM agent
//! that answers questions from two kinds of geodata sources.
//!
//! This library provides:
//! - An HTTP API for chat, session reset, and map data
//! - A bounded think/act agent loop over a pluggable reasoning backend
//! - A schema-validated tool registry wrapping the data access layer
//! - A session store with TTL eviction and a hard session cap
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Receive a chat message via the API
//! 2. Fetch the session's history and build context with the system prompt
//! 3. Call the reasoning backend; execute any tool call it requests
//! 4. Feed the structured tool result back, repeat until a final answer
//!    or the step budget runs out
//!
//! ## Example
//!
//! ```rust,ignore
//! use atlas_agent::{api, config::Config};
//!
//! let config = Config::from_env()?;
//! api::serve(config).await?;
//! ```

pub mod api;
pub mod agent;
pub mod config;
pub mod data;
pub mod llm;
pub mod session;
pub mod tools;

pub use config::Config;
