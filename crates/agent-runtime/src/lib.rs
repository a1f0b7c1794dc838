//! # agent-runtime
//!
//! Network-backed pieces of the chat agent.
//!
//! - **OpenAI**: `LlmProvider` for the chat-completions API (and compatible
//!   endpoints via `OPENAI_BASE_URL`)
//! - **Wikipedia**: lookup tool over the MediaWiki action API
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{OpenAiConfig, OpenAiProvider, WikipediaConfig, WikipediaTool};
//!
//! let provider = OpenAiProvider::from_config(OpenAiConfig::from_env(credential)?)?;
//! tools.register(WikipediaTool::from_config(WikipediaConfig::from_env()?)?)?;
//! ```

pub mod openai;
pub mod wikipedia;

pub use openai::{OpenAiConfig, OpenAiProvider};
pub use wikipedia::{WikipediaClient, WikipediaConfig, WikipediaTool};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, LlmProvider, Message, Result, Role, Session, Tool, ToolRegistry,
};
