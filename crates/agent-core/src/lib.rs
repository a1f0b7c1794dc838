//! # agent-core
//!
//! Core pieces of a conversational, tool-using chat agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │ Conversation│  │    Tool     │  │   ReasoningEngine    │  │
//! │  │   Memory    │──│  Registry   │──│ (Agent + LlmProvider)│  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the reasoning loop and the calculator tool
//! independent of the hosted model; the `ReasoningEngine` trait keeps the
//! session loop independent of the reasoning strategy.

pub mod calculator;
pub mod credential;
pub mod error;
pub mod math;
pub mod memory;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use calculator::CalculatorTool;
pub use credential::{Credential, load_credential};
pub use error::{AgentError, Result};
pub use memory::ConversationMemory;
pub use message::{Message, Role};
pub use provider::LlmProvider;
pub use reasoning::{Agent, AgentConfig, ReasoningEngine};
pub use session::{LineSource, ReadOutcome, Session, ShutdownSignal};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
