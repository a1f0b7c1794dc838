//! Chat messages exchanged with the model and kept in conversation memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Tool observation fed back into the reasoning loop; never stored in memory
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Id of the tool call an observation answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Observation produced by running a tool
    pub fn tool(content: impl Into<String>, call_id: Option<String>) -> Self {
        Self {
            tool_call_id: call_id,
            ..Self::new(Role::Tool, content)
        }
    }

    /// True for the roles that make up the persisted transcript
    pub const fn is_turn(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
    }

    /// Rough size in tokens: four bytes each plus a fixed per-message overhead
    pub fn estimate_tokens(&self) -> u32 {
        u32::try_from(self.content.len() / 4).unwrap_or(u32::MAX).saturating_add(4)
    }
}

/// Estimated prompt size of a whole request
pub fn estimate_tokens(messages: &[Message]) -> u32 {
    messages
        .iter()
        .map(Message::estimate_tokens)
        .fold(0, u32::saturating_add)
}
