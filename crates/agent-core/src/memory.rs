//! Conversation Memory
//!
//! Ordered transcript of user and assistant turns, replayed into every
//! reasoning call. Unbounded by default; an optional capacity evicts the
//! oldest turns first.

use crate::error::{AgentError, Result};
use crate::message::{Message, Role};

#[derive(Clone, Debug, Default)]
pub struct ConversationMemory {
    turns: Vec<Message>,
    capacity: Option<usize>,
}

impl ConversationMemory {
    /// Unbounded memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory that keeps at most `capacity` turns, rounded up to whole
    /// user/assistant exchanges
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: Vec::new(),
            capacity: Some(capacity.max(1).next_multiple_of(2)),
        }
    }

    /// Bounded by `AGENT_MEMORY_CAPACITY` when set, unbounded otherwise
    pub fn from_env() -> Result<Self> {
        match std::env::var("AGENT_MEMORY_CAPACITY") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(Self::with_capacity)
                .ok_or_else(|| AgentError::Config(format!("AGENT_MEMORY_CAPACITY must be a positive integer, got '{raw}'"))),
            _ => Ok(Self::new()),
        }
    }

    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append a user or assistant turn
    pub fn append(&mut self, turn: Message) -> Result<()> {
        if !turn.is_turn() {
            return Err(AgentError::Memory(format!(
                "only user and assistant turns are stored, got {}",
                turn.role
            )));
        }

        self.turns.push(turn);
        self.evict();
        Ok(())
    }

    /// Record a completed exchange
    pub fn append_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(Message::new(Role::User, user));
        self.turns.push(Message::new(Role::Assistant, assistant));
        self.evict();
    }

    /// Full history in insertion order
    pub fn snapshot(&self) -> &[Message] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn evict(&mut self) {
        if let Some(capacity) = self.capacity {
            if self.turns.len() > capacity {
                let mut excess = self.turns.len() - capacity;
                // history never opens with a reply whose question was evicted
                while self.turns.get(excess).is_some_and(|m| m.role == Role::Assistant) {
                    excess += 1;
                }
                self.turns.drain(..excess);
                tracing::debug!(evicted = excess, capacity, "Conversation memory trimmed");
            }
        }
    }
}
