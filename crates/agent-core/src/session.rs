//! Session Management
//!
//! A session owns the tool registry, the conversation memory and a handle to
//! the reasoning engine, and drives the interactive read-process-print loop.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::ConversationMemory;
use crate::reasoning::ReasoningEngine;
use crate::tool::ToolRegistry;

/// Prompt marker printed before every read
pub const PROMPT: &str = "> ";

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    Processing,
    Stopped,
}

/// What the terminal produced for one read
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl+C at the prompt
    Interrupted,
    /// Ctrl+D or closed input
    Eof,
}

/// Source of user lines; prints `prompt` before waiting for input.
///
/// The session drops a pending read when shutdown is requested, so
/// implementations must tolerate being cancelled mid-read.
#[async_trait]
pub trait LineSource: Send {
    async fn read_line(&mut self, prompt: &str) -> std::io::Result<ReadOutcome>;
}

#[derive(Debug, Default)]
struct ShutdownState {
    triggered: AtomicBool,
    notify: Notify,
}

/// Interrupt request shared between the signal handler and the session loop
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<ShutdownState>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.triggered.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.0.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once `trigger` has been called
    pub async fn triggered(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// A complete agent session
pub struct Session {
    id: SessionId,
    tools: Arc<ToolRegistry>,
    memory: ConversationMemory,
    engine: Arc<dyn ReasoningEngine>,
    state: SessionState,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(engine: Arc<dyn ReasoningEngine>, tools: Arc<ToolRegistry>, memory: ConversationMemory) -> Self {
        Self {
            id: SessionId::new(),
            tools,
            memory,
            engine,
            state: SessionState::AwaitingInput,
            created_at: Utc::now(),
        }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Run one utterance through the engine. On success both turns are
    /// recorded; on failure memory is left untouched.
    pub async fn turn(&mut self, utterance: &str) -> Result<String> {
        self.state = SessionState::Processing;
        let outcome = self
            .engine
            .run(utterance, &self.tools, self.memory.snapshot())
            .await;
        self.state = SessionState::AwaitingInput;

        let answer = outcome?;
        self.memory.append_exchange(utterance, answer.clone());
        Ok(answer)
    }

    /// Interactive loop: read, answer, print, until interrupted or input ends.
    ///
    /// An interrupt while waiting for input ends the loop at once, even if a
    /// line arrives afterwards. An interrupt during a turn lets that turn
    /// finish and print before the loop ends.
    pub async fn run_loop<S, W>(&mut self, input: &mut S, out: &mut W, shutdown: &ShutdownSignal) -> Result<()>
    where
        S: LineSource + ?Sized,
        W: Write + ?Sized,
    {
        tracing::debug!(session = %self.id, tools = ?self.tools.names(), "Session started");

        while !shutdown.is_triggered() {
            let outcome = tokio::select! {
                biased;
                () = shutdown.triggered() => ReadOutcome::Interrupted,
                read = input.read_line(PROMPT) => read?,
            };

            let line = match outcome {
                ReadOutcome::Line(line) if !shutdown.is_triggered() => line,
                _ => break,
            };

            match self.turn(line.trim()).await {
                Ok(answer) => writeln!(out, "\nAnswer: {answer}\n")?,
                Err(e) => {
                    tracing::warn!(session = %self.id, error = %e, "Turn failed");
                    writeln!(out, "\nError: {}\n", e.user_message())?;
                }
            }
            out.flush()?;
        }

        self.state = SessionState::Stopped;
        writeln!(out, "\nProgram terminated.")?;
        out.flush()?;

        tracing::debug!(session = %self.id, turns = self.memory.len(), "Session stopped");
        Ok(())
    }
}
