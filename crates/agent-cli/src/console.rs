//! Terminal line source backed by rustyline.
//!
//! rustyline blocks, so the editor lives on its own thread. The session asks
//! for a line by sending the prompt and awaits the reply, which lets an
//! interrupt abandon the read without waiting for the user.

use std::io;
use std::sync::mpsc as std_mpsc;
use std::thread;

use agent_core::session::{LineSource, ReadOutcome};
use async_trait::async_trait;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

pub struct RustylineSource {
    prompts: std_mpsc::Sender<String>,
    lines: mpsc::Receiver<io::Result<ReadOutcome>>,
    pending: bool,
}

impl RustylineSource {
    /// Start the editor thread; fails if the terminal cannot be set up
    pub fn spawn() -> io::Result<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<io::Result<()>>();
        let (prompt_tx, prompt_rx) = std_mpsc::channel::<String>();
        let (line_tx, line_rx) = mpsc::channel(1);

        thread::Builder::new().name("console".into()).spawn(move || {
            match DefaultEditor::new() {
                Ok(editor) => {
                    let _ = ready_tx.send(Ok(()));
                    editor_loop(editor, &prompt_rx, &line_tx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(into_io(e)));
                }
            }
        })?;

        ready_rx
            .recv()
            .map_err(|_| io::Error::other("console thread exited during startup"))??;

        Ok(Self {
            prompts: prompt_tx,
            lines: line_rx,
            pending: false,
        })
    }
}

fn editor_loop(
    mut editor: DefaultEditor,
    prompts: &std_mpsc::Receiver<String>,
    lines: &mpsc::Sender<io::Result<ReadOutcome>>,
) {
    while let Ok(prompt) = prompts.recv() {
        let outcome = read(&mut editor, &prompt);
        let finished = !matches!(outcome, Ok(ReadOutcome::Line(_)));
        if lines.blocking_send(outcome).is_err() || finished {
            break;
        }
    }
}

fn read(editor: &mut DefaultEditor, prompt: &str) -> io::Result<ReadOutcome> {
    match editor.readline(prompt) {
        Ok(line) => {
            if !line.trim().is_empty() {
                if let Err(e) = editor.add_history_entry(line.as_str()) {
                    tracing::debug!(error = %e, "Could not record history entry");
                }
            }
            Ok(ReadOutcome::Line(line))
        }
        Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
        Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
        Err(e) => Err(into_io(e)),
    }
}

#[async_trait]
impl LineSource for RustylineSource {
    async fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        // A cancelled read leaves its prompt outstanding; reuse it.
        if !self.pending {
            if self.prompts.send(prompt.to_string()).is_err() {
                return Ok(ReadOutcome::Eof);
            }
            self.pending = true;
        }

        let outcome = self.lines.recv().await.unwrap_or(Ok(ReadOutcome::Eof));
        self.pending = false;
        outcome
    }
}

fn into_io(err: ReadlineError) -> io::Error {
    match err {
        ReadlineError::Io(e) => e,
        other => io::Error::other(other),
    }
}
