//! End-to-end session runs with the real tools and a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use agent_core::calculator::CalculatorTool;
use agent_core::provider::{Completion, GenerationOptions};
use agent_core::session::{LineSource, ReadOutcome, ShutdownSignal};
use agent_core::{Agent, AgentConfig, ConversationMemory, LlmProvider, Message, Result, Role, Session, ToolRegistry};
use agent_runtime::{WikipediaConfig, WikipediaTool};
use async_trait::async_trait;

/// Replies from a script and records every request it was sent
struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
    interrupt_on_call: Option<(usize, ShutdownSignal)>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(ToString::to_string).collect()),
            requests: Mutex::new(Vec::new()),
            interrupt_on_call: None,
        }
    }

    fn interrupting(mut self, call: usize, signal: ShutdownSignal) -> Self {
        self.interrupt_on_call = Some((call, signal));
        self
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(&self, messages: &[Message], _options: &GenerationOptions) -> Result<Completion> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            requests.len()
        };
        if let Some((at, signal)) = &self.interrupt_on_call {
            if *at == call {
                signal.trigger();
            }
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("model script exhausted");
        Ok(Completion::text(reply, "scripted-model"))
    }
}

/// Typed lines followed by end of input. With `stall_with` set, the read after
/// the last line raises an interrupt and never returns, like Ctrl+C arriving
/// while a piped terminal waits for input.
struct ScriptedInput {
    lines: VecDeque<String>,
    reads: usize,
    stall_with: Option<ShutdownSignal>,
}

impl ScriptedInput {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(ToString::to_string).collect(),
            reads: 0,
            stall_with: None,
        }
    }
}

#[async_trait]
impl LineSource for ScriptedInput {
    async fn read_line(&mut self, _prompt: &str) -> std::io::Result<ReadOutcome> {
        self.reads += 1;
        if let Some(line) = self.lines.pop_front() {
            return Ok(ReadOutcome::Line(line));
        }
        if let Some(signal) = &self.stall_with {
            signal.trigger();
            return std::future::pending().await;
        }
        Ok(ReadOutcome::Eof)
    }
}

fn session(provider: &Arc<ScriptedProvider>, tools: ToolRegistry) -> Session {
    let provider: Arc<dyn LlmProvider> = provider.clone();
    let agent = Agent::new(provider, AgentConfig::default());
    Session::new(Arc::new(agent), Arc::new(tools), ConversationMemory::new())
}

fn calculator_registry(provider: &Arc<ScriptedProvider>) -> ToolRegistry {
    let provider: Arc<dyn LlmProvider> = provider.clone();
    let mut tools = ToolRegistry::new();
    tools
        .register(CalculatorTool::new(provider, &GenerationOptions::default()))
        .unwrap();
    tools
}

async fn run(session: &mut Session, input: &mut ScriptedInput, shutdown: &ShutdownSignal) -> String {
    let mut out = Vec::new();
    session.run_loop(input, &mut out, shutdown).await.unwrap();
    String::from_utf8(out).unwrap()
}

const CALCULATOR_CALL: &str = "```tool\n{\"tool\": \"Calculator\", \"arguments\": {\"input\": \"17 * 4\"}}\n```";

#[tokio::test]
async fn arithmetic_question_goes_through_the_calculator() {
    let provider = Arc::new(ScriptedProvider::new(&[CALCULATOR_CALL, "17 * 4 is 68."]));
    let mut session = session(&provider, calculator_registry(&provider));
    let mut input = ScriptedInput::new(&["What is 17 * 4?"]);

    let output = run(&mut session, &mut input, &ShutdownSignal::new()).await;

    assert!(output.contains("Answer: 17 * 4 is 68."), "{output}");
    assert!(output.ends_with("Program terminated.\n"), "{output}");

    let memory = session.memory().snapshot();
    assert_eq!(memory.len(), 2);
    assert_eq!(memory[0].role, Role::User);
    assert_eq!(memory[0].content, "What is 17 * 4?");
    assert_eq!(memory[1].content, "17 * 4 is 68.");

    // The plain expression is evaluated locally: two model calls, not three
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let observation = requests[1].last().unwrap();
    assert_eq!(observation.role, Role::Tool);
    assert_eq!(observation.content, "[Tool 'Calculator' returned]\nAnswer: 68");
}

#[tokio::test]
async fn unreachable_wikipedia_does_not_end_the_session() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "```tool\n{\"tool\": \"wikipedia\", \"arguments\": {\"input\": \"Ada Lovelace\"}}\n```",
        "Wikipedia is unavailable, but Ada Lovelace was an English mathematician.",
        "Hello again.",
    ]));
    let mut tools = ToolRegistry::new();
    tools
        .register(
            WikipediaTool::from_config(WikipediaConfig {
                base_url: Some("http://127.0.0.1:9".into()),
                timeout_secs: 5,
                ..Default::default()
            })
            .unwrap(),
        )
        .unwrap();
    let mut session = session(&provider, tools);
    let mut input = ScriptedInput::new(&["Who was Ada Lovelace?", "Hi"]);

    let output = run(&mut session, &mut input, &ShutdownSignal::new()).await;

    assert!(output.contains("Answer: Wikipedia is unavailable"), "{output}");
    assert!(output.contains("Answer: Hello again."), "{output}");
    assert!(!output.contains("Error:"), "{output}");
    assert!(output.ends_with("Program terminated.\n"), "{output}");
    assert_eq!(input.reads, 3);
    assert_eq!(session.memory().len(), 4);

    let observation = provider.requests()[1].last().unwrap().clone();
    assert_eq!(observation.role, Role::Tool);
    assert!(observation.content.starts_with("[Tool 'wikipedia' failed]"), "{}", observation.content);
}

#[tokio::test]
async fn interrupt_during_a_turn_prints_the_answer_then_stops() {
    let shutdown = ShutdownSignal::new();
    let provider = Arc::new(ScriptedProvider::new(&[CALCULATOR_CALL, "68."]).interrupting(1, shutdown.clone()));
    let mut session = session(&provider, calculator_registry(&provider));
    let mut input = ScriptedInput::new(&["What is 17 * 4?", "And 2 + 2?"]);

    let output = run(&mut session, &mut input, &shutdown).await;

    assert!(output.contains("Answer: 68."), "{output}");
    assert!(output.ends_with("Program terminated.\n"), "{output}");
    assert_eq!(input.reads, 1);
    assert_eq!(session.memory().len(), 2);
}

#[tokio::test]
async fn interrupt_while_waiting_for_input_stops_without_a_turn() {
    let shutdown = ShutdownSignal::new();
    let provider = Arc::new(ScriptedProvider::new(&[CALCULATOR_CALL, "68."]));
    let mut session = session(&provider, calculator_registry(&provider));
    let mut input = ScriptedInput::new(&["What is 17 * 4?"]);
    input.stall_with = Some(shutdown.clone());

    let output = run(&mut session, &mut input, &shutdown).await;

    assert!(output.contains("Answer: 68."), "{output}");
    assert!(output.ends_with("Program terminated.\n"), "{output}");
    assert_eq!(input.reads, 2);
    assert_eq!(provider.requests().len(), 2);
    assert_eq!(session.memory().len(), 2);
}
