//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for a conversational agent.
//! Each turn the model sees the tool list, the prior transcript and the new
//! question, and either answers or asks for a tool with a ```` ```tool ````
//! block. Tool output is fed back as an observation until the model answers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::{self, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{INPUT_PARAM, ToolCall, ToolRegistry, ToolResult};

/// Anything that can turn an utterance into an answer
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Answer `utterance` given the available tools and prior turns.
    /// `history` is read-only; callers record the turn themselves.
    async fn run(&self, utterance: &str, tools: &ToolRegistry, history: &[Message]) -> Result<String>;
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Maximum reasoning iterations before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,

    /// Feed malformed tool blocks back to the model instead of failing
    pub handle_parsing_errors: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
            handle_parsing_errors: true,
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `AGENT_MAX_ITERATIONS` and
    /// `AGENT_HANDLE_PARSING_ERRORS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("AGENT_MAX_ITERATIONS") {
            config.max_iterations = raw
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AgentError::Config(format!("AGENT_MAX_ITERATIONS must be a positive integer, got '{raw}'")))?;
        }

        if let Ok(raw) = std::env::var("AGENT_HANDLE_PARSING_ERRORS") {
            config.handle_parsing_errors = parse_flag(&raw)
                .ok_or_else(|| AgentError::Config(format!("AGENT_HANDLE_PARSING_ERRORS must be true or false, got '{raw}'")))?;
        }

        Ok(config)
    }
}

/// Parse a boolean environment flag
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant having a conversation with a human.
You can answer questions on a wide range of topics and use tools when they help.

When you need to use a tool, respond with a JSON block in this exact format and nothing after it:
```tool
{"tool": "tool_name", "arguments": {"input": "value"}}
```

After receiving tool results, synthesize them into a helpful response.
Use the Calculator for any arithmetic instead of computing it yourself.
If you can answer directly without tools, do so.
Be concise and accurate."#;

const PARSE_ERROR_HINT: &str = "Could not parse the tool request. Reply with a single ```tool block containing \
{\"tool\": \"<name>\", \"arguments\": {\"input\": \"<text>\"}}, or give your final answer without a tool block.";

/// Outcome of inspecting one model reply
#[derive(Debug)]
enum Step {
    Answer,
    Call(ToolCall),
    Malformed(String),
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self { provider, config }
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self, tools: &ToolRegistry) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&tools.generate_prompt_section());
        }

        prompt
    }

    /// Inspect a reply for a tool request
    fn parse_step(content: &str) -> Step {
        let tool_start = "```tool";

        if let Some(start_idx) = content.find(tool_start) {
            let after_marker = &content[start_idx + tool_start.len()..];
            let json_str = after_marker
                .find("```")
                .map_or(after_marker, |end_idx| &after_marker[..end_idx])
                .trim();

            return match parse_tool_json(json_str) {
                Ok(call) => Step::Call(call),
                Err(e) => Step::Malformed(e),
            };
        }

        // Fallback: raw JSON object with a "tool" key
        Self::parse_inline_tool_call(content).map_or(Step::Answer, Step::Call)
    }

    fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
        if !content.contains(r#""tool""#) {
            return None;
        }

        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end <= start {
            return None;
        }

        parse_tool_json(&content[start..=end]).ok()
    }

    /// Execute a tool call, turning every failure into an observation
    async fn execute_tool(tools: &ToolRegistry, call: &ToolCall) -> ToolResult {
        match tools.execute(call).await {
            Ok(mut result) => {
                result.id.clone_from(&call.id);
                result
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult {
                    name: call.name.clone(),
                    id: call.id.clone(),
                    success: false,
                    output: format!("Error: {e}"),
                }
            }
        }
    }

    /// Format tool result for conversation
    fn format_tool_result(result: &ToolResult) -> String {
        if result.success {
            format!("[Tool '{}' returned]\n{}", result.name, result.output)
        } else {
            format!("[Tool '{}' failed]\n{}", result.name, result.output)
        }
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Decode a tool request. `arguments` may be an object or a bare string,
/// which becomes the `input` argument.
fn parse_tool_json(json_str: &str) -> std::result::Result<ToolCall, String> {
    let mut value: serde_json::Value = serde_json::from_str(json_str).map_err(|e| e.to_string())?;

    if let Some(obj) = value.as_object_mut() {
        let bare = match obj.get("arguments") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => obj.get("input").and_then(|v| v.as_str()).map(ToString::to_string),
        };
        if let Some(input) = bare {
            let mut arguments = serde_json::Map::new();
            arguments.insert(INPUT_PARAM.into(), serde_json::Value::String(input));
            obj.insert("arguments".into(), serde_json::Value::Object(arguments));
        }
    }

    let mut call: ToolCall = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if call.name.trim().is_empty() {
        return Err("tool name is empty".into());
    }
    if call.id.is_none() {
        call.id = Some(uuid::Uuid::new_v4().to_string());
    }
    Ok(call)
}

#[async_trait]
impl ReasoningEngine for Agent {
    async fn run(&self, utterance: &str, tools: &ToolRegistry, history: &[Message]) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.build_system_prompt(tools)));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(utterance));

        tracing::debug!(
            history = history.len(),
            estimated_tokens = message::estimate_tokens(&messages),
            "Starting reasoning loop"
        );

        let mut iterations = 0;

        loop {
            iterations += 1;

            if iterations > self.config.max_iterations {
                return Err(AgentError::MaxIterations(self.config.max_iterations));
            }

            let completion = self
                .provider
                .complete(&messages, &self.config.generation)
                .await?;

            if completion.truncated() {
                tracing::warn!(iteration = iterations, model = %completion.model, "Model reply was cut off at the token limit");
            }

            let content = completion.content.trim().to_string();
            tracing::debug!(iteration = iterations, reply = %content, "Model reply");

            match Self::parse_step(&content) {
                Step::Answer => return Ok(content),
                Step::Call(tool_call) => {
                    tracing::debug!(tool = %tool_call.name, input = ?tool_call.input(), "Executing tool");

                    let result = Self::execute_tool(tools, &tool_call).await;
                    messages.push(Message::assistant(content));
                    messages.push(Message::tool(Self::format_tool_result(&result), tool_call.id.clone()));
                }
                Step::Malformed(reason) => {
                    if !self.config.handle_parsing_errors {
                        return Err(AgentError::Parse(reason));
                    }

                    tracing::debug!(%reason, "Malformed tool request, asking the model to retry");
                    messages.push(Message::assistant(content));
                    messages.push(Message::tool(format!("{PARSE_ERROR_HINT}\nParser said: {reason}"), None));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::provider::Completion;
    use crate::tool::{ParameterSchema, Tool, ToolSchema};
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(ToString::to_string).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request(&self, idx: usize) -> Vec<Message> {
            self.requests.lock().unwrap()[idx].clone()
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
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

        async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
            self.requests.lock().unwrap().push(messages.to_vec());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AgentError::ProviderUnavailable("script exhausted".into()))?;
            Ok(Completion::text(reply, options.model.clone()))
        }
    }

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "upper".into(),
                description: "Uppercases text".into(),
                parameters: vec![ParameterSchema::input("Text")],
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
            Ok(ToolResult::success("upper", call.input().unwrap_or_default().to_uppercase()))
        }
    }

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(UpperTool).unwrap();
        tools
    }

    fn agent(provider: &Arc<ScriptedProvider>, config: AgentConfig) -> Agent {
        let provider: Arc<dyn LlmProvider> = provider.clone();
        Agent::new(provider, config)
    }

    #[tokio::test]
    async fn direct_answer_needs_one_call() {
        let provider = ScriptedProvider::new(&["Hello there!"]);
        let agent = agent(&provider, AgentConfig::default());

        let answer = agent.run("Hi", &registry(), &[]).await.unwrap();
        assert_eq!(answer, "Hello there!");

        let request = provider.request(0);
        assert_eq!(request.len(), 2);
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains("### upper"));
        assert_eq!(request[1].content, "Hi");
    }

    #[tokio::test]
    async fn history_is_replayed_in_order() {
        let provider = ScriptedProvider::new(&["Yes."]);
        let agent = agent(&provider, AgentConfig::default());
        let history = vec![Message::user("first"), Message::assistant("one")];

        agent.run("second", &registry(), &history).await.unwrap();

        let contents: Vec<_> = provider.request(0).iter().skip(1).map(|m| m.content.clone()).collect();
        assert_eq!(contents, ["first", "one", "second"]);
    }

    #[tokio::test]
    async fn tool_round_trip() {
        let provider = ScriptedProvider::new(&[
            "```tool\n{\"tool\": \"upper\", \"arguments\": {\"input\": \"ada\"}}\n```",
            "The tool says ADA.",
        ]);
        let agent = agent(&provider, AgentConfig::default());

        let answer = agent.run("shout ada", &registry(), &[]).await.unwrap();
        assert_eq!(answer, "The tool says ADA.");

        let second = provider.request(1);
        let observation = second.last().unwrap();
        assert_eq!(observation.role, Role::Tool);
        assert_eq!(observation.content, "[Tool 'upper' returned]\nADA");
        assert!(observation.tool_call_id.is_some());
    }

    #[tokio::test]
    async fn string_arguments_and_inline_json_are_accepted() {
        let provider = ScriptedProvider::new(&[
            r#"{"tool": "upper", "arguments": "babbage"}"#,
            "Done.",
        ]);
        let agent = agent(&provider, AgentConfig::default());

        agent.run("shout", &registry(), &[]).await.unwrap();
        assert!(provider.request(1).last().unwrap().content.ends_with("BABBAGE"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_an_observation() {
        let provider = ScriptedProvider::new(&[
            "```tool\n{\"tool\": \"search\", \"arguments\": {\"input\": \"x\"}}\n```",
            "Sorry, I cannot search.",
        ]);
        let agent = agent(&provider, AgentConfig::default());

        let answer = agent.run("find x", &registry(), &[]).await.unwrap();
        assert_eq!(answer, "Sorry, I cannot search.");
        let observation = provider.request(1).last().unwrap().content.clone();
        assert_eq!(observation, "[Tool 'search' failed]\nError: Unknown tool: search");
    }

    #[tokio::test]
    async fn malformed_block_is_retried_when_enabled() {
        let provider = ScriptedProvider::new(&["```tool\n{not json}\n```", "Plain answer."]);
        let agent = agent(&provider, AgentConfig::default());

        let answer = agent.run("q", &registry(), &[]).await.unwrap();
        assert_eq!(answer, "Plain answer.");
        assert!(provider.request(1).last().unwrap().content.starts_with("Could not parse the tool request"));
    }

    #[tokio::test]
    async fn malformed_block_fails_when_disabled() {
        let provider = ScriptedProvider::new(&["```tool\n{not json}\n```"]);
        let config = AgentConfig {
            handle_parsing_errors: false,
            ..Default::default()
        };
        let agent = agent(&provider, config);

        let err = agent.run("q", &registry(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
    }

    #[tokio::test]
    async fn iteration_limit_is_enforced() {
        let call = "```tool\n{\"tool\": \"upper\", \"arguments\": {\"input\": \"a\"}}\n```";
        let provider = ScriptedProvider::new(&[call, call, call]);
        let config = AgentConfig {
            max_iterations: 2,
            ..Default::default()
        };
        let agent = agent(&provider, config);

        let err = agent.run("loop", &registry(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(2)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let provider = ScriptedProvider::new(&[]);
        let agent = agent(&provider, AgentConfig::default());

        let err = agent.run("q", &registry(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
    }

    #[test]
    fn flags_parse() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
