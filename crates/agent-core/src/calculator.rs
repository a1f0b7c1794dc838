//! Calculator Tool
//!
//! Answers free-text math questions. Plain expressions are evaluated
//! directly; anything else is translated into an expression by a single
//! provider completion and then evaluated locally. The translation call goes
//! straight to the provider with no tools attached, so it never re-enters
//! the reasoning loop.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::math;
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{ParameterSchema, Tool, ToolCall, ToolResult, ToolSchema};

pub const CALCULATOR_TOOL: &str = "Calculator";

const TRANSLATE_PROMPT: &str = r#"Translate a math problem into an expression that can be evaluated by a calculator.
Supported: numbers, + - * / % ^ (or **), parentheses, pi, e, and the functions sqrt, abs, sin, cos, tan, exp, ln, log10, floor, ceil, round.

Use the following format:

Question: ${Question with math problem.}
```text
${single line mathematical expression that solves the problem}
```
...calculator output...
Answer: ${Answer}

Begin.

Question: What is 37593 * 67?
```text
37593 * 67
```
...calculator output...
Answer: 2518731

Question: 37593^(1/5)
```text
37593**(1/5)
```
...calculator output...
Answer: 8.222831614237718

Question: {question}
"#;

pub struct CalculatorTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl CalculatorTool {
    pub fn new(provider: Arc<dyn LlmProvider>, options: &GenerationOptions) -> Self {
        Self {
            provider,
            options: options.deterministic().with_stop("...calculator output..."),
        }
    }

    async fn solve(&self, question: &str) -> Result<String> {
        if let Ok(value) = math::evaluate(question) {
            return Ok(format!("Answer: {}", math::format_number(value)));
        }

        let prompt = TRANSLATE_PROMPT.replace("{question}", question);
        let completion = self
            .provider
            .complete(&[Message::user(prompt)], &self.options)
            .await?;

        tracing::debug!(question, reply = %completion.content, "Calculator translation");
        interpret_reply(&completion.content)
    }
}

/// Turn the model's translation into a final answer
fn interpret_reply(reply: &str) -> Result<String> {
    let reply = reply.trim();

    if let Some(expression) = extract_text_block(reply) {
        return math::evaluate(expression)
            .map(|value| format!("Answer: {}", math::format_number(value)))
            .map_err(|e| {
                AgentError::tool_execution(CALCULATOR_TOOL, format!("could not evaluate \"{expression}\": {e}"))
            });
    }

    if reply.starts_with("Answer:") {
        return Ok(reply.to_string());
    }
    if let Some(idx) = reply.find("\nAnswer:") {
        return Ok(reply[idx + 1..].trim().to_string());
    }

    Err(AgentError::tool_execution(
        CALCULATOR_TOOL,
        format!("unknown format from LLM: {reply}"),
    ))
}

fn extract_text_block(reply: &str) -> Option<&str> {
    let marker = "```text";
    let start = reply.find(marker)? + marker.len();
    let rest = &reply[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    let expression = rest[..end].trim();
    (!expression.is_empty()).then_some(expression)
}

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: CALCULATOR_TOOL.into(),
            description: "Useful for when you need to answer questions about math. Input should be a math question or expression.".into(),
            parameters: vec![ParameterSchema::input(
                "The math question or expression to solve (e.g., '17 * 4', 'square root of 2')",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let question = call
            .input()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AgentError::ToolValidation("Missing math question".into()))?;

        match self.solve(question).await {
            Ok(answer) => Ok(ToolResult::success(CALCULATOR_TOOL, answer)),
            Err(AgentError::ToolExecution { message, .. }) => Ok(ToolResult::failure(CALCULATOR_TOOL, message)),
            Err(e) => Err(e),
        }
    }
}
