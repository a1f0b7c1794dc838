//! Tool System
//!
//! Tools are registered once at startup and invoked by the reasoning loop.
//! The registry keeps registration order, which is also the order tools are
//! presented to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Name of the single free-text argument every built-in tool takes
pub const INPUT_PARAM: &str = "input";

/// Tool call request from the LLM
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    /// Call with a single `input` argument
    pub fn with_input(name: impl Into<String>, input: impl Into<String>) -> Self {
        let mut arguments = HashMap::new();
        arguments.insert(INPUT_PARAM.to_string(), serde_json::Value::String(input.into()));
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    /// The `input` argument as text
    pub fn input(&self) -> Option<&str> {
        self.arguments.get(INPUT_PARAM).and_then(|v| v.as_str())
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    /// The required free-text `input` parameter
    pub fn input(description: impl Into<String>) -> Self {
        Self {
            name: INPUT_PARAM.into(),
            param_type: "string".into(),
            description: description.into(),
            required: true,
        }
    }
}

/// What the model is told about a tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Name the model uses to call the tool; unique within a registry
    pub name: String,
    pub description: String,

    pub parameters: Vec<ParameterSchema>,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Ordered registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(String, Arc<dyn Tool>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_boxed(Arc::new(tool))
    }

    /// Register a shared tool. Fails without modifying the registry if the
    /// name is already taken.
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.schema().name;
        if self.contains(&name) {
            return Err(AgentError::DuplicateTool(name));
        }

        tracing::debug!(tool = %name, "Registered tool");
        self.tools.push((name, tool));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|(n, _)| n == name)
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, tool)| Arc::clone(tool))
    }

    /// Execute a tool call
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        tool.validate(call)?;

        tool.execute(call).await
    }

    /// Run a tool with its single text argument and return its output text.
    ///
    /// Lookup and argument validation errors are returned as they are;
    /// anything the tool itself raises or reports comes back as
    /// `ToolExecution`.
    pub async fn invoke(&self, name: &str, argument: &str) -> Result<String> {
        let call = ToolCall::with_input(name, argument);
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        tool.validate(&call)?;

        let result = tool.execute(&call).await.map_err(|e| match e {
            e @ AgentError::ToolExecution { .. } => e,
            other => AgentError::tool_execution(name, other.to_string()),
        })?;

        if result.success {
            Ok(result.output)
        } else {
            Err(AgentError::tool_execution(name, result.output))
        }
    }

    /// Get all tool schemas in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|(_, t)| t.schema()).collect()
    }

    /// Get tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Tools\n\n");
        prompt.push_str("Call a tool by replying with exactly one block like this and nothing after it:\n\n");
        prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"input\": \"value\"}}\n```\n\n");

        for schema in self.schemas() {
            let _ = writeln!(prompt, "### {}", schema.name);
            let _ = writeln!(prompt, "{}", schema.description);

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    let _ = writeln!(
                        prompt,
                        "- `{}` ({}){}: {}",
                        param.name, param.param_type, required, param.description
                    );
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
