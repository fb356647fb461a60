//! Tool trait: the abstraction over external capabilities.
//!
//! Tools are looked up by name. A call either produces a [`ToolResult`] or a
//! [`ToolError`]; the dispatcher folds both into a tagged [`ToolOutcome`] so a
//! failing call is just another observation for the next planning step.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID within one planning step (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Tagged outcome of one invocation: a payload or a captured error description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(String),
    Error(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Success(s) | Self::Error(s) => s,
        }
    }
}

impl From<std::result::Result<ToolResult, ToolError>> for ToolOutcome {
    fn from(result: std::result::Result<ToolResult, ToolError>) -> Self {
        match result {
            Ok(r) if r.success => Self::Success(r.output),
            Ok(r) => Self::Error(r.output),
            Err(e) => Self::Error(e.to_string()),
        }
    }
}

/// `{id, outcome}` pair joined back onto the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

/// The core Tool trait.
///
/// Tools are registered in the [`ToolRegistry`] and must be reentrant: the
/// dispatcher calls them concurrently from many sessions.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All tool definitions, sorted by name so prompts are reproducible.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// The catalog offered to the reasoning capability.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.definitions()
    }

    /// Execute a tool call without a deadline.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let mut result = tool.execute(call.arguments.clone()).await?;
        result.call_id = call.id.clone();
        Ok(result)
    }

    /// Execute a tool call under `timeout`.
    pub async fn invoke(
        &self,
        call: &ToolCall,
        timeout: Duration,
    ) -> std::result::Result<ToolResult, ToolError> {
        match tokio::time::timeout(timeout, self.execute(call)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: text,
                data: None,
            })
        }
    }

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "Never finishes in time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: "late".into(),
                data: None,
            })
        }
    }

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn catalog_is_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SleepyTool));
        registry.register(Box::new(EchoTool));
        let names: Vec<_> = registry.catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "sleepy"]);
        assert_eq!(registry.names(), vec!["echo", "sleepy"]);
    }

    #[tokio::test]
    async fn execute_stamps_call_id() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&call("call_1", "echo", serde_json::json!({"text": "hello world"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute(&call("call_1", "nonexistent", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SleepyTool));
        let err = registry
            .invoke(&call("c", "sleepy", serde_json::json!({})), Duration::from_millis(250))
            .await
            .unwrap_err();
        match err {
            ToolError::Timeout { tool_name, timeout_ms } => {
                assert_eq!(tool_name, "sleepy");
                assert_eq!(timeout_ms, 250);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn outcome_from_result() {
        let ok: ToolOutcome = Ok(ToolResult {
            call_id: "a".into(),
            success: true,
            output: "fine".into(),
            data: None,
        })
        .into();
        assert_eq!(ok, ToolOutcome::Success("fine".into()));

        let soft: ToolOutcome = Ok(ToolResult {
            call_id: "a".into(),
            success: false,
            output: "HTTP 500".into(),
            data: None,
        })
        .into();
        assert!(soft.is_error());

        let hard: ToolOutcome = Err(ToolError::NotFound("ghost".into())).into();
        assert!(hard.is_error());
        assert!(hard.text().contains("ghost"));
    }
}
