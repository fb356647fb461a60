//! Human assistance: the reserved tool that suspends a session.
//!
//! The model sees it in the catalog like any other tool, but the engine
//! never executes it: the dispatcher intercepts the call and the session is
//! suspended until a person answers through the resume entry point.

use async_trait::async_trait;
use stepvault_core::error::ToolError;
use stepvault_core::tool::{Tool, ToolResult};

pub struct HumanAssistanceTool {
    name: String,
}

impl HumanAssistanceTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for HumanAssistanceTool {
    fn default() -> Self {
        Self::new(stepvault_core::HUMAN_ASSISTANCE_TOOL)
    }
}

#[async_trait]
impl Tool for HumanAssistanceTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Request assistance from a human. Use this when you need clarification, \
         a decision, or confirmation before continuing."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to ask the human"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::Reserved(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_direct_execution() {
        let tool = HumanAssistanceTool::default();
        let err = tool
            .execute(serde_json::json!({"query": "ok?"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Reserved(name) if name == "human_assistance"));
    }

    #[test]
    fn schema_requires_query() {
        let schema = HumanAssistanceTool::new("ask_person").parameters_schema();
        assert_eq!(schema["required"][0], "query");
        assert_eq!(schema["properties"]["query"]["type"], "string");
    }
}
