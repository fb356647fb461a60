//! Planning: one call to the reasoning provider per step.
//!
//! The planner renders a system prompt carrying the session's scratch state,
//! sends it with the full history and the tool catalog, and classifies the
//! reply as either a final answer or a set of tool invocations.

use std::collections::HashSet;
use std::sync::Arc;
use stepvault_core::error::ProviderError;
use stepvault_core::message::{Message, MessageToolCall};
use stepvault_core::provider::{Provider, ProviderRequest, ToolDefinition};
use stepvault_core::state::ConversationState;
use stepvault_core::tool::ToolCall;
use tracing::debug;

const DEFAULT_PREAMBLE: &str = "\
You are an autonomous agent that completes tasks by planning and calling tools.

CORE PRINCIPLES:
- Work step by step. Each turn, either call the tools you need or give the final answer.
- Tools you call in the same turn run in parallel; only batch calls that do not depend on each other.
- Use tool results already in the conversation instead of calling the same tool again.
- Never invent data a tool or the user has not given you.

HUMAN ASSISTANCE:
- Call {human_tool} when you need information only the user can provide, a decision \
only the user can make, or confirmation before an irreversible action.
- Ask one clear question. Other tools requested in the same turn will not run.

COMPLETION:
- When the task is done, reply with the final answer as plain text and no tool calls.
- If the task cannot be completed, explain why in plain text.";

/// What the provider asked for this step.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// Plain text with no tool requests: the task is complete.
    Answer(String),
    /// Tools to invoke, with any accompanying plan text.
    Invocations {
        calls: Vec<ToolCall>,
        plan: Option<String>,
    },
}

#[derive(Clone)]
pub struct Planner {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    human_tool: String,
    preamble: Option<String>,
}

impl Planner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.1,
            max_tokens: None,
            human_tool: stepvault_core::HUMAN_ASSISTANCE_TOOL.into(),
            preamble: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_human_tool(mut self, name: impl Into<String>) -> Self {
        self.human_tool = name.into();
        self
    }

    /// Replace the built-in instructions. The context block is still appended.
    pub fn with_system_prompt(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Render the system prompt for the current state.
    pub fn system_prompt(&self, state: &ConversationState) -> String {
        let preamble = match &self.preamble {
            Some(p) => p.clone(),
            None => DEFAULT_PREAMBLE.replace("{human_tool}", &self.human_tool),
        };
        let pending = if state.pending_data.is_empty() {
            "none".to_string()
        } else {
            serde_json::Value::Object(state.pending_data.clone()).to_string()
        };
        format!(
            "{preamble}\n\nAVAILABLE CONTEXT:\n\
             - Task plan: {}\n\
             - Current step: {}\n\
             - Pending data: {pending}\n\
             - Iterations used: {}/{}",
            state.task_plan.as_deref().unwrap_or("none yet"),
            state.current_step,
            state.iterations_used,
            state.max_iterations,
        )
    }

    /// Ask the provider for the next step.
    pub async fn plan(
        &self,
        state: &ConversationState,
        catalog: &[ToolDefinition],
    ) -> Result<PlanOutcome, ProviderError> {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(self.system_prompt(state)));
        messages.extend(state.messages.iter().cloned());

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: catalog.to_vec(),
        };

        let response = self.provider.complete(request).await?;
        debug!(
            provider = self.provider.name(),
            model = %response.model,
            tool_calls = response.message.tool_calls.len(),
            "Planner response"
        );

        let message = response.message;
        if message.tool_calls.is_empty() {
            return Ok(PlanOutcome::Answer(message.content));
        }

        let plan = Some(message.content).filter(|c| !c.trim().is_empty());
        Ok(PlanOutcome::Invocations {
            calls: to_tool_calls(&message.tool_calls),
            plan,
        })
    }
}

/// Convert wire tool calls, repairing missing or duplicate ids.
///
/// Arguments that are not valid JSON are kept verbatim as a string.
fn to_tool_calls(calls: &[MessageToolCall]) -> Vec<ToolCall> {
    let mut seen = HashSet::new();
    calls
        .iter()
        .enumerate()
        .map(|(n, tc)| {
            let id = if tc.id.is_empty() || seen.contains(&tc.id) {
                format!("call_{n}")
            } else {
                tc.id.clone()
            };
            seen.insert(id.clone());

            let arguments = if tc.arguments.trim().is_empty() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&tc.arguments)
                    .unwrap_or_else(|_| serde_json::Value::String(tc.arguments.clone()))
            };

            ToolCall {
                id,
                name: tc.name.clone(),
                arguments,
            }
        })
        .collect()
}

/// The wire form of a call, for recording in the assistant turn.
pub fn to_message_call(call: &ToolCall) -> MessageToolCall {
    let arguments = match &call.arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    MessageToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        SequentialMockProvider, make_text_response, make_tool_call_response, make_wire_call,
    };
    use serde_json::json;

    fn state_with(task: &str) -> ConversationState {
        let mut state = ConversationState::new(10);
        state.begin_task(task);
        state
    }

    #[tokio::test]
    async fn plain_text_is_an_answer() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "Paris",
        )]));
        let planner = Planner::new(provider, "mock-model");

        let outcome = planner.plan(&state_with("capital?"), &[]).await.unwrap();
        assert_eq!(outcome, PlanOutcome::Answer("Paris".into()));
    }

    #[tokio::test]
    async fn tool_calls_are_invocations() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_wire_call("c1", "web_search", json!({"query": "x"}))],
            "Search first",
        )]));
        let planner = Planner::new(provider, "mock-model");

        match planner.plan(&state_with("find x"), &[]).await.unwrap() {
            PlanOutcome::Invocations { calls, plan } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "c1");
                assert_eq!(calls[0].arguments, json!({"query": "x"}));
                assert_eq!(plan.as_deref(), Some("Search first"));
            }
            other => panic!("expected invocations, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_carries_system_prompt_history_and_catalog() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response("ok")]));
        let planner = Planner::new(provider.clone(), "m")
            .with_temperature(0.3)
            .with_max_tokens(256);
        let catalog = vec![ToolDefinition {
            name: "web_search".into(),
            description: "search".into(),
            parameters: json!({"type": "object"}),
        }];

        planner.plan(&state_with("hello"), &catalog).await.unwrap();

        let request = provider.last_request().unwrap();
        assert_eq!(request.model, "m");
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.tools, catalog);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.contains("Iterations used: 0/10"));
        assert_eq!(request.messages[1].content, "hello");
    }

    #[test]
    fn system_prompt_renders_scratch_state() {
        let planner = Planner::new(
            Arc::new(SequentialMockProvider::new(vec![])),
            "m",
        )
        .with_human_tool("ask_operator");
        let mut state = state_with("task");
        state.task_plan = Some("1. search 2. answer".into());
        state.current_step = 2;
        state.iterations_used = 3;
        state.pending_data.insert("school".into(), json!("Hilltop"));

        let prompt = planner.system_prompt(&state);
        assert!(prompt.contains("ask_operator"));
        assert!(prompt.contains("Task plan: 1. search 2. answer"));
        assert!(prompt.contains("Current step: 2"));
        assert!(prompt.contains(r#"Pending data: {"school":"Hilltop"}"#));
        assert!(prompt.contains("Iterations used: 3/10"));
    }

    #[test]
    fn override_replaces_preamble_but_keeps_context() {
        let planner = Planner::new(Arc::new(SequentialMockProvider::new(vec![])), "m")
            .with_system_prompt("You register learners.");
        let prompt = planner.system_prompt(&state_with("t"));
        assert!(prompt.starts_with("You register learners."));
        assert!(!prompt.contains("CORE PRINCIPLES"));
        assert!(prompt.contains("Task plan: none yet"));
    }

    #[test]
    fn ids_are_repaired_and_bad_json_kept_raw() {
        let wire = vec![
            MessageToolCall {
                id: String::new(),
                name: "a".into(),
                arguments: "{not json".into(),
            },
            MessageToolCall {
                id: "dup".into(),
                name: "b".into(),
                arguments: String::new(),
            },
            MessageToolCall {
                id: "dup".into(),
                name: "c".into(),
                arguments: "{}".into(),
            },
        ];
        let calls = to_tool_calls(&wire);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arguments, json!("{not json"));
        assert_eq!(calls[1].id, "dup");
        assert_eq!(calls[1].arguments, json!({}));
        assert_eq!(calls[2].id, "call_2");

        assert_eq!(to_message_call(&calls[0]).arguments, "{not json");
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let planner = Planner::new(Arc::new(crate::test_helpers::FailingProvider), "m");
        let err = planner.plan(&state_with("x"), &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 503, .. }));
    }
}
