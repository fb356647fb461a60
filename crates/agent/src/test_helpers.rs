//! Shared test helpers: scripted providers and instrumented tools.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepvault_core::error::{ProviderError, ToolError};
use stepvault_core::message::{Message, MessageToolCall};
use stepvault_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use stepvault_core::tool::{Tool, ToolResult};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let n = requests.len();
        if n >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{n}, have {})",
                responses.len()
            );
        }
        requests.push(request);
        Ok(responses[n].clone())
    }
}

/// Returns the same response forever.
pub struct RepeatingProvider {
    response: ProviderResponse,
    calls: AtomicUsize,
}

impl RepeatingProvider {
    pub fn new(response: ProviderResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for RepeatingProvider {
    fn name(&self) -> &str {
        "repeating_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Always fails as an unavailable backend would.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 503,
            message: "backend unavailable".into(),
        })
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional plan text.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls(thought, tool_calls),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A tool call as the provider would send it.
pub fn make_wire_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A human-assistance call as the provider would send it.
pub fn make_human_call(id: &str, query: &str) -> MessageToolCall {
    make_wire_call(id, "human_assistance", serde_json::json!({ "query": query }))
}

/// Sleeps, then returns a fixed output. Counts completed runs.
#[derive(Clone)]
pub struct DelayTool {
    name: String,
    delay: Duration,
    output: String,
    finished: Arc<AtomicUsize>,
}

impl DelayTool {
    pub fn new(name: &str, delay: Duration, output: &str) -> Self {
        Self {
            name: name.into(),
            delay,
            output: output.into(),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Waits, then answers"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: self.output.clone(),
            data: None,
        })
    }
}

pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: "upstream returned 500".into(),
        })
    }
}

/// Echoes its arguments and counts invocations.
#[derive(Clone)]
pub struct CountingTool {
    name: String,
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echoes its arguments"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("{} result for {arguments}", self.name),
            data: Some(arguments),
        })
    }
}
