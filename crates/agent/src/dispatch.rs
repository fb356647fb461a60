//! Tool dispatch policy.
//!
//! A planning step may request several tools at once. Ordinary tools run
//! concurrently; a human-assistance request pre-empts the whole batch. The
//! policy itself is a set of pure functions over the requested calls, and
//! [`ToolDispatcher`] executes whatever batch the policy lets through.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stepvault_core::event::{DomainEvent, EventBus};
use stepvault_core::message::SessionId;
use stepvault_core::tool::{ToolCall, ToolInvocationResult, ToolOutcome, ToolRegistry};
use tracing::{debug, warn};

/// What to do with one planning step's requests.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchDecision {
    /// Execute every call concurrently.
    Parallel(Vec<ToolCall>),
    /// Suspend on `request`; `discarded` are dropped for this step.
    Interrupt {
        request: ToolCall,
        discarded: Vec<ToolCall>,
    },
}

/// Split calls into (human-assistance, other), preserving order.
pub fn partition(calls: &[ToolCall], human_tool: &str) -> (Vec<ToolCall>, Vec<ToolCall>) {
    calls.iter().cloned().partition(|c| c.name == human_tool)
}

/// The question carried by a human-assistance call.
pub fn human_query(call: &ToolCall) -> String {
    match &call.arguments {
        serde_json::Value::String(s) => s.clone(),
        args => match args.get("query").and_then(|q| q.as_str()) {
            Some(q) => q.to_string(),
            None => args.to_string(),
        },
    }
}

/// Collapse human-assistance calls into one.
///
/// A single call is returned unchanged. Several calls become one call with
/// the first call's id and all queries joined by `"; "`.
pub fn merge_human_requests(calls: &[ToolCall]) -> Option<ToolCall> {
    let first = calls.first()?;
    if calls.len() == 1 {
        return Some(first.clone());
    }
    let query = calls.iter().map(human_query).collect::<Vec<_>>().join("; ");
    Some(ToolCall {
        id: first.id.clone(),
        name: first.name.clone(),
        arguments: serde_json::json!({ "query": query }),
    })
}

/// Apply the dispatch policy to one step's requests.
pub fn decide(calls: &[ToolCall], human_tool: &str) -> DispatchDecision {
    let (human, other) = partition(calls, human_tool);
    match merge_human_requests(&human) {
        Some(request) => DispatchDecision::Interrupt {
            request,
            discarded: other,
        },
        None => DispatchDecision::Parallel(other),
    }
}

/// Runs a batch of tool calls concurrently, each under its own deadline.
#[derive(Clone)]
pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
    event_bus: Arc<EventBus>,
}

impl ToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>, timeout: Duration, event_bus: Arc<EventBus>) -> Self {
        Self {
            tools,
            timeout,
            event_bus,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `calls`, returning one result per call sorted by id.
    ///
    /// Failures and timeouts become error outcomes for their own id only.
    pub async fn execute(
        &self,
        session_id: &SessionId,
        calls: &[ToolCall],
    ) -> Vec<ToolInvocationResult> {
        let futures = calls.iter().map(|call| async move {
            let start = Instant::now();
            let result = self.tools.invoke(call, self.timeout).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let outcome = ToolOutcome::from(result);
            match &outcome {
                ToolOutcome::Success(_) => {
                    debug!(session_id = %session_id, tool = %call.name, duration_ms, "Tool succeeded")
                }
                ToolOutcome::Error(e) => {
                    warn!(session_id = %session_id, tool = %call.name, duration_ms, error = %e, "Tool failed")
                }
            }

            self.event_bus.publish(DomainEvent::ToolExecuted {
                session_id: session_id.to_string(),
                tool_name: call.name.clone(),
                success: !outcome.is_error(),
                duration_ms,
                timestamp: Utc::now(),
            });

            ToolInvocationResult {
                id: call.id.clone(),
                name: call.name.clone(),
                outcome,
            }
        });

        let mut results = join_all(futures).await;
        results.sort_by(|a, b| a.id.cmp(&b.id));
        results
    }
}
