//! Events emitted by the engine.
//!
//! Two audiences: [`EngineEvent`] is the ordered per-session stream handed to
//! the caller (and serialised onto SSE by the gateway), while [`DomainEvent`]
//! is broadcast on the [`EventBus`] for in-process observers.

use crate::message::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Kind of a caller-facing engine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Thinking,
    ToolCall,
    Response,
    Completed,
    Error,
    HumanInputNeeded,
}

impl EventKind {
    /// Wire name, also used as the SSE `event:` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::ToolCall => "tool_call",
            Self::Response => "response",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::HumanInputNeeded => "human_input_needed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a session's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    /// Machine-readable failure code, only on `error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl EngineEvent {
    pub fn new(kind: EventKind, session_id: &SessionId, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            session_id: session_id.clone(),
            timestamp: Utc::now(),
            code: None,
        }
    }

    pub fn thinking(session_id: &SessionId, content: impl Into<String>) -> Self {
        Self::new(EventKind::Thinking, session_id, content)
    }

    pub fn tool_call(session_id: &SessionId, tool_name: &str) -> Self {
        Self::new(EventKind::ToolCall, session_id, format!("Executing: {tool_name}"))
    }

    pub fn response(session_id: &SessionId, content: impl Into<String>) -> Self {
        Self::new(EventKind::Response, session_id, content)
    }

    pub fn completed(session_id: &SessionId) -> Self {
        Self::new(EventKind::Completed, session_id, "")
    }

    pub fn human_input_needed(session_id: &SessionId, query: impl Into<String>) -> Self {
        Self::new(EventKind::HumanInputNeeded, session_id, query)
    }

    pub fn error(session_id: &SessionId, code: &str, content: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Error, session_id, content);
        event.code = Some(code.to_string());
        event
    }

    /// Whether nothing follows this event in the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Completed | EventKind::Error | EventKind::HumanInputNeeded
        )
    }
}

/// In-process domain events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run started for a session (fresh message or resume)
    SessionStarted {
        session_id: String,
        resumed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A session suspended waiting for a human answer
    SessionSuspended {
        session_id: String,
        query: String,
        timestamp: DateTime<Utc>,
    },

    /// A run ended; `outcome` is "completed", "suspended" or an error code
    SessionFinished {
        session_id: String,
        outcome: String,
        iterations_used: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_event_wire_shape() {
        let sid = SessionId::from("s-1");
        let json = serde_json::to_value(EngineEvent::human_input_needed(&sid, "Proceed?")).unwrap();
        assert_eq!(json["type"], "human_input_needed");
        assert_eq!(json["content"], "Proceed?");
        assert_eq!(json["session_id"], "s-1");
        assert!(json.get("timestamp").is_some());
        assert!(json.get("code").is_none());
    }

    #[test]
    fn error_event_carries_code() {
        let sid = SessionId::from("s-1");
        let event = EngineEvent::error(&sid, "iteration_limit_exceeded", "too many steps");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "iteration_limit_exceeded");
        assert!(event.is_terminal());
    }

    #[test]
    fn kind_names_match_serde() {
        for kind in [
            EventKind::Thinking,
            EventKind::ToolCall,
            EventKind::Response,
            EventKind::Completed,
            EventKind::Error,
            EventKind::HumanInputNeeded,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            session_id: "s".into(),
            tool_name: "web_search".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "web_search");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::SessionFinished {
            session_id: "s".into(),
            outcome: "completed".into(),
            iterations_used: 1,
            timestamp: Utc::now(),
        });
    }
}
