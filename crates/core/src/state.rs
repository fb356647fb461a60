//! Per-session execution state.
//!
//! [`ConversationState`] is the unit of execution and persistence: everything
//! the executor needs to continue a session lives here, and nothing else is
//! shared between sessions.

use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// A suspended human-assistance invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// Tool-call id the human answer will be attached to
    pub id: String,
    /// Question posed to the human
    pub query: String,
}

/// Coarse lifecycle of a session as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Task not finished and nothing pending (fresh, mid-task, or failed)
    Idle,
    /// Waiting for a human answer
    Suspended,
    /// Last task completed
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only turn history
    pub messages: Vec<Message>,

    /// Free-form plan text, overwritten each planning step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_plan: Option<String>,

    /// Dispatch rounds completed for the current task
    #[serde(default)]
    pub current_step: u32,

    /// Planning calls made for the current task
    #[serde(default)]
    pub iterations_used: u32,

    pub max_iterations: u32,

    #[serde(default)]
    pub task_completed: bool,

    /// Auxiliary scratch values carried across steps
    #[serde(default)]
    pub pending_data: serde_json::Map<String, serde_json::Value>,

    /// Present iff the session is suspended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,
}

impl ConversationState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            messages: Vec::new(),
            task_plan: None,
            current_step: 0,
            iterations_used: 0,
            max_iterations,
            task_completed: false,
            pending_data: serde_json::Map::new(),
            pending_interrupt: None,
        }
    }

    /// Start a new task: append the user turn and reset the per-task counters.
    ///
    /// History is kept so follow-up questions see earlier turns.
    pub fn begin_task(&mut self, user_message: impl Into<String>) {
        self.messages.push(Message::user(user_message));
        self.task_plan = None;
        self.current_step = 0;
        self.iterations_used = 0;
        self.task_completed = false;
        self.pending_data.clear();
    }

    pub fn is_suspended(&self) -> bool {
        self.pending_interrupt.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_suspended() {
            SessionStatus::Suspended
        } else if self.task_completed {
            SessionStatus::Completed
        } else {
            SessionStatus::Idle
        }
    }

    /// Text of the most recent assistant turn that carried no tool calls.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_calls.is_empty())
            .map(|m| m.content.as_str())
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_task_resets_counters_but_keeps_history() {
        let mut state = ConversationState::new(5);
        state.begin_task("first");
        state.messages.push(Message::assistant("done"));
        state.task_plan = Some("plan".into());
        state.current_step = 2;
        state.iterations_used = 3;
        state.task_completed = true;
        state
            .pending_data
            .insert("k".into(), serde_json::json!(1));

        state.begin_task("second");

        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[2].content, "second");
        assert!(state.task_plan.is_none());
        assert_eq!(state.current_step, 0);
        assert_eq!(state.iterations_used, 0);
        assert!(!state.task_completed);
        assert!(state.pending_data.is_empty());
        assert_eq!(state.max_iterations, 5);
    }

    #[test]
    fn status_reflects_interrupt_and_completion() {
        let mut state = ConversationState::new(3);
        assert_eq!(state.status(), SessionStatus::Idle);

        state.pending_interrupt = Some(PendingInterrupt {
            id: "a".into(),
            query: "ok?".into(),
        });
        assert!(state.is_suspended());
        assert_eq!(state.status(), SessionStatus::Suspended);

        state.pending_interrupt = None;
        state.task_completed = true;
        assert_eq!(state.status(), SessionStatus::Completed);
    }

    #[test]
    fn last_assistant_text_skips_tool_requests() {
        let mut state = ConversationState::new(3);
        state.begin_task("q");
        state.messages.push(Message::assistant("answer one"));
        state.messages.push(Message::assistant_with_calls(
            "",
            vec![crate::message::MessageToolCall {
                id: "c".into(),
                name: "web_search".into(),
                arguments: "{}".into(),
            }],
        ));
        assert_eq!(state.last_assistant_text(), Some("answer one"));
    }

    #[test]
    fn serde_roundtrip_preserves_every_field() {
        let mut state = ConversationState::new(7);
        state.begin_task("hello");
        state.task_plan = Some("1. search".into());
        state.current_step = 1;
        state.iterations_used = 2;
        state
            .pending_data
            .insert("partial".into(), serde_json::json!({"x": [1, 2]}));
        state.pending_interrupt = Some(PendingInterrupt {
            id: "call_0".into(),
            query: "Confirm?".into(),
        });

        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
