//! Suspending a session on a human-assistance request and resuming it.

use crate::dispatch::human_query;
use stepvault_core::error::EngineError;
use stepvault_core::message::{Message, SessionId};
use stepvault_core::state::{ConversationState, PendingInterrupt};
use stepvault_core::tool::{ToolCall, ToolInvocationResult, ToolOutcome};

pub struct InterruptCoordinator;

impl InterruptCoordinator {
    /// Mark `state` as waiting on `request`.
    ///
    /// The assistant turn naming `request` must already be in the history so
    /// the answer can be attached to it on resume.
    pub fn suspend(state: &mut ConversationState, request: &ToolCall) -> PendingInterrupt {
        let pending = PendingInterrupt {
            id: request.id.clone(),
            query: human_query(request),
        };
        state.pending_interrupt = Some(pending.clone());
        pending
    }

    /// Attach the human answer as the result of the pending request.
    ///
    /// Fails without touching `state` if nothing is pending.
    pub fn resume(
        state: &mut ConversationState,
        session_id: &SessionId,
        answer: &str,
    ) -> Result<ToolInvocationResult, EngineError> {
        let pending = state
            .pending_interrupt
            .take()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        state.messages.push(Message::tool_result(&pending.id, answer));
        state.current_step += 1;

        Ok(ToolInvocationResult {
            id: pending.id,
            name: stepvault_core::HUMAN_ASSISTANCE_TOOL.into(),
            outcome: ToolOutcome::Success(answer.to_string()),
        })
    }
}
