//! The plan/act state machine for one session run.
//!
//! A run starts either in `Planning` (fresh message) or `Observing` (after a
//! human answer) and ends in `Completed`, `Suspended` or `Failed`. Every
//! transition that changes persisted state commits a checkpoint before the
//! matching event is emitted, so anything a caller has seen survives a crash.

use crate::dispatch::{self, DispatchDecision, ToolDispatcher};
use crate::interrupt::InterruptCoordinator;
use crate::planner::{PlanOutcome, Planner, to_message_call};
use chrono::Utc;
use std::sync::Arc;
use stepvault_core::checkpoint::{Checkpoint, CheckpointStore};
use stepvault_core::error::EngineError;
use stepvault_core::event::{DomainEvent, EngineEvent, EventBus};
use stepvault_core::message::{Message, SessionId};
use stepvault_core::state::ConversationState;
use stepvault_core::tool::{ToolCall, ToolOutcome, ToolRegistry};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where a run is in the plan/act cycle.
#[derive(Debug)]
pub enum Phase {
    Planning,
    Dispatching {
        calls: Vec<ToolCall>,
        plan: Option<String>,
    },
    Observing,
    Suspended,
    Completed,
    Failed(EngineError),
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Suspended,
    Failed(EngineError),
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Suspended => "suspended",
            Self::Failed(e) => e.code(),
        }
    }
}

/// A session's in-flight state plus the checkpoint version it extends.
pub struct SessionCursor {
    pub session_id: SessionId,
    pub version: Option<u64>,
    pub state: ConversationState,
}

impl SessionCursor {
    pub fn fresh(session_id: SessionId, max_iterations: u32) -> Self {
        Self {
            session_id,
            version: None,
            state: ConversationState::new(max_iterations),
        }
    }

    pub fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            session_id: checkpoint.session_id,
            version: Some(checkpoint.step),
            state: checkpoint.state,
        }
    }

    /// Persist the current state as the next version.
    ///
    /// Fails with a conflict if the stored version moved underneath us.
    pub async fn commit(&mut self, store: &dyn CheckpointStore) -> Result<(), EngineError> {
        let step = self.version.map_or(0, |v| v + 1);
        let checkpoint = Checkpoint::new(self.session_id.clone(), step, self.state.clone());
        store.put_if_version(checkpoint, self.version).await?;
        self.version = Some(step);
        debug!(session_id = %self.session_id, step, "Checkpoint committed");
        Ok(())
    }
}

/// Sends caller-facing events for one run.
///
/// A closed receiver is not an error here; the run is cancelled separately
/// when the caller goes away.
#[derive(Clone)]
pub struct EventSink {
    session_id: SessionId,
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSink {
    pub fn new(session_id: SessionId, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).await.is_err() {
            debug!(session_id = %self.session_id, "Event receiver dropped");
        }
    }

    /// Resolves once the caller has dropped its receiver.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Everything a run needs, cloned out of the engine per run.
#[derive(Clone)]
pub struct SessionExecutor {
    pub(crate) planner: Planner,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) human_tool: String,
}

impl SessionExecutor {
    /// Drive the state machine from `start` until a terminal phase.
    pub async fn run(&self, cursor: &mut SessionCursor, start: Phase, sink: &EventSink) -> RunOutcome {
        let mut phase = start;
        loop {
            phase = match phase {
                Phase::Planning => self.plan_step(cursor, sink).await,
                Phase::Dispatching { calls, plan } => {
                    self.dispatch_step(cursor, calls, plan, sink).await
                }
                Phase::Observing => Phase::Planning,
                Phase::Suspended => return self.finish(cursor, RunOutcome::Suspended),
                Phase::Completed => return self.finish(cursor, RunOutcome::Completed),
                Phase::Failed(err) => {
                    warn!(session_id = %cursor.session_id, error = %err, "Run failed");
                    sink.emit(EngineEvent::error(
                        &cursor.session_id,
                        err.code(),
                        err.to_string(),
                    ))
                    .await;
                    return self.finish(cursor, RunOutcome::Failed(err));
                }
            };
        }
    }

    fn finish(&self, cursor: &SessionCursor, outcome: RunOutcome) -> RunOutcome {
        info!(
            session_id = %cursor.session_id,
            outcome = outcome.label(),
            iterations = cursor.state.iterations_used,
            "Run finished"
        );
        self.event_bus.publish(DomainEvent::SessionFinished {
            session_id: cursor.session_id.to_string(),
            outcome: outcome.label().to_string(),
            iterations_used: cursor.state.iterations_used,
            timestamp: Utc::now(),
        });
        outcome
    }

    async fn plan_step(&self, cursor: &mut SessionCursor, sink: &EventSink) -> Phase {
        let state = &mut cursor.state;
        state.iterations_used += 1;
        if state.iterations_used > state.max_iterations {
            return Phase::Failed(EngineError::IterationLimitExceeded {
                max_iterations: state.max_iterations,
            });
        }

        debug!(
            session_id = %cursor.session_id,
            iteration = state.iterations_used,
            max = state.max_iterations,
            "Planning"
        );

        let outcome = match self.planner.plan(state, &self.tools.catalog()).await {
            Ok(outcome) => outcome,
            Err(e) => return Phase::Failed(EngineError::PlanningFailure(e)),
        };

        match outcome {
            PlanOutcome::Answer(text) => {
                state.messages.push(Message::assistant(&text));
                state.task_completed = true;
                if let Err(e) = cursor.commit(self.store.as_ref()).await {
                    return Phase::Failed(e);
                }
                sink.emit(EngineEvent::response(&cursor.session_id, text)).await;
                sink.emit(EngineEvent::completed(&cursor.session_id)).await;
                Phase::Completed
            }
            PlanOutcome::Invocations { calls, plan } => {
                if let Some(plan) = &plan {
                    state.task_plan = Some(plan.clone());
                }
                Phase::Dispatching { calls, plan }
            }
        }
    }

    async fn dispatch_step(
        &self,
        cursor: &mut SessionCursor,
        calls: Vec<ToolCall>,
        plan: Option<String>,
        sink: &EventSink,
    ) -> Phase {
        let content = plan.unwrap_or_default();

        match dispatch::decide(&calls, &self.human_tool) {
            DispatchDecision::Interrupt { request, discarded } => {
                if !discarded.is_empty() {
                    info!(
                        session_id = %cursor.session_id,
                        discarded = ?discarded.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                        "Human assistance requested; dropping other tool calls this step"
                    );
                }

                cursor
                    .state
                    .messages
                    .push(Message::assistant_with_calls(content, vec![to_message_call(&request)]));
                let pending = InterruptCoordinator::suspend(&mut cursor.state, &request);
                if let Err(e) = cursor.commit(self.store.as_ref()).await {
                    return Phase::Failed(e);
                }

                self.event_bus.publish(DomainEvent::SessionSuspended {
                    session_id: cursor.session_id.to_string(),
                    query: pending.query.clone(),
                    timestamp: Utc::now(),
                });
                sink.emit(EngineEvent::human_input_needed(&cursor.session_id, pending.query))
                    .await;
                Phase::Suspended
            }
            DispatchDecision::Parallel(batch) => {
                let results = self.dispatcher.execute(&cursor.session_id, &batch).await;

                let state = &mut cursor.state;
                state.messages.push(Message::assistant_with_calls(
                    content,
                    batch.iter().map(to_message_call).collect(),
                ));
                for result in &results {
                    let message = match &result.outcome {
                        ToolOutcome::Success(output) => Message::tool_result(&result.id, output),
                        ToolOutcome::Error(e) => Message::tool_error(&result.id, e),
                    };
                    state.messages.push(message);
                }
                state.current_step += 1;

                if let Err(e) = cursor.commit(self.store.as_ref()).await {
                    return Phase::Failed(e);
                }
                for result in &results {
                    sink.emit(EngineEvent::tool_call(&cursor.session_id, &result.name))
                        .await;
                }
                Phase::Observing
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        CountingTool, SequentialMockProvider, make_text_response, make_tool_call_response,
        make_wire_call,
    };
    use serde_json::json;
    use std::time::Duration;
    use stepvault_checkpoint::InMemoryCheckpointStore;
    use stepvault_core::event::EventKind;

    fn executor(provider: SequentialMockProvider, tools: ToolRegistry) -> (SessionExecutor, InMemoryCheckpointStore) {
        let store = InMemoryCheckpointStore::new();
        let bus = Arc::new(EventBus::default());
        let tools = Arc::new(tools);
        let executor = SessionExecutor {
            planner: Planner::new(Arc::new(provider), "mock-model"),
            dispatcher: ToolDispatcher::new(tools.clone(), Duration::from_secs(5), bus.clone()),
            tools,
            store: Arc::new(store.clone()),
            event_bus: bus,
            human_tool: "human_assistance".into(),
        };
        (executor, store)
    }

    async fn started(store: &InMemoryCheckpointStore, task: &str) -> SessionCursor {
        let mut cursor = SessionCursor::fresh(SessionId::from("s"), 5);
        cursor.state.begin_task(task);
        cursor.commit(store).await.unwrap();
        cursor
    }

    async fn drive(executor: &SessionExecutor, cursor: &mut SessionCursor, start: Phase) -> (RunOutcome, Vec<EventKind>) {
        let (tx, mut rx) = mpsc::channel(32);
        let sink = EventSink::new(cursor.session_id.clone(), tx);
        let outcome = executor.run(cursor, start, &sink).await;
        drop(sink);
        let mut kinds = vec![];
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind);
        }
        (outcome, kinds)
    }

    #[tokio::test]
    async fn each_transition_bumps_the_version() {
        let counter = CountingTool::new("lookup");
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(counter.clone()));
        let (executor, store) = executor(
            SequentialMockProvider::new(vec![
                make_tool_call_response(vec![make_wire_call("c1", "lookup", json!({}))], ""),
                make_text_response("done"),
            ]),
            tools,
        );
        let mut cursor = started(&store, "go").await;

        let (outcome, kinds) = drive(&executor, &mut cursor, Phase::Planning).await;

        assert!(matches!(outcome, RunOutcome::Completed));
        assert_eq!(kinds, vec![EventKind::ToolCall, EventKind::Response, EventKind::Completed]);
        assert_eq!(counter.calls(), 1);
        let stored = store.get(&SessionId::from("s")).await.unwrap().unwrap();
        assert_eq!(stored.step, 2);
        assert_eq!(stored.state, cursor.state);
    }

    #[tokio::test]
    async fn conflicting_writer_fails_the_run() {
        let (executor, store) = executor(
            SequentialMockProvider::new(vec![make_text_response("done")]),
            ToolRegistry::new(),
        );
        let mut cursor = started(&store, "go").await;

        // Someone else advances the stored version.
        let stored = store.get(&cursor.session_id).await.unwrap().unwrap();
        store.put(stored.next(stored.state.clone())).await.unwrap();

        let (outcome, kinds) = drive(&executor, &mut cursor, Phase::Planning).await;
        assert!(matches!(outcome, RunOutcome::Failed(EngineError::Store(_))));
        assert_eq!(kinds, vec![EventKind::Error]);
    }

    #[tokio::test]
    async fn observing_goes_back_to_planning() {
        let (executor, store) = executor(
            SequentialMockProvider::new(vec![make_text_response("after")]),
            ToolRegistry::new(),
        );
        let mut cursor = started(&store, "go").await;

        let (outcome, _) = drive(&executor, &mut cursor, Phase::Observing).await;
        assert!(matches!(outcome, RunOutcome::Completed));
        assert_eq!(cursor.state.last_assistant_text(), Some("after"));
    }

    #[tokio::test]
    async fn plan_text_is_recorded() {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(CountingTool::new("lookup")));
        let (executor, store) = executor(
            SequentialMockProvider::new(vec![
                make_tool_call_response(
                    vec![make_wire_call("c1", "lookup", json!({}))],
                    "1. look up 2. answer",
                ),
                make_text_response("done"),
            ]),
            tools,
        );
        let mut cursor = started(&store, "go").await;

        drive(&executor, &mut cursor, Phase::Planning).await;
        assert_eq!(cursor.state.task_plan.as_deref(), Some("1. look up 2. answer"));
        assert_eq!(cursor.state.current_step, 1);
        assert_eq!(cursor.state.iterations_used, 2);
    }
}
