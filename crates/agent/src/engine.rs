//! The engine facade: submit a message, resume after a human answer.
//!
//! Each call takes the session lock, prepares and commits the opening
//! checkpoint, then spawns the run and hands back a stream of events. The
//! lock is held by the spawned run and released when it ends. Dropping the
//! event stream cancels the run.

use crate::dispatch::ToolDispatcher;
use crate::executor::{EventSink, Phase, RunOutcome, SessionCursor, SessionExecutor};
use crate::interrupt::InterruptCoordinator;
use crate::planner::Planner;
use crate::session::{BusyPolicy, SessionGuard, SessionRegistry};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stepvault_config::{AppConfig, BusyPolicyKind};
use stepvault_core::checkpoint::{Checkpoint, CheckpointStore};
use stepvault_core::error::EngineError;
use stepvault_core::event::{DomainEvent, EngineEvent, EventBus};
use stepvault_core::message::SessionId;
use stepvault_core::provider::{Provider, ToolDefinition};
use stepvault_core::tool::ToolRegistry;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A run in progress: its session id and the caller-facing events.
///
/// The stream ends after a terminal event (`completed`, `error` or
/// `human_input_needed`).
#[derive(Debug)]
pub struct SessionRun {
    pub session_id: SessionId,
    pub events: mpsc::Receiver<EngineEvent>,
}

impl SessionRun {
    /// Wait for the run to finish and return every event it emitted.
    pub async fn collect(mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        events
    }
}

pub struct Engine {
    planner: Planner,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn CheckpointStore>,
    event_bus: Arc<EventBus>,
    sessions: SessionRegistry,
    max_iterations: u32,
    tool_timeout: Duration,
    human_tool: String,
    event_buffer: usize,
}

impl Engine {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: ToolRegistry,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            planner: Planner::new(provider, model),
            tools: Arc::new(tools),
            store,
            event_bus: Arc::new(EventBus::default()),
            sessions: SessionRegistry::new(BusyPolicy::Reject),
            max_iterations: 10,
            tool_timeout: Duration::from_secs(30),
            human_tool: stepvault_core::HUMAN_ASSISTANCE_TOOL.into(),
            event_buffer: 64,
        }
    }

    /// Wire up provider, tools and checkpoint store from configuration.
    pub async fn from_config(config: &AppConfig) -> stepvault_core::Result<Self> {
        let router = stepvault_providers::build_from_config(config);
        let provider = router.default().ok_or_else(|| stepvault_core::Error::Config {
            message: format!("provider '{}' is not available", config.default_provider),
        })?;
        let tools = stepvault_tools::build_registry(&config.tools, &config.engine.human_tool_name);
        let store = stepvault_checkpoint::open(&config.checkpoint).await?;

        Ok(Self::new(provider, stepvault_providers::resolve_model(config), tools, store)
            .configure(config))
    }

    /// Apply engine, prompt and sampling settings.
    pub fn configure(self, config: &AppConfig) -> Self {
        let engine = &config.engine;
        let policy = match engine.busy_policy {
            BusyPolicyKind::Reject => BusyPolicy::Reject,
            BusyPolicyKind::Queue => BusyPolicy::Queue {
                timeout: Duration::from_secs(engine.queue_timeout_secs),
            },
        };
        let mut configured = self
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_iterations(engine.max_iterations)
            .with_tool_timeout(Duration::from_secs(engine.tool_timeout_secs))
            .with_busy_policy(policy)
            .with_human_tool(&engine.human_tool_name)
            .with_event_buffer(engine.event_buffer);
        if let Some(prompt) = &config.prompt.system_prompt_override {
            configured = configured.with_system_prompt(prompt);
        }
        configured
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.sessions = SessionRegistry::new(policy);
        self
    }

    pub fn with_human_tool(mut self, name: impl Into<String>) -> Self {
        self.human_tool = name.into();
        self.planner = self.planner.with_human_tool(&self.human_tool);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.planner = self.planner.with_temperature(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.planner = self.planner.with_max_tokens(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.planner = self.planner.with_system_prompt(prompt);
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// The tool catalog offered to the planner.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.tools.catalog()
    }

    pub fn model(&self) -> &str {
        self.planner.model()
    }

    pub fn provider_name(&self) -> &str {
        self.planner.provider_name()
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    /// Latest checkpoint for a session.
    pub async fn snapshot(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, EngineError> {
        Ok(self.store.get(session_id).await?)
    }

    /// Every session with a stored checkpoint.
    pub async fn sessions(&self) -> Result<Vec<SessionId>, EngineError> {
        Ok(self.store.list().await?)
    }

    /// Drop a session's checkpoint. Refused while the session is executing.
    pub async fn forget(&self, session_id: &SessionId) -> Result<bool, EngineError> {
        let _guard = self.sessions.acquire(session_id).await?;
        Ok(self.store.delete(session_id).await?)
    }

    /// Start a new task for `session_id`, or for a fresh session if `None`.
    ///
    /// Fails before spawning anything if the session is busy, waiting on a
    /// human answer, or the store is unavailable.
    pub async fn submit(
        &self,
        session_id: Option<SessionId>,
        message: &str,
    ) -> Result<SessionRun, EngineError> {
        let session_id = session_id.unwrap_or_default();
        let guard = self.sessions.acquire(&session_id).await?;

        let mut cursor = match self.store.get(&session_id).await? {
            Some(checkpoint) if checkpoint.state.is_suspended() => {
                return Err(EngineError::InterruptPending(session_id.to_string()));
            }
            Some(checkpoint) => SessionCursor::from_checkpoint(checkpoint),
            None => SessionCursor::fresh(session_id.clone(), self.max_iterations),
        };
        cursor.state.begin_task(message);
        cursor.state.max_iterations = self.max_iterations;
        cursor.commit(self.store.as_ref()).await?;

        info!(session_id = %session_id, "Task submitted");
        Ok(self.spawn(guard, cursor, Phase::Planning, "Processing your request...", false))
    }

    /// Answer a suspended session's human-assistance request and continue.
    ///
    /// A session that does not exist or is not suspended yields
    /// `SessionNotFound` and is left untouched.
    pub async fn resume(
        &self,
        session_id: &SessionId,
        answer: &str,
    ) -> Result<SessionRun, EngineError> {
        let guard = self.sessions.acquire(session_id).await?;

        let checkpoint = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let mut cursor = SessionCursor::from_checkpoint(checkpoint);
        InterruptCoordinator::resume(&mut cursor.state, session_id, answer)?;
        cursor.commit(self.store.as_ref()).await?;

        info!(session_id = %session_id, "Session resumed");
        Ok(self.spawn(guard, cursor, Phase::Observing, "Processing your response...", true))
    }

    fn executor(&self) -> SessionExecutor {
        SessionExecutor {
            planner: self.planner.clone(),
            tools: self.tools.clone(),
            dispatcher: ToolDispatcher::new(
                self.tools.clone(),
                self.tool_timeout,
                self.event_bus.clone(),
            ),
            store: self.store.clone(),
            event_bus: self.event_bus.clone(),
            human_tool: self.human_tool.clone(),
        }
    }

    fn spawn(
        &self,
        guard: SessionGuard,
        mut cursor: SessionCursor,
        start: Phase,
        opening: &'static str,
        resumed: bool,
    ) -> SessionRun {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let session_id = cursor.session_id.clone();
        let sink = EventSink::new(session_id.clone(), tx);
        let executor = self.executor();

        self.event_bus.publish(DomainEvent::SessionStarted {
            session_id: session_id.to_string(),
            resumed,
            timestamp: Utc::now(),
        });

        let run_id = session_id.clone();
        tokio::spawn(async move {
            sink.emit(EngineEvent::thinking(&run_id, opening)).await;

            tokio::select! {
                outcome = executor.run(&mut cursor, start, &sink) => {
                    if let RunOutcome::Failed(e) = &outcome {
                        warn!(session_id = %run_id, code = e.code(), "Run ended with error");
                    }
                }
                _ = sink.closed() => {
                    warn!(session_id = %run_id, "Caller went away; run cancelled");
                }
            }
            // unlock before the event stream closes
            SessionRegistry::release(guard);
        });

        SessionRun {
            session_id,
            events: rx,
        }
    }
}
