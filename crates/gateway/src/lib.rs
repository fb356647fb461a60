//! HTTP gateway for StepVault.
//!
//! Endpoints:
//!
//! - `POST /chat/stream`          Start a task, get an SSE stream of engine events
//! - `POST /chat/resume`          Answer a human-assistance request, get SSE
//! - `GET  /session/{id}/state`   Checkpointed state of a session
//! - `GET  /tools`                Tool catalog
//! - `GET  /health`               Liveness and active session count
//!
//! Dropping an SSE connection cancels the run behind it.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use stepvault_agent::{Engine, SessionRun};
use stepvault_core::error::EngineError;
use stepvault_core::message::SessionId;
use stepvault_core::provider::ToolDefinition;
use stepvault_core::state::{PendingInterrupt, SessionStatus};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub engine: Arc<Engine>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the router with every gateway route.
///
/// Layers: CORS restricted to `allowed_origins`, a 1 MB body limit, and
/// HTTP trace logging.
pub fn build_router(state: SharedState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/chat/stream", post(chat_stream_handler))
        .route("/chat/resume", post(chat_resume_handler))
        .route("/session/{id}/state", get(session_state_handler))
        .route("/tools", get(tools_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: stepvault_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let engine = Arc::new(Engine::from_config(&config).await?);
    info!(
        provider = engine.provider_name(),
        model = engine.model(),
        store = engine.store_name(),
        tools = engine.catalog().len(),
        "Engine ready"
    );

    let app = build_router(
        Arc::new(GatewayState { engine }),
        &config.gateway.allowed_origins,
    );

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// An error answered before any SSE stream is opened.
struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message.into(),
                code: "invalid_request".into(),
            },
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::ConcurrentAccessRejected(_) | EngineError::InterruptPending(_) => {
                StatusCode::CONFLICT
            }
            EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %e, "Request failed");
        }
        Self {
            status,
            body: ErrorResponse {
                error: e.to_string(),
                code: e.code().into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    session_id: String,
    human_response: String,
}

fn sse(run: SessionRun) -> Response {
    let stream = ReceiverStream::new(run.events).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().event(event.kind.as_str()).data(data))
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// `POST /chat/stream`: start a task and stream its events.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    // a blank id starts a fresh session, like an absent one
    let session_id = payload
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(SessionId::from);
    info!(
        session_id = session_id.as_ref().map(|s| s.as_str()).unwrap_or("new"),
        message_len = payload.message.len(),
        "chat/stream request"
    );

    let run = state.engine.submit(session_id, &payload.message).await?;
    Ok(sse(run))
}

/// `POST /chat/resume`: answer the pending request and stream the rest.
async fn chat_resume_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ResumeRequest>,
) -> Result<Response, ApiError> {
    let session_id = SessionId::from(payload.session_id.as_str());
    info!(session_id = %session_id, "chat/resume request");

    let run = state
        .engine
        .resume(&session_id, &payload.human_response)
        .await?;
    Ok(sse(run))
}

// ── Session state ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStateResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub has_interrupts: bool,
    pub interrupt_data: Option<PendingInterrupt>,
    pub iterations_used: u32,
    pub max_iterations: u32,
    pub current_step: u32,
    pub task_completed: bool,
    pub step: u64,
}

/// `GET /session/{id}/state`
async fn session_state_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    let session_id = SessionId::from(id.as_str());
    let checkpoint = state
        .engine
        .snapshot(&session_id)
        .await?
        .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;

    let s = checkpoint.state;
    Ok(Json(SessionStateResponse {
        session_id: id,
        status: s.status(),
        has_interrupts: s.is_suspended(),
        interrupt_data: s.pending_interrupt.clone(),
        iterations_used: s.iterations_used,
        max_iterations: s.max_iterations,
        current_step: s.current_step,
        task_completed: s.task_completed,
        step: checkpoint.step,
    }))
}

// ── Tools & health ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDefinition>,
    pub count: usize,
}

async fn tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools = state.engine.catalog();
    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub agent_ready: bool,
    pub active_sessions: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        agent_ready: true,
        active_sessions: state.engine.active_sessions(),
    })
}
