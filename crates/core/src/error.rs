//! Error types for the StepVault domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all StepVault operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Checkpoint errors ---
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    // --- Engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed provider output: {0}")]
    MalformedOutput(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool '{0}' is reserved for human assistance and cannot be executed directly")]
    Reserved(String),
}

#[derive(Debug, Clone, Error)]
pub enum CheckpointError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt checkpoint for session {session_id}: {reason}")]
    Corrupt { session_id: String, reason: String },

    #[error(
        "Checkpoint version conflict for session {session_id}: expected {expected:?}, found {found:?}"
    )]
    Conflict {
        session_id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Failures surfaced by the execution engine to its callers.
///
/// Individual tool failures are deliberately absent: they are captured as
/// error outcomes on their own invocation and never abort a batch.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Planning failed: {0}")]
    PlanningFailure(#[from] ProviderError),

    #[error("Iteration limit exceeded: {max_iterations} planning steps used without completing the task")]
    IterationLimitExceeded { max_iterations: u32 },

    #[error("Session not found or not awaiting human input: {0}")]
    SessionNotFound(String),

    #[error("Session busy: {0} is already executing")]
    ConcurrentAccessRejected(String),

    #[error("Session {0} is waiting for a human response; resume it first")]
    InterruptPending(String),

    #[error("Checkpoint store failure: {0}")]
    Store(#[from] CheckpointError),
}

impl EngineError {
    /// Stable machine-readable code carried by `error` events and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlanningFailure(_) => "planning_failure",
            Self::IterationLimitExceeded { .. } => "iteration_limit_exceeded",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ConcurrentAccessRejected(_) => "concurrent_access_rejected",
            Self::InterruptPending(_) => "interrupt_pending",
            Self::Store(_) => "store_failure",
        }
    }
}
