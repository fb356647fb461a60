//! # StepVault Core
//!
//! Domain types, traits, and error definitions for the StepVault agent
//! execution engine. This crate has **zero framework dependencies**; it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the execution state machine is a trait here:
//! the reasoning backend ([`Provider`]), the capabilities ([`Tool`]) and the
//! durable session store ([`CheckpointStore`]). Implementations live in their
//! respective crates, so the engine can be exercised against in-memory
//! stand-ins in tests and against real services in production.

pub mod checkpoint;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{CheckpointError, EngineError, Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EngineEvent, EventBus, EventKind};
pub use message::{Message, MessageToolCall, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use state::{ConversationState, PendingInterrupt, SessionStatus};
pub use tool::{Tool, ToolCall, ToolInvocationResult, ToolOutcome, ToolRegistry, ToolResult};

/// Name of the reserved tool whose invocation means "suspend and ask a person".
pub const HUMAN_ASSISTANCE_TOOL: &str = "human_assistance";
