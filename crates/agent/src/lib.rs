//! The StepVault execution engine.
//!
//! A session runs a **Plan → Act → Observe** cycle:
//!
//! 1. **Plan**: send the history, scratch state and tool catalog to the provider
//! 2. **Act**: run the requested tools in parallel, or suspend if the plan asks a human
//! 3. **Observe**: record results and loop back to planning
//!
//! The cycle ends when the provider answers in plain text, a human answer is
//! needed, or the iteration limit is hit. State is checkpointed at every
//! step boundary, so a suspended session can be resumed from another process.

pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod interrupt;
pub mod planner;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use dispatch::{DispatchDecision, ToolDispatcher};
pub use engine::{Engine, SessionRun};
pub use executor::{Phase, RunOutcome};
pub use interrupt::InterruptCoordinator;
pub use planner::{PlanOutcome, Planner};
pub use session::{BusyPolicy, SessionGuard, SessionRegistry};
