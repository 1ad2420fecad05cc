//! Run engine
//!
//! This module contains:
//! - The run phase state machine
//! - Dispatch planning and per-source concurrency limits
//! - Shared sessions of authenticated sources
//! - The coordinator that drives a run from INIT to FINALIZED
//! - Wiring an engine from the configuration

mod bootstrap;
mod coordinator;
mod scheduler;
mod session_slot;
mod state;

pub use bootstrap::build_engine;
pub use coordinator::{EngineOptions, RunEngine, RunReport, SkippedItem, SourceRegistration};
pub use scheduler::{plan_dispatch, DispatchPlan, Scheduler, DEFAULT_CONCURRENCY};
pub use session_slot::{SessionGuard, SessionSlot};
pub use state::{RunPhase, RunState};
