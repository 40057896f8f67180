//! # Nodevisor Process
//!
//! Process primitives for the nodevisor supervisor.
//!
//! This crate provides:
//! - [`ProcHandle`]: a race-tolerant handle to a process located by PID, for
//!   state queries, environment inspection and forced termination
//! - Environment block parsing
//! - PID validation
//! - [`StaleProcessReaper`]: cleanup of supervised processes left behind by
//!   a previous supervisor run
//!
//! Spawning and waiting on children are left to `std::process` / `tokio`.

pub mod environ;
pub mod handle;
pub mod reaper;
pub mod validation;

mod sys;

// Re-export main types
pub use environ::EnvironBlockError;
pub use handle::{HandleState, ProcHandle};
pub use reaper::{ReapOutcome, ReaperOptions, StaleProcessReaper, DEFAULT_MARKER};
pub use validation::*;
