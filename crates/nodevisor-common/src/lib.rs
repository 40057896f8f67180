//! # Nodevisor Common
//!
//! Error types shared across the nodevisor crates.

pub mod errors;

pub use errors::{ProcHandleError, ProcHandleResult, ProcessError, ProcessResult};
