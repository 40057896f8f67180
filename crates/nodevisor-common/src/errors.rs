//! Error types for the nodevisor supervisor.
//!
//! Two layers live here:
//!
//! - [`ProcHandleError`]: the closed taxonomy returned by the process handle
//!   (`nodevisor_process::ProcHandle`). Callers match on it to tell benign
//!   races (`AlreadyDone`) apart from real faults.
//! - [`ProcessError`]: supervisor-level failures (PID files, stale process
//!   cleanup) that may wrap a handle error.
//!
//! ```rust
//! use nodevisor_common::{ProcHandleError, ProcessError, ProcessResult};
//!
//! fn stop(terminated: Result<(), ProcHandleError>) -> ProcessResult<()> {
//!     // A process that is already gone needs no stopping.
//!     match terminated {
//!         Ok(()) => Ok(()),
//!         Err(e) if e.is_already_done() => Ok(()),
//!         Err(e) => Err(ProcessError::from(e)),
//!     }
//! }
//!
//! assert!(stop(Err(ProcHandleError::already_done(42))).is_ok());
//! assert!(stop(Err(ProcHandleError::permission_denied(42))).is_err());
//! ```

use thiserror::Error;

// ==============================================================================
// Process Handle Errors
// ==============================================================================

/// Errors returned by operations on a process handle.
#[derive(Error, Debug)]
pub enum ProcHandleError {
    /// No live process with this PID existed when the handle was opened.
    #[error("No such process: {pid}")]
    NotFound { pid: u32 },

    /// The process exists but the caller lacks the rights to inspect it.
    #[error("Permission denied for process {pid}")]
    PermissionDenied { pid: u32 },

    /// The handle was already closed.
    #[error("Process handle already closed: {pid}")]
    AlreadyClosed { pid: u32 },

    /// The target process has already exited.
    #[error("Process already finished: {pid}")]
    AlreadyDone { pid: u32 },

    /// The environment block was complete but structurally invalid.
    #[error("Malformed environment block for process {pid}: {reason}")]
    ParseFailure { pid: u32, reason: String },

    /// Any other OS call failure.
    #[error("{operation} failed for process {pid}: {source}")]
    Os {
        pid: u32,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ProcHandleError {
    pub fn not_found(pid: u32) -> Self {
        Self::NotFound { pid }
    }

    pub fn permission_denied(pid: u32) -> Self {
        Self::PermissionDenied { pid }
    }

    pub fn already_closed(pid: u32) -> Self {
        Self::AlreadyClosed { pid }
    }

    pub fn already_done(pid: u32) -> Self {
        Self::AlreadyDone { pid }
    }

    pub fn parse_failure(pid: u32, reason: impl Into<String>) -> Self {
        Self::ParseFailure {
            pid,
            reason: reason.into(),
        }
    }

    pub fn os(pid: u32, operation: &'static str, source: std::io::Error) -> Self {
        Self::Os {
            pid,
            operation,
            source,
        }
    }

    /// The PID the failing handle refers to.
    pub fn pid(&self) -> u32 {
        match self {
            Self::NotFound { pid }
            | Self::PermissionDenied { pid }
            | Self::AlreadyClosed { pid }
            | Self::AlreadyDone { pid }
            | Self::ParseFailure { pid, .. }
            | Self::Os { pid, .. } => *pid,
        }
    }

    /// True if the target exited before or during the operation.
    pub fn is_already_done(&self) -> bool {
        matches!(self, Self::AlreadyDone { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed { .. })
    }
}

/// Result type for process handle operations.
pub type ProcHandleResult<T> = std::result::Result<T, ProcHandleError>;

// ==============================================================================
// Process Management Errors
// ==============================================================================

/// Supervisor-level process errors.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Process not found: {id}")]
    NotFound { id: String },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },

    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Process timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },

    #[error(transparent)]
    Handle(#[from] ProcHandleError),
}

impl ProcessError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
