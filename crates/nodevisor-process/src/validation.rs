//! Validation utilities for process identifiers.

use nodevisor_common::{ProcHandleError, ProcHandleResult, ProcessError, ProcessResult};

/// Validate that a numeric PID can name a live process on this platform.
///
/// PID 0 never refers to a user process. On Linux PIDs are signed 32-bit
/// values, so anything above `i32::MAX` cannot exist either. Both cases are
/// reported as [`ProcHandleError::NotFound`].
pub fn validate_pid(pid: u32) -> ProcHandleResult<()> {
    if pid == 0 {
        return Err(ProcHandleError::not_found(pid));
    }

    #[cfg(target_os = "linux")]
    if i32::try_from(pid).is_err() {
        return Err(ProcHandleError::not_found(pid));
    }

    Ok(())
}

/// Validate a supervised component ID (used to derive PID file names).
pub fn validate_process_id(id: &str) -> ProcessResult<()> {
    if id.is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Process ID cannot be empty",
        ));
    }

    if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(ProcessError::configuration(
            id,
            "Process ID can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }

    Ok(())
}
