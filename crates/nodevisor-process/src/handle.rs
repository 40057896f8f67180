//! Handles to processes the supervisor did not start.
//!
//! A [`ProcHandle`] owns one OS resource referring to a process located by
//! PID (a pidfd on Linux, a process handle on Windows). The target can exit
//! at any instant; every operation tolerates that and reports it as
//! [`ProcHandleError::AlreadyDone`].
//!
//! # Concurrency
//!
//! `terminate`, `is_terminated` and `environ` take `&self` and may be called
//! from any number of threads at once. `close` is meant to be called once, by
//! the owner, after other users are done. Calling it twice yields
//! `AlreadyClosed`, and operations issued after a close fail with the same
//! error without touching the released resource.
//!
//! # Termination
//!
//! `terminate` returns once the OS has accepted the request. It does not wait
//! for the process to exit; poll [`ProcHandle::is_terminated`] or wait on the
//! child for that.
//!
//! # Example
//!
//! ```rust,no_run
//! use nodevisor_process::ProcHandle;
//!
//! let handle = ProcHandle::open(1234)?;
//! if let Ok(env) = handle.environ() {
//!     println!("{} variables", env.len());
//! }
//! match handle.terminate(1) {
//!     Err(e) if e.is_already_done() => println!("already gone"),
//!     other => other?,
//! }
//! handle.close()?;
//! # Ok::<(), nodevisor_common::ProcHandleError>(())
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use nodevisor_common::{ProcHandleError, ProcHandleResult};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::sys::RawProcess;
use crate::validation::validate_pid;

const OPEN: u8 = 0;
const CLOSED: u8 = 1;

/// Lifecycle state of a [`ProcHandle`]. The only transition is
/// `Open -> Closed`, made by the first successful [`ProcHandle::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Closed,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleState::Open => write!(f, "open"),
            HandleState::Closed => write!(f, "closed"),
        }
    }
}

/// A handle to an external process, located by PID.
pub struct ProcHandle {
    pid: u32,
    state: AtomicU8,
    process: RwLock<Option<RawProcess>>,
}

impl ProcHandle {
    /// Open a handle to the process with the given PID.
    ///
    /// Fails with `NotFound` if no such process exists and with
    /// `PermissionDenied` if it exists but cannot be opened with the rights
    /// needed for inspection and termination.
    pub fn open(pid: u32) -> ProcHandleResult<Self> {
        validate_pid(pid)?;
        let process = RawProcess::open(pid)?;
        debug!(pid, "Opened process handle");

        Ok(Self {
            pid,
            state: AtomicU8::new(OPEN),
            process: RwLock::new(Some(process)),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> HandleState {
        match self.state.load(Ordering::Acquire) {
            OPEN => HandleState::Open,
            _ => HandleState::Closed,
        }
    }

    /// Release the OS resource. The second and any later call returns
    /// `AlreadyClosed`.
    pub fn close(&self) -> ProcHandleResult<()> {
        if self
            .state
            .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProcHandleError::already_closed(self.pid));
        }

        // Waits for in-flight operations holding the read lock.
        let released = self.process.write().take();
        drop(released);

        debug!(pid = self.pid, "Closed process handle");
        Ok(())
    }

    /// Request immediate termination of the process.
    ///
    /// On Windows the process exits with `exit_code`. On Linux the process
    /// is killed with `SIGKILL` and `exit_code` is only logged.
    pub fn terminate(&self, exit_code: u32) -> ProcHandleResult<()> {
        self.with_process(|process| process.terminate(exit_code))
    }

    /// Non-blocking check whether the process has exited.
    pub fn is_terminated(&self) -> ProcHandleResult<bool> {
        self.with_process(RawProcess::is_terminated)
    }

    /// Read the process environment as `NAME=VALUE` entries, in the order the
    /// target laid them out.
    ///
    /// The result is all-or-nothing: if the process exits while its memory is
    /// being copied, the partial copy is discarded and `AlreadyDone` returned.
    pub fn environ(&self) -> ProcHandleResult<Vec<String>> {
        let env = self.with_process(RawProcess::environ)?;
        trace!(pid = self.pid, entries = env.len(), "Read process environment");
        Ok(env)
    }

    fn with_process<T>(
        &self,
        op: impl FnOnce(&RawProcess) -> ProcHandleResult<T>,
    ) -> ProcHandleResult<T> {
        let guard = self.process.read();
        match guard.as_ref() {
            Some(process) => op(process),
            None => Err(ProcHandleError::already_closed(self.pid)),
        }
    }
}

impl fmt::Debug for ProcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcHandle")
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for ProcHandle {
    fn drop(&mut self) {
        if *self.state.get_mut() == OPEN {
            trace!(pid = self.pid, "Releasing process handle that was never closed");
        }
    }
}
