//! Cleanup of components left behind by a previous supervisor run.
//!
//! After a crash or an unclean restart the supervisor only has PID files to
//! go on. A PID may have been recycled by an unrelated process since, so the
//! reaper only terminates processes whose environment carries the marker
//! entry the supervisor injects into everything it launches.

use std::path::Path;
use std::time::Duration;

use nodevisor_common::{ProcessError, ProcessResult};
use nodevisor_process_file::{delete_pid_at, read_pid_from};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn, Instrument, Span};

use crate::handle::ProcHandle;

/// Environment entry that marks processes launched by the supervisor.
pub const DEFAULT_MARKER: &str = "NODEVISOR_MANAGED=yes";

/// Tuning for [`StaleProcessReaper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperOptions {
    /// Exact `NAME=VALUE` entry a process must carry to be terminated.
    pub marker: String,
    /// Exit code requested on termination (honoured on Windows only).
    pub exit_code: u32,
    /// How long to wait for the process to exit after terminating it.
    pub timeout: Duration,
    /// Delay between `is_terminated` polls.
    pub poll_interval: Duration,
}

impl Default for ReaperOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            exit_code: 1,
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// What the reaper found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// No process with the recorded PID exists.
    NotRunning,
    /// The process exited on its own before it could be terminated.
    AlreadyExited,
    /// A process exists but lacks the marker; it was left alone.
    NotManaged,
    /// The process was terminated and its exit observed.
    Terminated,
}

/// Terminates stale supervised processes identified by PID.
#[derive(Debug, Clone)]
pub struct StaleProcessReaper {
    options: ReaperOptions,
    span: Span,
}

impl StaleProcessReaper {
    /// Create a reaper. All diagnostics are emitted inside `span`.
    pub fn new(options: ReaperOptions, span: Span) -> Self {
        Self { options, span }
    }

    /// Reap the process recorded in a PID file, then remove the file unless
    /// an unmanaged process now holds that PID.
    pub async fn reap_pid_file(&self, path: &Path) -> ProcessResult<ReapOutcome> {
        let pid = match read_pid_from(path).await {
            Ok(pid) => pid,
            Err(ProcessError::NotFound { .. }) => {
                debug!(parent: &self.span, path = %path.display(), "No PID file, nothing to reap");
                return Ok(ReapOutcome::NotRunning);
            }
            Err(e) => return Err(e),
        };

        let outcome = self.reap_pid(pid).await?;
        if outcome != ReapOutcome::NotManaged {
            delete_pid_at(path).await?;
        }
        Ok(outcome)
    }

    /// Reap a single PID.
    pub async fn reap_pid(&self, pid: u32) -> ProcessResult<ReapOutcome> {
        async move {
            let handle = match ProcHandle::open(pid) {
                Ok(handle) => handle,
                Err(e) if e.is_not_found() => {
                    debug!(pid, "Stale process is not running");
                    return Ok(ReapOutcome::NotRunning);
                }
                Err(e) => return Err(e.into()),
            };

            let outcome = self.reap_handle(&handle).await;
            if let Err(e) = handle.close() {
                warn!(pid, "Failed to close process handle: {}", e);
            }
            outcome
        }
        .instrument(self.span.clone())
        .await
    }

    async fn reap_handle(&self, handle: &ProcHandle) -> ProcessResult<ReapOutcome> {
        let pid = handle.pid();

        let env = match handle.environ() {
            Ok(env) => env,
            Err(e) if e.is_already_done() => return Ok(ReapOutcome::AlreadyExited),
            Err(e) => return Err(e.into()),
        };

        if !env.iter().any(|entry| *entry == self.options.marker) {
            info!(pid, marker = %self.options.marker, "PID belongs to an unmanaged process, leaving it alone");
            return Ok(ReapOutcome::NotManaged);
        }

        info!(pid, "Terminating stale managed process");
        match handle.terminate(self.options.exit_code) {
            Ok(()) => {}
            Err(e) if e.is_already_done() => return Ok(ReapOutcome::AlreadyExited),
            Err(e) => return Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
        }

        self.wait_for_exit(handle).await?;
        info!(pid, "Stale process terminated");
        Ok(ReapOutcome::Terminated)
    }

    async fn wait_for_exit(&self, handle: &ProcHandle) -> ProcessResult<()> {
        let deadline = Instant::now() + self.options.timeout;
        loop {
            match handle.is_terminated() {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(ProcessError::timeout(
                    handle.pid().to_string(),
                    "wait for termination",
                ));
            }
            sleep(self.options.poll_interval).await;
        }
    }
}
