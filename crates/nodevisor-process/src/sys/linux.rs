//! Linux backend built on pidfds.
//!
//! The pidfd pins the process identity: signals sent through it can never
//! reach a recycled PID, and it becomes readable once the process exits.
//! Memory reads still address the process by PID, so every environment read
//! is bracketed by liveness checks on the pidfd.

use std::fs::{self, File};
use std::io::{self, IoSliceMut, Read};
use std::ops::Range;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::Signal;
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::unistd::Pid;
use nodevisor_common::{ProcHandleError, ProcHandleResult};
use tracing::{debug, warn};

use super::RemoteRead;
use crate::environ::{parse_narrow_block, MAX_BLOCK_LEN};

/// 1-based indices into `/proc/<pid>/stat`; `env_end` follows `env_start`.
const FLAGS_FIELD: usize = 9;
const ENV_START_FIELD: usize = 50;

/// `PF_EXITING`: set at the start of `do_exit`, before the address space is
/// released and long before the pidfd becomes readable.
const PF_EXITING: u64 = 0x4;

/// Re-reads of a zeroed range for a process that is neither exiting nor
/// hidden from us. `execve` briefly publishes a fresh address space whose
/// range is not filled in yet.
const ZEROED_RANGE_ATTEMPTS: u32 = 5;

/// The parts of `/proc/<pid>/stat` used here.
#[derive(Debug, PartialEq, Eq)]
struct StatSnapshot {
    flags: u64,
    env: Range<usize>,
}

impl StatSnapshot {
    fn is_exiting(&self) -> bool {
        self.flags & PF_EXITING != 0
    }
}

pub(crate) struct RawProcess {
    pid: u32,
    pidfd: OwnedFd,
}

impl RawProcess {
    pub(crate) fn open(pid: u32) -> ProcHandleResult<Self> {
        let raw_pid = i32::try_from(pid).map_err(|_| ProcHandleError::not_found(pid))?;

        let pidfd = pidfd_open(raw_pid).map_err(|errno| match errno {
            // EINVAL covers PIDs that name a thread rather than a process.
            Errno::ESRCH | Errno::EINVAL => ProcHandleError::not_found(pid),
            Errno::EPERM | Errno::EACCES => ProcHandleError::permission_denied(pid),
            errno => ProcHandleError::os(pid, "pidfd_open", errno.into()),
        })?;

        Ok(Self { pid, pidfd })
    }

    pub(crate) fn is_terminated(&self) -> ProcHandleResult<bool> {
        let mut fds = [PollFd::new(self.pidfd.as_fd(), PollFlags::POLLIN)];
        loop {
            match poll(&mut fds, PollTimeout::ZERO) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    let exited = fds[0]
                        .revents()
                        .is_some_and(|revents| revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP));
                    return Ok(exited);
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(ProcHandleError::os(self.pid, "poll", errno.into())),
            }
        }
    }

    /// Sends `SIGKILL` through the pidfd. Linux offers no way to choose the
    /// exit status of a killed process; waiters observe termination by
    /// `SIGKILL` instead of `exit_code`.
    pub(crate) fn terminate(&self, exit_code: u32) -> ProcHandleResult<()> {
        // Zombies still accept signals, so check for an exit first.
        if self.is_terminated()? {
            return Err(ProcHandleError::already_done(self.pid));
        }

        debug!(pid = self.pid, exit_code, "Sending SIGKILL");
        match pidfd_send_signal(self.pidfd.as_fd(), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(ProcHandleError::already_done(self.pid)),
            Err(errno) => Err(ProcHandleError::os(self.pid, "pidfd_send_signal", errno.into())),
        }
    }

    pub(crate) fn environ(&self) -> ProcHandleResult<Vec<String>> {
        if self.is_terminated()? {
            return Err(ProcHandleError::already_done(self.pid));
        }

        let range = self.env_range()?;
        let block = match read_remote(self.pid, &range) {
            Ok(RemoteRead::Complete(block)) => block,
            Ok(RemoteRead::Short) => {
                warn!(pid = self.pid, "Environment read was torn by process exit");
                return Err(ProcHandleError::already_done(self.pid));
            }
            Err(err) => return Err(self.read_failure("process_vm_readv", err)),
        };

        // The PID may have been recycled between the stat lookup and the copy.
        if self.is_terminated()? {
            return Err(ProcHandleError::already_done(self.pid));
        }

        parse_narrow_block(&block)
            .map_err(|e| ProcHandleError::parse_failure(self.pid, e.to_string()))
    }

    /// Address range of the environment block, from `/proc/<pid>/stat`.
    fn env_range(&self) -> ProcHandleResult<Range<usize>> {
        let mut attempt = 1;
        let range = loop {
            let stat = self.read_stat()?;
            if stat.env != (0..0) {
                break stat.env;
            }
            self.zeroed_range_check(&stat)?;

            if attempt == ZEROED_RANGE_ATTEMPTS {
                return Err(ProcHandleError::parse_failure(
                    self.pid,
                    "process has no user address space",
                ));
            }
            attempt += 1;
            std::thread::sleep(Duration::from_millis(1));
        };

        if range.end < range.start || range.end - range.start > MAX_BLOCK_LEN {
            return Err(ProcHandleError::parse_failure(
                self.pid,
                format!("invalid environment range {:#x}..{:#x}", range.start, range.end),
            ));
        }

        Ok(range)
    }

    fn read_stat(&self) -> ProcHandleResult<StatSnapshot> {
        let stat = fs::read_to_string(format!("/proc/{}/stat", self.pid))
            .map_err(|err| self.read_failure("read /proc/<pid>/stat", err))?;

        parse_stat(&stat).ok_or_else(|| {
            ProcHandleError::parse_failure(self.pid, "unexpected /proc/<pid>/stat layout")
        })
    }

    /// The kernel zeroes the range once the address space is released on
    /// exit, and also for callers that may not inspect the process. Only the
    /// latter is a permission failure.
    fn zeroed_range_check(&self, stat: &StatSnapshot) -> ProcHandleResult<()> {
        if stat.is_exiting() || self.is_terminated()? {
            return Err(ProcHandleError::already_done(self.pid));
        }

        // Opening applies the same ptrace access check that hides the range.
        match File::open(format!("/proc/{}/environ", self.pid)) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.read_failure("open /proc/<pid>/environ", err)),
        }
    }

    /// Exited, or past the point of no return in `do_exit`.
    fn is_exiting(&self) -> bool {
        if self.is_terminated().unwrap_or(false) {
            return true;
        }
        match fs::read_to_string(format!("/proc/{}/stat", self.pid)) {
            Ok(stat) => parse_stat(&stat).is_some_and(|stat| stat.is_exiting()),
            // The entry only disappears once the process is reaped.
            Err(_) => true,
        }
    }

    fn read_failure(&self, operation: &'static str, err: io::Error) -> ProcHandleError {
        let vanished = matches!(err.raw_os_error(), Some(libc::ESRCH) | Some(libc::ENOENT));
        if vanished || self.is_exiting() {
            return ProcHandleError::already_done(self.pid);
        }

        match err.raw_os_error() {
            Some(libc::EPERM) | Some(libc::EACCES) => ProcHandleError::permission_denied(self.pid),
            _ => ProcHandleError::os(self.pid, operation, err),
        }
    }
}

fn parse_stat(stat: &str) -> Option<StatSnapshot> {
    // The command name is parenthesised and may itself contain ')'.
    let (_, rest) = stat.rsplit_once(')')?;
    // `rest` starts at field 3.
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |n: usize| fields.get(n - 3);

    let flags = field(FLAGS_FIELD)?.parse().ok()?;
    let start = field(ENV_START_FIELD)?.parse().ok()?;
    let end = field(ENV_START_FIELD + 1)?.parse().ok()?;
    Some(StatSnapshot {
        flags,
        env: start..end,
    })
}

/// Copies `range` out of the target's address space. This is the only
/// place that touches another process's memory.
fn read_remote(pid: u32, range: &Range<usize>) -> io::Result<RemoteRead> {
    let len = range.end - range.start;
    let mut buf = vec![0u8; len];
    if len == 0 {
        return Ok(RemoteRead::Complete(buf));
    }

    let remote = [RemoteIoVec {
        base: range.start,
        len,
    }];
    let target = Pid::from_raw(pid as i32);

    let copied = match process_vm_readv(target, &mut [IoSliceMut::new(&mut buf)], &remote) {
        Ok(copied) => copied,
        Err(Errno::EFAULT) => return Ok(RemoteRead::Short),
        // Seccomp profiles commonly deny the syscall; procfs performs the
        // same copy on our behalf.
        Err(Errno::EPERM | Errno::ENOSYS) => read_proc_environ(pid, &mut buf)?,
        Err(errno) => return Err(errno.into()),
    };

    if copied < len {
        Ok(RemoteRead::Short)
    } else {
        Ok(RemoteRead::Complete(buf))
    }
}

fn read_proc_environ(pid: u32, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = File::open(format!("/proc/{pid}/environ"))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn pidfd_open(pid: i32) -> nix::Result<OwnedFd> {
    // SAFETY: pidfd_open takes no pointers.
    let fd = Errno::result(unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) })?;
    // SAFETY: on success the syscall returns a fresh descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

fn pidfd_send_signal(pidfd: BorrowedFd<'_>, signal: Signal) -> nix::Result<()> {
    // SAFETY: the descriptor is borrowed for the whole call and a null
    // siginfo pointer is allowed.
    let res = unsafe {
        libc::syscall(
            libc::SYS_pidfd_send_signal,
            pidfd.as_raw_fd(),
            signal as libc::c_int,
            std::ptr::null::<libc::siginfo_t>(),
            0,
        )
    };
    Errno::result(res).map(drop)
}
