//! Platform backends for [`crate::ProcHandle`].
//!
//! Each backend exposes the same `RawProcess` surface: `open`,
//! `is_terminated`, `terminate` and `environ`. Dropping a `RawProcess`
//! releases the OS resource exactly once.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::RawProcess;

#[cfg(windows)]
mod win32;
#[cfg(windows)]
pub(crate) use win32::RawProcess;

#[cfg(not(any(target_os = "linux", windows)))]
compile_error!("nodevisor-process supports Linux and Windows targets only");

/// Result of copying a range out of another process's address space.
#[derive(Debug)]
pub(crate) enum RemoteRead {
    /// Every requested byte was copied.
    Complete(Vec<u8>),
    /// Fewer bytes than requested arrived: the address space is being torn
    /// down and the partial buffer must be discarded.
    Short,
}
