//! Windows backend built on a process handle.
//!
//! The environment is located by walking the target's PEB:
//! `PEB.ProcessParameters -> RTL_USER_PROCESS_PARAMETERS.Environment`,
//! whose size is recorded next to it. Only same-bitness layouts are read;
//! for a WOW64 target the native PEB is still present and used.

use std::ffi::c_void;
use std::io;
use std::mem::size_of;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};

use nodevisor_common::{ProcHandleError, ProcHandleResult};
use tracing::{debug, warn};
use windows::Wdk::System::Threading::{NtQueryInformationProcess, ProcessBasicInformation};
use windows::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, ERROR_PARTIAL_COPY, HANDLE, WAIT_OBJECT_0,
    WAIT_TIMEOUT,
};
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Threading::{
    OpenProcess, TerminateProcess, WaitForSingleObject, PROCESS_BASIC_INFORMATION,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SYNCHRONIZE, PROCESS_TERMINATE, PROCESS_VM_READ,
};

use super::RemoteRead;
use crate::environ::{parse_wide_block, MAX_BLOCK_LEN};

#[cfg(target_pointer_width = "64")]
mod layout {
    pub const PEB_PROCESS_PARAMETERS: usize = 0x20;
    pub const PARAMS_ENVIRONMENT: usize = 0x80;
    pub const PARAMS_ENVIRONMENT_SIZE: usize = 0x3F0;
}

#[cfg(target_pointer_width = "32")]
mod layout {
    pub const PEB_PROCESS_PARAMETERS: usize = 0x10;
    pub const PARAMS_ENVIRONMENT: usize = 0x48;
    pub const PARAMS_ENVIRONMENT_SIZE: usize = 0x290;
}

pub(crate) struct RawProcess {
    pid: u32,
    handle: OwnedHandle,
}

impl RawProcess {
    pub(crate) fn open(pid: u32) -> ProcHandleResult<Self> {
        let access = PROCESS_QUERY_LIMITED_INFORMATION
            | PROCESS_VM_READ
            | PROCESS_TERMINATE
            | PROCESS_SYNCHRONIZE;

        let handle = unsafe { OpenProcess(access, false, pid) }.map_err(|e| {
            if e.code() == ERROR_INVALID_PARAMETER.to_hresult() {
                ProcHandleError::not_found(pid)
            } else if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                ProcHandleError::permission_denied(pid)
            } else {
                ProcHandleError::os(pid, "OpenProcess", io::Error::other(e))
            }
        })?;

        // SAFETY: the handle was just returned by OpenProcess and has no other owner.
        let handle = unsafe { OwnedHandle::from_raw_handle(handle.0) };
        Ok(Self { pid, handle })
    }

    fn raw(&self) -> HANDLE {
        HANDLE(self.handle.as_raw_handle())
    }

    pub(crate) fn is_terminated(&self) -> ProcHandleResult<bool> {
        let event = unsafe { WaitForSingleObject(self.raw(), 0) };
        if event == WAIT_OBJECT_0 {
            Ok(true)
        } else if event == WAIT_TIMEOUT {
            Ok(false)
        } else {
            Err(ProcHandleError::os(
                self.pid,
                "WaitForSingleObject",
                io::Error::last_os_error(),
            ))
        }
    }

    /// Queues termination with `exit_code` as the process exit status.
    pub(crate) fn terminate(&self, exit_code: u32) -> ProcHandleResult<()> {
        if self.is_terminated()? {
            return Err(ProcHandleError::already_done(self.pid));
        }

        debug!(pid = self.pid, exit_code, "Calling TerminateProcess");
        if let Err(e) = unsafe { TerminateProcess(self.raw(), exit_code) } {
            // Terminating a process that has exited fails with access denied.
            if self.is_terminated()? {
                return Err(ProcHandleError::already_done(self.pid));
            }
            return Err(ProcHandleError::os(
                self.pid,
                "TerminateProcess",
                io::Error::other(e),
            ));
        }
        Ok(())
    }

    pub(crate) fn environ(&self) -> ProcHandleResult<Vec<String>> {
        if self.is_terminated()? {
            return Err(ProcHandleError::already_done(self.pid));
        }

        let peb = self.peb_address()?;
        let params = self.read_pointer(peb + layout::PEB_PROCESS_PARAMETERS)?;
        let env_address = self.read_pointer(params + layout::PARAMS_ENVIRONMENT)?;
        let env_size = self.read_pointer(params + layout::PARAMS_ENVIRONMENT_SIZE)?;

        if env_size > MAX_BLOCK_LEN {
            return Err(ProcHandleError::parse_failure(
                self.pid,
                format!("environment size {env_size} is implausible"),
            ));
        }

        let block = self.read(env_address, env_size)?;
        parse_wide_block(&block)
            .map_err(|e| ProcHandleError::parse_failure(self.pid, e.to_string()))
    }

    fn peb_address(&self) -> ProcHandleResult<usize> {
        let mut info = PROCESS_BASIC_INFORMATION::default();
        let mut returned = 0u32;

        // SAFETY: `info` is a writable PROCESS_BASIC_INFORMATION of the size passed.
        let status = unsafe {
            NtQueryInformationProcess(
                self.raw(),
                ProcessBasicInformation,
                (&mut info as *mut PROCESS_BASIC_INFORMATION).cast::<c_void>(),
                size_of::<PROCESS_BASIC_INFORMATION>() as u32,
                &mut returned,
            )
        };
        status
            .ok()
            .map_err(|e| self.read_failure("NtQueryInformationProcess", e))?;

        Ok(info.PebBaseAddress as usize)
    }

    fn read_pointer(&self, address: usize) -> ProcHandleResult<usize> {
        let buf = self.read(address, size_of::<usize>())?;
        let mut bytes = [0u8; size_of::<usize>()];
        bytes.copy_from_slice(&buf);
        Ok(usize::from_ne_bytes(bytes))
    }

    fn read(&self, address: usize, len: usize) -> ProcHandleResult<Vec<u8>> {
        match read_remote(self.raw(), address, len) {
            Ok(RemoteRead::Complete(buf)) => Ok(buf),
            Ok(RemoteRead::Short) => {
                warn!(pid = self.pid, "Environment read was torn by process exit");
                Err(ProcHandleError::already_done(self.pid))
            }
            Err(e) => Err(self.read_failure("ReadProcessMemory", e)),
        }
    }

    fn read_failure(&self, operation: &'static str, err: windows::core::Error) -> ProcHandleError {
        if self.is_terminated().unwrap_or(false) {
            return ProcHandleError::already_done(self.pid);
        }
        if err.code() == ERROR_ACCESS_DENIED.to_hresult() {
            return ProcHandleError::permission_denied(self.pid);
        }
        ProcHandleError::os(self.pid, operation, io::Error::other(err))
    }
}

/// Copies `len` bytes at `address` out of the target's address space. This
/// is the only place that touches another process's memory.
fn read_remote(process: HANDLE, address: usize, len: usize) -> windows::core::Result<RemoteRead> {
    let mut buf = vec![0u8; len];
    if len == 0 {
        return Ok(RemoteRead::Complete(buf));
    }

    let mut copied = 0usize;
    // SAFETY: `buf` is a writable allocation of exactly `len` bytes and
    // `copied` outlives the call. The remote address is only dereferenced by
    // the kernel, which validates it against the target's address space.
    let result = unsafe {
        ReadProcessMemory(
            process,
            address as *const c_void,
            buf.as_mut_ptr().cast::<c_void>(),
            len,
            Some(&mut copied as *mut usize),
        )
    };

    match result {
        Ok(()) if copied == len => Ok(RemoteRead::Complete(buf)),
        Ok(()) => Ok(RemoteRead::Short),
        Err(e) if e.code() == ERROR_PARTIAL_COPY.to_hresult() => Ok(RemoteRead::Short),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn test_live_child_environment_and_terminate() {
        let mut child = Command::new("cmd")
            .args(["/C", "pause"])
            .env("NODEVISOR_TEST", "windows-backend")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .expect("spawn cmd");

        let process = RawProcess::open(child.id()).unwrap();
        assert!(!process.is_terminated().unwrap());

        let env = process.environ().unwrap();
        assert!(env.contains(&"NODEVISOR_TEST=windows-backend".to_string()));

        process.terminate(42).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(42));

        assert!(process.terminate(43).unwrap_err().is_already_done());
        assert!(process.environ().unwrap_err().is_already_done());
    }
}
