use crate::error::{Error, Result};
use log::debug;
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::fs;
use std::io::IoSliceMut;

const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// Smallest page size in use; reads bounded by this never cross into a
/// neighbouring mapping by accident.
const PAGE_SIZE: u64 = 4096;

/// A target process held stopped under ptrace.
///
/// Attaching stops the target; the handle detaches again when dropped, so the
/// target cannot be left stopped on any exit path. Call [`detach`] on the
/// normal path to observe detach errors instead of swallowing them.
///
/// [`detach`]: TracedProcess::detach
#[derive(Debug)]
pub struct TracedProcess {
    pid: Pid,
    attached: bool,
}

impl TracedProcess {
    /// Stop `pid` and wait until the kernel reports it stopped.
    pub fn attach(pid: i32) -> Result<TracedProcess> {
        let target = Pid::from_raw(pid);
        ptrace::attach(target).map_err(|errno| attach_error(pid, errno))?;
        let tracee = TracedProcess {
            pid: target,
            attached: true,
        };
        tracee.wait_for_stop()?;
        Ok(tracee)
    }

    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    fn wait_for_stop(&self) -> Result<()> {
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::__WALL)) {
                Ok(WaitStatus::Stopped(_, _)) => return Ok(()),
                Ok(WaitStatus::Exited(_, _)) | Ok(WaitStatus::Signaled(_, _, _)) => {
                    return Err(Error::NoSuchProcess(self.pid.as_raw()));
                }
                Ok(status) => {
                    debug!("unexpected wait status for {}: {:?}", self.pid, status);
                }
                Err(Errno::EINTR) => {}
                Err(Errno::ECHILD) | Err(Errno::ESRCH) => {
                    return Err(Error::NoSuchProcess(self.pid.as_raw()));
                }
                Err(errno) => return Err(Error::Io(io_error(errno))),
            }
        }
    }

    /// Resume the target. Consumes the handle; the Drop impl covers error
    /// paths where this is never reached.
    pub fn detach(mut self) -> Result<()> {
        self.attached = false;
        ptrace::detach(self.pid, None).map_err(|errno| match errno {
            Errno::ESRCH => Error::NoSuchProcess(self.pid.as_raw()),
            other => Error::Io(io_error(other)),
        })
    }

    /// Copy exactly `len` bytes from the target at `addr`. A short read is an
    /// error, not a truncated result.
    pub fn peek_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        if len == 0 {
            return Ok(buf);
        }
        let mut local = [IoSliceMut::new(&mut buf)];
        let remote = [RemoteIoVec {
            base: addr as usize,
            len,
        }];
        let nread = process_vm_readv(self.pid, &mut local, &remote).map_err(|errno| {
            if errno == Errno::ESRCH {
                Error::NoSuchProcess(self.pid.as_raw())
            } else {
                Error::ReadFault { addr, len, errno }
            }
        })?;
        if nread != len {
            return Err(Error::ReadFault {
                addr,
                len,
                errno: Errno::EFAULT,
            });
        }
        Ok(buf)
    }

    /// Copy up to `max` bytes starting at `addr`, stopping at the first NUL.
    /// Each read stays within one page, so a string whose mapping ends right
    /// after the NUL never drags an unmapped neighbour page into the read.
    pub fn peek_string(&self, addr: u64, max: usize) -> Result<String> {
        let mut raw = Vec::new();
        let mut cursor = addr;
        while raw.len() < max {
            let to_page_end = (PAGE_SIZE - cursor % PAGE_SIZE) as usize;
            let want = (max - raw.len()).min(to_page_end);
            let chunk = self.peek_bytes(cursor, want)?;
            match chunk.iter().position(|&b| b == 0) {
                Some(nul) => {
                    raw.extend_from_slice(&chunk[..nul]);
                    break;
                }
                None => {
                    raw.extend_from_slice(&chunk);
                    cursor += want as u64;
                }
            }
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Read one native word from the target.
    pub fn peek_word(&self, addr: u64) -> Result<u64> {
        let bytes = self.peek_bytes(addr, WORD_SIZE)?;
        Ok(u64::from_ne_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Read one 32-bit signed integer from the target.
    pub fn peek_i32(&self, addr: u64) -> Result<i32> {
        let bytes = self.peek_bytes(addr, 4)?;
        Ok(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Drop for TracedProcess {
    fn drop(&mut self) {
        if self.attached {
            let _ = ptrace::detach(self.pid, None);
        }
    }
}

fn attach_error(pid: i32, errno: Errno) -> Error {
    match errno {
        Errno::ESRCH => Error::NoSuchProcess(pid),
        Errno::EPERM => match tracer_of(pid) {
            Some(tracer) if tracer != 0 => Error::AlreadyTraced { pid, tracer },
            _ => Error::PermissionDenied(pid),
        },
        other => Error::Io(io_error(other)),
    }
}

fn io_error(errno: Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno as i32)
}

/// TracerPid from /proc/<pid>/status, if readable.
fn tracer_of(pid: i32) -> Option<i32> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("TracerPid:") {
            return rest.trim().parse().ok();
        }
    }
    None
}
