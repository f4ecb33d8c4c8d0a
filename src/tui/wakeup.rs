//! Self-pipe used to break the input loop out of `libc::poll()`.
//!
//! One pipe is created per engage cycle together with its stop signal. The
//! write end fires once when the stop signal closes; the read end stays
//! readable from then on, so every later poll returns immediately.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

#[derive(Clone)]
pub struct WakeupSender {
    fd: Arc<OwnedFd>,
}

#[derive(Clone)]
pub struct WakeupReceiver {
    fd: Arc<OwnedFd>,
}

pub fn wakeup_pipe() -> io::Result<(WakeupSender, WakeupReceiver)> {
    let mut fds = [0 as RawFd; 2];
    // SAFETY: fds is a valid 2-element array.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both fds were just created by pipe() and are owned by nobody else.
    let (read_fd, write_fd) = unsafe {
        (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))
    };

    for fd in [&read_fd, &write_fd] {
        set_flags(fd.as_raw_fd())?;
    }

    Ok((
        WakeupSender {
            fd: Arc::new(write_fd),
        },
        WakeupReceiver {
            fd: Arc::new(read_fd),
        },
    ))
}

fn set_flags(fd: RawFd) -> io::Result<()> {
    // SAFETY: fd is a valid pipe end owned by the caller.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl WakeupSender {
    /// Best effort: a full pipe already means a wakeup is pending.
    pub fn wake(&self) {
        // SAFETY: fd is a valid pipe write end; buf is a valid 1-byte slice.
        unsafe {
            libc::write(self.fd.as_raw_fd(), [1u8].as_ptr().cast(), 1);
        }
    }
}

impl WakeupReceiver {
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Non-blocking check for a pending wakeup. The byte is left in the pipe.
    #[cfg(test)]
    pub fn is_woken(&self) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: pfd is a valid single-element pollfd array.
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        n > 0 && pfd.revents & libc::POLLIN != 0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tui/wakeup.rs"]
mod tests;
