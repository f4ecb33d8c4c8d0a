//! PTY-backed driver for sessions whose terminal lives elsewhere, e.g. a
//! remote client relaying bytes over a network connection.
//!
//! The slave side becomes the session's TTY. The master side is handed out as
//! a [`PtyRemote`]: whatever is written to it arrives as session input, and
//! the session's output can be read back from it.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::driver::{TermDriver, Tty, WinSizeError};
use super::ports::Size;
use super::resize::ResizeSender;
use super::termios;

// ptsname() returns a pointer into static storage.
static PTSNAME_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Opens a fresh PTY pair, returning `(master, slave)`.
pub fn open_pty_pair() -> io::Result<(File, File)> {
    // SAFETY: plain libc calls; the master fd is owned by `OwnedFd` and closed on
    // every error path.
    unsafe {
        let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        if master < 0 {
            return Err(io::Error::last_os_error());
        }
        let master = OwnedFd::from_raw_fd(master);
        let raw = master.as_raw_fd();
        if libc::grantpt(raw) != 0 || libc::unlockpt(raw) != 0 {
            return Err(io::Error::last_os_error());
        }

        let slave = {
            let _guard = PTSNAME_LOCK.lock();
            let name = libc::ptsname(raw);
            if name.is_null() {
                return Err(io::Error::last_os_error());
            }
            libc::open(name, libc::O_RDWR | libc::O_NOCTTY)
        };
        if slave < 0 {
            return Err(io::Error::last_os_error());
        }
        let slave = File::from_raw_fd(slave);

        for fd in [raw, slave.as_raw_fd()] {
            if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok((File::from(master), slave))
    }
}

struct PtyShared {
    size: Mutex<Size>,
    resize: Mutex<Option<ResizeSender>>,
    engaged: AtomicBool,
}

pub struct PtyDriver {
    term: String,
    slave: Mutex<Option<File>>,
    shared: Arc<PtyShared>,
}

pub struct PtyRemote {
    master: File,
    shared: Arc<PtyShared>,
}

impl PtyDriver {
    pub fn open(term: impl Into<String>, size: Size) -> io::Result<(PtyDriver, PtyRemote)> {
        let (master, slave) = open_pty_pair()?;
        termios::set_window_size(&master, size)?;
        let shared = Arc::new(PtyShared {
            size: Mutex::new(size),
            resize: Mutex::new(None),
            engaged: AtomicBool::new(false),
        });
        Ok((
            PtyDriver {
                term: term.into(),
                slave: Mutex::new(Some(slave)),
                shared: Arc::clone(&shared),
            },
            PtyRemote { master, shared },
        ))
    }
}

impl TermDriver for PtyDriver {
    fn init(&self, resize: ResizeSender) -> io::Result<Tty> {
        let input = self.slave.lock().take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AlreadyExists, "pty slave already bound")
        })?;
        let output = input.try_clone()?;
        *self.shared.resize.lock() = Some(resize);
        Ok(Tty { input, output })
    }

    fn win_size(&self) -> Result<Size, WinSizeError> {
        Ok(*self.shared.size.lock())
    }

    fn term(&self) -> String {
        self.term.clone()
    }

    fn engage(&self) {
        self.shared.engaged.store(true, Ordering::SeqCst);
    }

    fn disengage(&self) {
        self.shared.engaged.store(false, Ordering::SeqCst);
    }
}

impl PtyRemote {
    /// Records the remote window size. The session is notified only while engaged.
    pub fn resize(&self, size: Size) -> io::Result<()> {
        termios::set_window_size(&self.master, size)?;
        *self.shared.size.lock() = size;
        if self.shared.engaged.load(Ordering::SeqCst) {
            if let Some(tx) = self.shared.resize.lock().as_ref() {
                tx.notify();
            }
        }
        Ok(())
    }

    pub fn size(&self) -> Size {
        *self.shared.size.lock()
    }

    pub fn try_clone_master(&self) -> io::Result<File> {
        self.master.try_clone()
    }
}

impl Read for PtyRemote {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.master.read(buf)
    }
}

impl Write for PtyRemote {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.master.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.master.flush()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tui/pty.rs"]
mod tests;
