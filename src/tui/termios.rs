//! Thin libc wrappers for TTY mode handling.

use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};

use super::Size;

/// Snapshot of a TTY's termios settings.
#[derive(Clone, Copy)]
pub struct SavedAttributes(libc::termios);

impl SavedAttributes {
    pub fn capture(fd: &impl AsRawFd) -> io::Result<Self> {
        get_attrs(fd.as_raw_fd()).map(Self)
    }

    /// Field-by-field comparison of the mode flags and control characters.
    pub fn same_as(&self, other: &SavedAttributes) -> bool {
        let (a, b) = (&self.0, &other.0);
        a.c_iflag == b.c_iflag
            && a.c_oflag == b.c_oflag
            && a.c_cflag == b.c_cflag
            && a.c_lflag == b.c_lflag
            && a.c_cc == b.c_cc
    }

    pub fn is_raw(&self) -> bool {
        self.0.c_lflag & (libc::ICANON | libc::ECHO | libc::ISIG) == 0
    }
}

impl std::fmt::Debug for SavedAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedAttributes")
            .field("iflag", &self.0.c_iflag)
            .field("oflag", &self.0.c_oflag)
            .field("cflag", &self.0.c_cflag)
            .field("lflag", &self.0.c_lflag)
            .finish()
    }
}

fn get_attrs(fd: RawFd) -> io::Result<libc::termios> {
    let mut tio = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: tcgetattr fully initialises `tio` when it returns 0.
    unsafe {
        if libc::tcgetattr(fd, tio.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(tio.assume_init())
    }
}

fn set_attrs(fd: RawFd, tio: &libc::termios) -> io::Result<()> {
    // SAFETY: `tio` is a valid termios borrowed for the duration of the call.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, tio) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Puts the TTY into raw mode: byte-at-a-time, no echo, no signal keys.
pub fn make_raw(fd: &impl AsRawFd) -> io::Result<()> {
    let fd = fd.as_raw_fd();
    let mut tio = get_attrs(fd)?;
    // SAFETY: `tio` is an initialised termios.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;
    set_attrs(fd, &tio)
}

pub fn restore(fd: &impl AsRawFd, saved: &SavedAttributes) -> io::Result<()> {
    set_attrs(fd.as_raw_fd(), &saved.0)
}

/// Toggles read blocking through VMIN/VTIME.
///
/// Changing the line discipline wakes a reader parked in `read(2)`, which then
/// returns 0 bytes once VMIN is 0. Non-TTY handles are left untouched.
pub fn set_read_blocking(fd: &impl AsRawFd, blocking: bool) -> io::Result<()> {
    let fd = fd.as_raw_fd();
    let mut tio = match get_attrs(fd) {
        Ok(tio) => tio,
        Err(err) if err.raw_os_error() == Some(libc::ENOTTY) => return Ok(()),
        Err(err) => return Err(err),
    };
    tio.c_cc[libc::VMIN] = if blocking { 1 } else { 0 };
    tio.c_cc[libc::VTIME] = 0;
    set_attrs(fd, &tio)
}

pub fn window_size(fd: &impl AsRawFd) -> io::Result<Size> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes a winsize into the pointed-to struct.
    if unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCGWINSZ as _, &mut ws) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Size::new(ws.ws_col, ws.ws_row))
}

pub fn set_window_size(fd: &impl AsRawFd, size: Size) -> io::Result<()> {
    let ws = libc::winsize {
        ws_row: size.height,
        ws_col: size.width,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCSWINSZ only reads the pointed-to struct.
    if unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSWINSZ as _, &ws) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/tui/termios.rs"]
mod tests;
