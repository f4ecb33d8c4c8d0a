//! Backends that supply the TTY a session drives.

use std::fs::{File, OpenOptions};
use std::io;

use parking_lot::Mutex;
use thiserror::Error;

use super::ports::Size;
use super::resize::{ResizeSender, SignalBridge};

const DEV_TTY: &str = "/dev/tty";

/// Input and output handles of a TTY. They may refer to the same device.
#[derive(Debug)]
pub struct Tty {
    pub input: File,
    pub output: File,
}

#[derive(Debug, Error)]
pub enum WinSizeError {
    /// The driver has no size of its own; query the output handle instead.
    #[error("driver does not provide a window size")]
    Unsupported,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A TTY source for a session.
///
/// `init` runs once per session and must not have side effects on terminal
/// modes; the session does that itself. `engage`/`disengage` bracket every
/// engaged cycle and are where backend signalling is switched on and off.
pub trait TermDriver: Send + Sync {
    fn init(&self, resize: ResizeSender) -> io::Result<Tty>;

    fn win_size(&self) -> Result<Size, WinSizeError> {
        Err(WinSizeError::Unsupported)
    }

    fn term(&self) -> String;

    fn engage(&self);

    fn disengage(&self);
}

/// Drives the process's controlling terminal.
#[derive(Default)]
pub struct DevTtyDriver {
    term: Option<String>,
    resize: Mutex<Option<ResizeSender>>,
    bridge: Mutex<Option<SignalBridge>>,
}

impl DevTtyDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_term(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
            ..Self::default()
        }
    }
}

impl TermDriver for DevTtyDriver {
    fn init(&self, resize: ResizeSender) -> io::Result<Tty> {
        let input = OpenOptions::new().read(true).open(DEV_TTY)?;
        let output = OpenOptions::new().write(true).open(DEV_TTY)?;
        *self.resize.lock() = Some(resize);
        Ok(Tty { input, output })
    }

    fn term(&self) -> String {
        match &self.term {
            Some(term) => term.clone(),
            None => std::env::var("TERM").unwrap_or_default(),
        }
    }

    fn engage(&self) {
        let mut bridge = self.bridge.lock();
        if bridge.is_some() {
            return;
        }
        let Some(tx) = self.resize.lock().clone() else {
            tracing::warn!("engage before init; resize notifications disabled");
            return;
        };
        match SignalBridge::register(tx) {
            Ok(registered) => *bridge = Some(registered),
            Err(err) => tracing::warn!(error = %err, "failed to register SIGWINCH handler"),
        }
    }

    fn disengage(&self) {
        if let Some(bridge) = self.bridge.lock().take() {
            bridge.unregister();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tui/driver.rs"]
mod tests;
