use std::io;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    SigInt,
    SigTerm,
    SigHup,
}

impl TerminationSignal {
    pub fn from_raw(sig: i32) -> Option<Self> {
        match sig {
            SIGINT => Some(TerminationSignal::SigInt),
            SIGTERM => Some(TerminationSignal::SigTerm),
            SIGHUP => Some(TerminationSignal::SigHup),
            _ => None,
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            TerminationSignal::SigInt => 130,
            TerminationSignal::SigTerm => 143,
            TerminationSignal::SigHup => 129,
        }
    }
}

/// Forwards SIGINT/SIGTERM/SIGHUP to `tx` so the application can disengage
/// its session before exiting. Handlers are removed when this is dropped.
pub struct TerminationListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

pub fn install_termination_signals(
    tx: Sender<TerminationSignal>,
) -> io::Result<TerminationListener> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    let handle = signals.handle();
    let thread = std::thread::Builder::new()
        .name("ttyclutch-signals".into())
        .spawn(move || {
            for sig in signals.forever() {
                let Some(signal) = TerminationSignal::from_raw(sig) else {
                    continue;
                };
                tracing::info!(?signal, "termination signal");
                let _ = tx.send(signal);
            }
        })?;
    Ok(TerminationListener {
        handle,
        thread: Some(thread),
    })
}

impl Drop for TerminationListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tui/termination.rs"]
mod tests;
