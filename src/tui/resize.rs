//! Window-resize notifications delivered as channel events.

use std::io;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use signal_hook::consts::signal::SIGWINCH;
use signal_hook::iterator::{Handle, Signals};

/// Producer side. Capacity is one, so a burst collapses into a single
/// pending notification; the consumer re-queries geometry anyway.
#[derive(Clone, Debug)]
pub struct ResizeSender {
    tx: Sender<()>,
}

#[derive(Clone, Debug)]
pub struct ResizeReceiver {
    rx: Receiver<()>,
}

pub fn resize_channel() -> (ResizeSender, ResizeReceiver) {
    let (tx, rx) = bounded(1);
    (ResizeSender { tx }, ResizeReceiver { rx })
}

impl ResizeSender {
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::trace!("resize receiver gone");
            }
        }
    }
}

impl ResizeReceiver {
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Drops any notification left over from a previous cycle.
    pub(crate) fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// SIGWINCH registration for the controlling terminal.
///
/// The handler installed by signal-hook only writes to its own pipe; the
/// forwarding thread turns that into a [`ResizeSender::notify`].
pub struct SignalBridge {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalBridge {
    pub fn register(tx: ResizeSender) -> io::Result<Self> {
        let mut signals = Signals::new([SIGWINCH])?;
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("ttyclutch-winch".into())
            .spawn(move || {
                for _ in signals.forever() {
                    tx.notify();
                }
            })?;
        tracing::debug!("SIGWINCH bridge registered");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Removes the handler and waits for the forwarding thread to exit.
    pub fn unregister(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            tracing::debug!("SIGWINCH bridge unregistered");
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tui/resize.rs"]
mod tests;
