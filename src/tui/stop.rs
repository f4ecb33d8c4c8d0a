//! Per-cycle stop signal shared by the input and main loops.
//!
//! The trigger owns the only sender of a zero-capacity channel. Closing it
//! drops the sender, so every receiver observes a disconnect at once, and
//! pokes a wakeup pipe for the input loop which sits in `poll()` rather than
//! in a channel select.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use super::wakeup::{wakeup_pipe, WakeupReceiver, WakeupSender};

static NEXT_STOP_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct StopTrigger {
    id: u64,
    tx: Sender<()>,
    wake: WakeupSender,
}

#[derive(Clone)]
pub struct StopSignal {
    id: u64,
    rx: Receiver<()>,
    wake: WakeupReceiver,
}

pub(crate) fn stop_pair() -> io::Result<(StopTrigger, StopSignal)> {
    let (wake_tx, wake_rx) = wakeup_pipe()?;
    let (tx, rx) = bounded(0);
    let id = NEXT_STOP_ID.fetch_add(1, Ordering::Relaxed);
    Ok((
        StopTrigger {
            id,
            tx,
            wake: wake_tx,
        },
        StopSignal {
            id,
            rx,
            wake: wake_rx,
        },
    ))
}

impl StopTrigger {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn close(self) {
        let StopTrigger { id, tx, wake } = self;
        drop(tx);
        wake.wake();
        tracing::trace!(stop_id = id, "stop signal closed");
    }
}

impl StopSignal {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Becomes ready (disconnected) when the signal closes.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    pub(crate) fn wake_fd(&self) -> std::os::fd::RawFd {
        self.wake.raw_fd()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tui/stop.rs"]
mod tests;
