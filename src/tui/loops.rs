//! The input loop and main loop started by every engage.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::driver::{TermDriver, WinSizeError};
use super::ports::{CellBuffer, EventHandler, InputDecoder, InputEvent, SessionEvent, Size};
use super::resize::ResizeReceiver;
use super::stop::StopSignal;
use super::termios;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopKind {
    Input,
    Main,
}

/// Everything the loops share with the session outside its state lock.
#[derive(Clone)]
pub(crate) struct LoopContext {
    pub driver: Arc<dyn TermDriver>,
    pub input: Arc<File>,
    pub output: Arc<File>,
    pub resize: ResizeReceiver,
    pub cells: Arc<Mutex<Box<dyn CellBuffer>>>,
    pub decoder: Arc<Mutex<Box<dyn InputDecoder>>>,
    pub handler: Arc<Mutex<Box<dyn EventHandler>>>,
    pub size: Arc<Mutex<Size>>,
    pub read_buffer: usize,
}

/// Geometry from the driver, falling back to the ioctl on `output`.
pub(crate) fn query_size(driver: &dyn TermDriver, output: &File) -> io::Result<Size> {
    match driver.win_size() {
        Ok(size) => Ok(size),
        Err(WinSizeError::Unsupported) => termios::window_size(output),
        Err(WinSizeError::Io(err)) => Err(err),
    }
}

/// Reports a loop's exit when dropped, including on panic.
struct Completion {
    kind: LoopKind,
    done: Sender<LoopKind>,
    running: Arc<AtomicUsize>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        let _ = self.done.send(self.kind);
    }
}

/// The loops of one engage cycle and the join mechanism for them.
pub(crate) struct LoopSet {
    handles: Vec<(LoopKind, JoinHandle<()>)>,
    done_tx: Option<Sender<LoopKind>>,
    done_rx: Receiver<LoopKind>,
    running: Arc<AtomicUsize>,
}

impl LoopSet {
    pub(crate) fn new(running: Arc<AtomicUsize>) -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            handles: Vec::with_capacity(2),
            done_tx: Some(done_tx),
            done_rx,
            running,
        }
    }

    /// Spawns both loops. On error the loops already started stay in `self`
    /// and must still be stopped and joined.
    pub(crate) fn start(&mut self, ctx: &LoopContext, stop: &StopSignal) -> io::Result<()> {
        let (input_tx, input_rx) = unbounded();

        let input_ctx = ctx.clone();
        let input_stop = stop.clone();
        self.spawn(LoopKind::Input, "ttyclutch-input", move || {
            input_loop(&input_ctx, &input_stop, input_tx)
        })?;

        let main_ctx = ctx.clone();
        let main_stop = stop.clone();
        self.spawn(LoopKind::Main, "ttyclutch-main", move || {
            main_loop(&main_ctx, &main_stop, input_rx)
        })?;

        self.done_tx = None;
        Ok(())
    }

    fn spawn<F>(&mut self, kind: LoopKind, name: &str, body: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let done = self
            .done_tx
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "loop set already started"))?;
        let running = Arc::clone(&self.running);
        running.fetch_add(1, Ordering::SeqCst);

        let thread_running = Arc::clone(&running);
        let spawned = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _completion = Completion {
                    kind,
                    done,
                    running: thread_running,
                };
                body();
            });

        match spawned {
            Ok(handle) => {
                self.handles.push((kind, handle));
                Ok(())
            }
            Err(err) => {
                running.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Waits until every started loop has reported completion.
    ///
    /// With a timeout, loops still running at the deadline are detached and
    /// `false` is returned; a thread cannot be cancelled from outside.
    pub(crate) fn join(mut self, timeout: Option<Duration>) -> bool {
        self.done_tx = None;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending = self.handles.len();

        while pending > 0 {
            let finished = match deadline {
                Some(deadline) => self.done_rx.recv_deadline(deadline).ok(),
                None => self.done_rx.recv().ok(),
            };
            match finished {
                Some(kind) => {
                    tracing::trace!(loop_kind = ?kind, "loop finished");
                    pending -= 1;
                }
                None => break,
            }
        }

        if pending > 0 {
            tracing::error!(pending, "session loops did not stop in time; detaching");
            return false;
        }

        for (kind, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!(loop_kind = ?kind, "session loop panicked");
            }
        }
        true
    }
}

fn input_loop(ctx: &LoopContext, stop: &StopSignal, tx: Sender<InputEvent>) {
    let mut buf = vec![0u8; ctx.read_buffer];
    let mut events = Vec::new();
    let mut fds = [
        libc::pollfd {
            fd: ctx.input.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: stop.wake_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    loop {
        if stop.is_stopped() {
            break;
        }

        for fd in fds.iter_mut() {
            fd.revents = 0;
        }
        // SAFETY: fds is a valid 2-element pollfd array for the duration of the call.
        let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::warn!(error = %err, "input poll failed");
            break;
        }
        if fds[1].revents != 0 {
            break;
        }

        let revents = fds[0].revents;
        if revents & libc::POLLNVAL != 0 {
            tracing::warn!("input handle is no longer valid");
            break;
        }
        if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) == 0 {
            continue;
        }

        match (&*ctx.input).read(&mut buf) {
            // VMIN=0 after the non-blocking flip, or a spurious wakeup.
            Ok(0) if revents & libc::POLLHUP == 0 => continue,
            Ok(0) => {
                tracing::debug!("input hung up");
                break;
            }
            Ok(n) => {
                ctx.decoder.lock().decode(&buf[..n], &mut events);
                for event in events.drain(..) {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                continue
            }
            Err(err) => {
                if !stop.is_stopped() {
                    tracing::warn!(error = %err, "input read failed");
                }
                break;
            }
        }
    }
}

fn main_loop(ctx: &LoopContext, stop: &StopSignal, input_rx: Receiver<InputEvent>) {
    let mut input = Some(input_rx);
    let mut resize = Some(ctx.resize.receiver().clone());

    loop {
        let input_rx = input.clone().unwrap_or_else(never);
        let resize_rx = resize.clone().unwrap_or_else(never);

        select! {
            recv(stop.receiver()) -> _ => break,
            recv(resize_rx) -> msg => match msg {
                Ok(()) => apply_resize(ctx),
                Err(_) => resize = None,
            },
            recv(input_rx) -> msg => match msg {
                Ok(event) => ctx.handler.lock().handle(SessionEvent::Input(event)),
                Err(_) => {
                    input = None;
                    if !stop.is_stopped() {
                        tracing::warn!("input loop exited while engaged");
                        ctx.handler.lock().handle(SessionEvent::InputClosed);
                    }
                }
            },
        }
    }
}

fn apply_resize(ctx: &LoopContext) {
    let size = match query_size(&*ctx.driver, &ctx.output) {
        Ok(size) => size,
        Err(err) => {
            tracing::debug!(error = %err, "window size query failed; keeping last geometry");
            return;
        }
    };
    if !size.is_usable() {
        tracing::debug!("ignoring zero window size");
        return;
    }

    {
        let mut current = ctx.size.lock();
        if *current == size {
            return;
        }
        *current = size;
    }
    ctx.cells.lock().resize(size);
    tracing::debug!(%size, "window resized");
    ctx.handler.lock().handle(SessionEvent::Resize(size));
}
