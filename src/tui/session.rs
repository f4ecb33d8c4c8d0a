//! Engage/disengage state machine for a TTY.
//!
//! Engaging takes the terminal over: raw mode, alternate screen, hidden
//! cursor, and the two session loops. Disengaging stops the loops first and
//! then puts everything back, ending with the termios saved at initialize.
//!
//! Two locks are involved. `transition` serialises engage, disengage and
//! initialize end to end. `state` guards the fields and is never held while
//! waiting on the loops, so an [`EventHandler`] running on the main loop may
//! still call [`Session::beep`], [`Session::enable_mouse`] and friends while a
//! disengage is joining that loop.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::error::SessionError;

use super::caps::{
    capabilities_for, mouse_sequence, Capabilities, Capability, MouseMode, ENTER_SEQUENCE,
    EXIT_SEQUENCE,
};
use super::driver::{TermDriver, Tty};
use super::loops::{query_size, LoopContext, LoopSet};
use super::ports::{
    CellBuffer, EventHandler, IgnoreEvents, InputDecoder, NullCells, RawDecoder, Size,
};
use super::resize::{resize_channel, ResizeReceiver, ResizeSender};
use super::stop::{stop_pair, StopTrigger};
use super::termios::{self, SavedAttributes};

const BELL: u8 = 0x07;

/// Handles and data fixed at initialize.
struct Bound {
    input: Arc<File>,
    output: Arc<File>,
    saved: SavedAttributes,
    caps: Arc<dyn Capabilities>,
    term: String,
}

#[derive(Default)]
struct State {
    stop: Option<StopTrigger>,
    loops: Option<LoopSet>,
    mouse: MouseMode,
    paste: bool,
}

pub struct Session {
    driver: Arc<dyn TermDriver>,
    config: SessionConfig,
    caps_override: Option<Arc<dyn Capabilities>>,
    bound: OnceLock<Bound>,
    /// Handles from a driver init whose attribute capture failed.
    pending: Mutex<Option<Tty>>,
    transition: Mutex<()>,
    state: Mutex<State>,
    resize_tx: ResizeSender,
    resize_rx: ResizeReceiver,
    size: Arc<Mutex<Size>>,
    cells: Arc<Mutex<Box<dyn CellBuffer>>>,
    decoder: Arc<Mutex<Box<dyn InputDecoder>>>,
    handler: Arc<Mutex<Box<dyn EventHandler>>>,
    running: Arc<AtomicUsize>,
}

impl Session {
    pub fn new(driver: impl TermDriver + 'static, config: SessionConfig) -> Self {
        Self::with_driver(Arc::new(driver), config)
    }

    pub fn with_driver(driver: Arc<dyn TermDriver>, config: SessionConfig) -> Self {
        let (resize_tx, resize_rx) = resize_channel();
        let state = State {
            mouse: config.mouse,
            paste: config.bracketed_paste,
            ..State::default()
        };
        Self {
            driver,
            config,
            caps_override: None,
            bound: OnceLock::new(),
            pending: Mutex::new(None),
            transition: Mutex::new(()),
            state: Mutex::new(state),
            resize_tx,
            resize_rx,
            size: Arc::new(Mutex::new(Size::ZERO)),
            cells: Arc::new(Mutex::new(Box::new(NullCells::default()))),
            decoder: Arc::new(Mutex::new(Box::new(RawDecoder))),
            handler: Arc::new(Mutex::new(Box::new(IgnoreEvents))),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Overrides the capability table otherwise picked from the terminal type.
    pub fn with_capabilities(mut self, caps: impl Capabilities + 'static) -> Self {
        self.caps_override = Some(Arc::new(caps));
        self
    }

    pub fn with_cells(self, cells: impl CellBuffer + 'static) -> Self {
        *self.cells.lock() = Box::new(cells);
        self
    }

    pub fn with_decoder(self, decoder: impl InputDecoder + 'static) -> Self {
        *self.decoder.lock() = Box::new(decoder);
        self
    }

    pub fn with_handler(self, handler: impl EventHandler + 'static) -> Self {
        *self.handler.lock() = Box::new(handler);
        self
    }

    /// Binds the driver's TTY and saves its current attributes. Runs once;
    /// later calls return immediately.
    pub fn initialize(&self) -> Result<(), SessionError> {
        let _transition = self.transition.lock();
        self.bind().map(|_| ())
    }

    fn bind(&self) -> Result<&Bound, SessionError> {
        if let Some(bound) = self.bound.get() {
            return Ok(bound);
        }

        let pending = self.pending.lock().take();
        let tty = match pending {
            Some(tty) => tty,
            None => self
                .driver
                .init(self.resize_tx.clone())
                .map_err(SessionError::DriverInit)?,
        };
        let saved = match SavedAttributes::capture(&tty.input) {
            Ok(saved) => saved,
            Err(err) => {
                // The driver is only initialised once; keep its handles for a retry.
                *self.pending.lock() = Some(tty);
                return Err(SessionError::Attributes(err));
            }
        };
        let term = self
            .config
            .term
            .clone()
            .unwrap_or_else(|| self.driver.term());
        let caps = match &self.caps_override {
            Some(caps) => Arc::clone(caps),
            None => Arc::from(capabilities_for(&term)),
        };
        tracing::debug!(term = %term, "session initialized");

        Ok(self.bound.get_or_init(|| Bound {
            input: Arc::new(tty.input),
            output: Arc::new(tty.output),
            saved,
            caps,
            term,
        }))
    }

    /// Takes over the terminal and starts the session loops.
    pub fn engage(&self) -> Result<(), SessionError> {
        let _transition = self.transition.lock();
        if self.state.lock().stop.is_some() {
            return Err(SessionError::AlreadyEngaged);
        }

        let bound = self.bind()?;
        let (trigger, signal) = stop_pair().map_err(SessionError::Spawn)?;

        termios::make_raw(&*bound.input).map_err(SessionError::RawMode)?;

        match query_size(&*self.driver, &bound.output) {
            Ok(size) if size.is_usable() => {
                *self.size.lock() = size;
                self.cells.lock().resize(size);
            }
            Ok(_) => tracing::debug!("ignoring zero window size"),
            Err(err) => tracing::debug!(error = %err, "window size query failed"),
        }

        if let Err(err) = termios::set_read_blocking(&*bound.input, true) {
            tracing::warn!(error = %err, "failed to set blocking reads");
        }
        self.resize_rx.clear();

        // Held until the cycle is published: a mouse/paste toggle either lands
        // before the flags are read here or sees the session engaged.
        let mut state = self.state.lock();
        if state.mouse.is_enabled() {
            write_out(&bound.output, mouse_sequence(state.mouse).as_bytes());
        }
        if state.paste {
            emit(bound, &[Capability::EnablePaste]);
        }

        self.driver.engage();
        emit(bound, &ENTER_SEQUENCE);

        let ctx = LoopContext {
            driver: Arc::clone(&self.driver),
            input: Arc::clone(&bound.input),
            output: Arc::clone(&bound.output),
            resize: self.resize_rx.clone(),
            cells: Arc::clone(&self.cells),
            decoder: Arc::clone(&self.decoder),
            handler: Arc::clone(&self.handler),
            size: Arc::clone(&self.size),
            read_buffer: self.config.read_buffer(),
        };
        let stop_id = trigger.id();
        let mut loops = LoopSet::new(Arc::clone(&self.running));
        let started = loops.start(&ctx, &signal);
        state.stop = Some(trigger);
        state.loops = Some(loops);
        drop(state);

        if let Err(err) = started {
            tracing::error!(error = %err, "failed to start session loops");
            self.teardown(bound);
            return Err(SessionError::Spawn(err));
        }

        let size = self.size();
        tracing::info!(stop_id, %size, "session engaged");
        Ok(())
    }

    /// Stops the loops and restores the terminal. A no-op when not engaged.
    pub fn disengage(&self) {
        let _transition = self.transition.lock();
        if let Some(bound) = self.bound.get() {
            self.teardown(bound);
        }
    }

    fn teardown(&self, bound: &Bound) {
        let (trigger, loops) = {
            let mut state = self.state.lock();
            let Some(trigger) = state.stop.take() else {
                return;
            };
            (trigger, state.loops.take())
        };

        if let Err(err) = termios::set_read_blocking(&*bound.input, false) {
            tracing::warn!(error = %err, "failed to set non-blocking reads");
        }
        let stop_id = trigger.id();
        trigger.close();

        if let Some(loops) = loops {
            loops.join(self.config.shutdown_timeout());
        }

        self.driver.disengage();

        if let Err(err) = termios::set_read_blocking(&*bound.input, true) {
            tracing::warn!(error = %err, "failed to restore blocking reads");
        }

        emit(bound, &EXIT_SEQUENCE);
        write_out(&bound.output, mouse_sequence(MouseMode::Off).as_bytes());
        emit(bound, &[Capability::DisablePaste]);

        self.cells.lock().resize(Size::ZERO);

        if let Err(err) = termios::restore(&*bound.input, &bound.saved) {
            tracing::warn!(error = %err, "failed to restore terminal attributes");
        }
        tracing::info!(stop_id, "session disengaged");
    }

    /// Disengages for good. Dropping the session does the same.
    pub fn finalize(self) {
        self.disengage();
    }

    pub fn suspend(&self) {
        self.disengage();
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        self.engage()
    }

    pub fn is_engaged(&self) -> bool {
        self.state.lock().stop.is_some()
    }

    /// Identifier of the current cycle's stop signal.
    pub fn stop_id(&self) -> Option<u64> {
        self.state.lock().stop.as_ref().map(StopTrigger::id)
    }

    /// Number of session loops currently running.
    pub fn loops_running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> Size {
        *self.size.lock()
    }

    pub fn term(&self) -> Option<&str> {
        self.bound.get().map(|bound| bound.term.as_str())
    }

    pub fn saved_attributes(&self) -> Option<SavedAttributes> {
        self.bound.get().map(|bound| bound.saved)
    }

    pub fn write_str(&self, s: &str) -> io::Result<()> {
        let bound = self
            .bound
            .get()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "session not initialized"))?;
        (&*bound.output).write_all(s.as_bytes())
    }

    /// Rings the terminal bell. Write failures are not reported.
    pub fn beep(&self) -> io::Result<()> {
        match self.bound.get() {
            Some(bound) => write_out(&bound.output, &[BELL]),
            None => tracing::debug!("beep before initialize"),
        }
        Ok(())
    }

    pub fn enable_mouse(&self, mode: MouseMode) {
        let mut state = self.state.lock();
        state.mouse = mode;
        if state.stop.is_some() {
            if let Some(bound) = self.bound.get() {
                write_out(&bound.output, mouse_sequence(mode).as_bytes());
            }
        }
    }

    pub fn disable_mouse(&self) {
        self.enable_mouse(MouseMode::Off);
    }

    pub fn enable_paste(&self) {
        self.set_paste(true);
    }

    pub fn disable_paste(&self) {
        self.set_paste(false);
    }

    fn set_paste(&self, on: bool) {
        let mut state = self.state.lock();
        state.paste = on;
        if state.stop.is_some() {
            if let Some(bound) = self.bound.get() {
                let cap = if on {
                    Capability::EnablePaste
                } else {
                    Capability::DisablePaste
                };
                emit(bound, &[cap]);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disengage();
    }
}

fn emit(bound: &Bound, caps: &[Capability]) {
    let seq: String = caps
        .iter()
        .filter_map(|cap| bound.caps.get(*cap))
        .map(Cow::into_owned)
        .collect();
    if !seq.is_empty() {
        write_out(&bound.output, seq.as_bytes());
    }
}

fn write_out(output: &File, bytes: &[u8]) {
    let mut out = output;
    if let Err(err) = out.write_all(bytes).and_then(|()| out.flush()) {
        tracing::debug!(error = %err, "terminal write failed");
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tui/session.rs"]
mod tests;
