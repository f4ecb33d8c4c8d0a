//! Seams to the collaborators a session drives but does not implement:
//! the cell buffer, the input decoder and the event consumer.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// A geometry is only applied when both dimensions are non-zero.
    pub fn is_usable(self) -> bool {
        self.width != 0 && self.height != 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub trait CellBuffer: Send {
    fn resize(&mut self, size: Size);
}

/// Tracks only its dimensions. Useful when the renderer keeps its own grid.
#[derive(Debug, Default)]
pub struct NullCells {
    size: Size,
}

impl NullCells {
    pub fn size(&self) -> Size {
        self.size
    }
}

impl CellBuffer for NullCells {
    fn resize(&mut self, size: Size) {
        self.size = size;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Undecoded bytes, as produced by [`RawDecoder`].
    Bytes(Vec<u8>),
    Key(char),
    Paste(String),
    Mouse { column: u16, row: u16, button: u8 },
}

pub trait InputDecoder: Send {
    fn decode(&mut self, bytes: &[u8], out: &mut Vec<InputEvent>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RawDecoder;

impl InputDecoder for RawDecoder {
    fn decode(&mut self, bytes: &[u8], out: &mut Vec<InputEvent>) {
        if !bytes.is_empty() {
            out.push(InputEvent::Bytes(bytes.to_vec()));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Input(InputEvent),
    Resize(Size),
    /// The input loop stopped on its own (hangup or read error) while engaged.
    InputClosed,
}

/// Runs on the main loop thread. Must not call back into `Session::disengage`,
/// which joins this very thread.
pub trait EventHandler: Send {
    fn handle(&mut self, event: SessionEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(SessionEvent) + Send,
{
    fn handle(&mut self, event: SessionEvent) {
        self(event)
    }
}

#[derive(Debug, Default)]
pub struct IgnoreEvents;

impl EventHandler for IgnoreEvents {
    fn handle(&mut self, _event: SessionEvent) {}
}

#[cfg(test)]
#[path = "../../tests/unit/tui/ports.rs"]
mod tests;
