//! Symbolic terminal capabilities and the strings emitted for them.
//!
//! Real terminfo lookup lives outside this crate. [`AnsiCapabilities`] covers
//! xterm-compatible terminals well enough to drive a session on its own.

use std::borrow::Cow;

use crossterm::Command;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    EnterCa,
    ExitCa,
    EnterKeypad,
    ExitKeypad,
    HideCursor,
    ShowCursor,
    EnableAcs,
    Clear,
    AttrOff,
    EnablePaste,
    DisablePaste,
}

/// Emitted on engage, after raw mode and before the loops start.
pub const ENTER_SEQUENCE: [Capability; 5] = [
    Capability::EnterCa,
    Capability::EnterKeypad,
    Capability::HideCursor,
    Capability::EnableAcs,
    Capability::Clear,
];

/// Emitted on disengage, after the loops joined and before attributes are restored.
pub const EXIT_SEQUENCE: [Capability; 5] = [
    Capability::ShowCursor,
    Capability::AttrOff,
    Capability::Clear,
    Capability::ExitCa,
    Capability::ExitKeypad,
];

pub trait Capabilities: Send + Sync {
    /// `None` when the terminal has no string for `cap`; nothing is written then.
    fn get(&self, cap: Capability) -> Option<Cow<'static, str>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AnsiCapabilities;

impl Capabilities for AnsiCapabilities {
    fn get(&self, cap: Capability) -> Option<Cow<'static, str>> {
        use crossterm::{cursor, event, style, terminal};

        let seq = match cap {
            Capability::EnterCa => ansi(terminal::EnterAlternateScreen),
            Capability::ExitCa => ansi(terminal::LeaveAlternateScreen),
            Capability::EnterKeypad => Cow::Borrowed("\x1b[?1h\x1b="),
            Capability::ExitKeypad => Cow::Borrowed("\x1b[?1l\x1b>"),
            Capability::HideCursor => ansi(cursor::Hide),
            Capability::ShowCursor => ansi(cursor::Show),
            Capability::EnableAcs => Cow::Borrowed("\x1b(B\x1b)0"),
            Capability::Clear => {
                let mut s = ansi(cursor::MoveTo(0, 0)).into_owned();
                s.push_str(&ansi(terminal::Clear(terminal::ClearType::All)));
                Cow::Owned(s)
            }
            Capability::AttrOff => ansi(style::SetAttribute(style::Attribute::Reset)),
            Capability::EnablePaste => ansi(event::EnableBracketedPaste),
            Capability::DisablePaste => ansi(event::DisableBracketedPaste),
        };
        Some(seq)
    }
}

/// `TERM=dumb`: no control sequences at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct DumbCapabilities;

impl Capabilities for DumbCapabilities {
    fn get(&self, _cap: Capability) -> Option<Cow<'static, str>> {
        None
    }
}

pub fn capabilities_for(term: &str) -> Box<dyn Capabilities> {
    match term {
        "" | "dumb" => Box::new(DumbCapabilities),
        _ => Box::new(AnsiCapabilities),
    }
}

fn ansi(command: impl Command) -> Cow<'static, str> {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = command.write_ansi(&mut out);
    Cow::Owned(out)
}

/// Mouse reporting level. Each level includes the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseMode {
    #[default]
    Off,
    Buttons,
    Drag,
    Motion,
}

impl MouseMode {
    pub fn is_enabled(self) -> bool {
        self != MouseMode::Off
    }
}

const MOUSE_RESET: &str = "\x1b[?1000l\x1b[?1002l\x1b[?1003l\x1b[?1006l";

/// xterm mouse reporting: clear every mode, then enable the requested one in SGR encoding.
pub fn mouse_sequence(mode: MouseMode) -> String {
    let mut out = String::from(MOUSE_RESET);
    let enable = match mode {
        MouseMode::Off => return out,
        MouseMode::Buttons => "\x1b[?1000h",
        MouseMode::Drag => "\x1b[?1002h",
        MouseMode::Motion => "\x1b[?1003h",
    };
    out.push_str(enable);
    out.push_str("\x1b[?1006h");
    out
}

#[cfg(test)]
#[path = "../../tests/unit/tui/caps.rs"]
mod tests;
