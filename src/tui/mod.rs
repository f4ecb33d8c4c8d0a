//! TTY session layer: drivers, the engage/disengage controller and the loops
//! it runs while engaged.

pub mod caps;
pub mod driver;
mod loops;
pub mod ports;
pub mod pty;
pub mod resize;
pub mod session;
pub mod stop;
pub mod termination;
pub mod termios;
mod wakeup;

pub use caps::{AnsiCapabilities, Capabilities, Capability, DumbCapabilities, MouseMode};
pub use driver::{DevTtyDriver, TermDriver, Tty, WinSizeError};
pub use ports::{
    CellBuffer, EventHandler, InputDecoder, InputEvent, NullCells, RawDecoder, SessionEvent, Size,
};
pub use pty::{PtyDriver, PtyRemote};
pub use resize::{ResizeReceiver, ResizeSender};
pub use session::Session;
