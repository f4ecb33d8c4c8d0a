//! ttyclutch - TTY session lifecycle management
//!
//! Module layout:
//! - tui: drivers, the session controller and its loops
//! - config: session settings loaded from JSON
//! - error: error types

pub mod config;
pub mod error;
pub mod tui;

pub use config::SessionConfig;
pub use error::{ConfigError, SessionError};
pub use tui::Session;
