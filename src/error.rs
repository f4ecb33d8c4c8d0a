use std::io;

use thiserror::Error;

/// Errors reported by [`Session`](crate::tui::Session) state transitions.
///
/// Disengage has no error path: restoring the terminal is best effort and
/// failures there are logged instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("already engaged")]
    AlreadyEngaged,

    #[error("driver init failed: {0}")]
    DriverInit(#[source] io::Error),

    #[error("failed to save terminal attributes: {0}")]
    Attributes(#[source] io::Error),

    #[error("failed to enter raw mode: {0}")]
    RawMode(#[source] io::Error),

    #[error("failed to start session loops: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
