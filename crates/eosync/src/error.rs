//! Error types for console synchronization.

use std::io;

/// Result type for console operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a console.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// OSC packet encode/decode error.
    #[error("OSC codec error: {0}")]
    Osc(#[from] rosc::OscError),

    /// The host/port pair did not resolve to a usable address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A string did not parse as a console target number.
    #[error("invalid target number: {0:?}")]
    InvalidNumber(String),

    /// The connection is not established.
    #[error("not connected")]
    NotConnected,
}
