//! Error types for conncheck.

use std::io;

use thiserror::Error;

/// Result type alias for conncheck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for conncheck.
#[derive(Error, Debug)]
pub enum Error {
    #[error("could not resolve target host {host}")]
    Resolve { host: String },

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Unrecoverable probe transport condition.
///
/// Cloneable so it can be fanned out to every subscriber of the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not resolve target host {host}")]
    Resolve { host: String },

    #[error("could not open ICMP socket: {0}")]
    Socket(String),

    #[error("probe transport failed: {0}")]
    Fatal(String),

    #[error("probe transport closed")]
    Closed,
}

impl From<&Error> for TransportError {
    fn from(err: &Error) -> Self {
        match err {
            Error::Resolve { host } => Self::Resolve { host: host.clone() },
            Error::Socket(e) => Self::Socket(e.to_string()),
            Error::Config(msg) => Self::Fatal(msg.clone()),
        }
    }
}
