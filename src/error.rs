//! Canonical error types for the crate.
//!
//! `SessionError` is the single surface returned by [`crate::session::Session`]
//! operations. Connection establishment and wire-level decoding have their own
//! structured sub-taxonomies (`ConnectError`, `HandshakeError`,
//! [`crate::codec::FrameError`]) so callers can distinguish a refused socket
//! from a bad handshake or a corrupt frame.

use std::io;

use thiserror::Error;

/// Errors raised while establishing a connection to the server.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The connect attempt (including the handshake) exceeded the configured
    /// timeout.
    #[error("connect timed out")]
    TimedOut,
    /// The transport could not be established (refused, unreachable, etc.).
    #[error("connection refused: {0}")]
    Refused(#[source] io::Error),
    /// The transport came up but the protocol handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[source] HandshakeError),
    /// The server address string could not be parsed.
    #[error("invalid server address {0:?}")]
    InvalidAddress(String),
}

/// Reasons the preamble exchange can fail.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// I/O failure while exchanging the preamble.
    #[error("i/o during handshake: {0}")]
    Io(#[from] io::Error),
    /// The server's preamble did not start with the protocol magic.
    #[error("bad protocol magic")]
    BadMagic,
    /// The server speaks a different protocol version.
    #[error("protocol version mismatch: server {server}, client {client}")]
    VersionMismatch {
        /// Version advertised by the server.
        server: u16,
        /// Version this client implements.
        client: u16,
    },
}

/// Errors emitted by [`crate::session::Session`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation requires an established connection.
    #[error("not connected")]
    NotConnected,
    /// `connect` was called while a connection is already live.
    #[error("already connected")]
    AlreadyConnected,
    /// The query text was rejected before touching the wire.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Connection establishment failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// Transport failure on the send path.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectError {
    /// Returns true if retrying the same address might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool { matches!(self, Self::TimedOut | Self::Refused(_)) }
}
