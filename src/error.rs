//! Session error types.
//!
//! Every failure of a session is one of four kinds. None of them is
//! recoverable within the session: the caller decides whether to log,
//! exit, or start a new session.

use std::io;
use thiserror::Error;

/// Why a received line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Token 0 is not the protocol prefix.
    MissingPrefix,
    /// The prefix is not followed by a command tag.
    MissingCommand,
    /// Token 1 is not one of the four command tags.
    UnrecognizedCommand,
    /// The token count does not match the command tag.
    WrongArgumentCount,
    /// A valid command the client never expects from the server.
    UnexpectedCommand,
    /// No newline within the maximum line length.
    LineTooLong,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            ViolationKind::MissingPrefix => "missing protocol prefix",
            ViolationKind::MissingCommand => "missing command",
            ViolationKind::UnrecognizedCommand => "unrecognized command",
            ViolationKind::WrongArgumentCount => "wrong argument count",
            ViolationKind::UnexpectedCommand => "unexpected command",
            ViolationKind::LineTooLong => "line too long",
        };
        f.write_str(reason)
    }
}

/// A message that does not conform to the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {raw:?}")]
pub struct ProtocolViolation {
    /// What rule was broken.
    pub kind: ViolationKind,
    /// The offending line, lossily decoded for display.
    pub raw: String,
}

impl ProtocolViolation {
    pub fn new(kind: ViolationKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }
}

/// Errors from running a session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connect or TLS handshake failed.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// The `host:port` that was dialed.
        address: String,
        #[source]
        source: io::Error,
    },

    /// Read or write failed after the connection was established.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server closed the connection without sending BYE.
    #[error("connection closed by server before BYE")]
    EndOfStream,

    /// The server sent something outside the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),
}

impl ClientError {
    /// Returns true if the peer misbehaved, as opposed to the transport failing.
    pub fn is_protocol_anomaly(&self) -> bool {
        match self {
            Self::EndOfStream | Self::ProtocolViolation(_) => true,
            Self::Connect { .. } | Self::Io(_) => false,
        }
    }
}
