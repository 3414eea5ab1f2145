//! Client library for the ex_string challenge protocol.
//!
//! Layers, leaf first:
//! - `transport`: plain or TLS connection behind one read/write/close type
//! - `framing`: newline framing that survives fragmented reads
//! - `message`: per-command grammar validation and outgoing messages
//! - `counter`: the occurrence count that answers each challenge
//! - `session`: the HELLO, FIND/COUNT, BYE state machine

pub mod config;
pub mod counter;
pub mod error;
pub mod flag;
pub mod framing;
pub mod message;
pub mod session;
pub mod transport;

pub use error::{ClientError, ProtocolViolation, ViolationKind};
pub use session::{Outcome, Phase, Session};
