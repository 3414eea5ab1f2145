//! ex_string message parsing and formatting.
//!
//! Every message is a single line of space-separated tokens:
//!
//! ```text
//! client -> server:  ex_string HELLO <identifier>
//! server -> client:  ex_string FIND <symbol> <haystack>
//! client -> server:  ex_string COUNT <n>
//! server -> client:  ex_string BYE <result>
//! ```
//!
//! Validation is all-or-nothing: a `Message` only exists if the line has the
//! prefix, a known command tag and exactly the token count for that tag.
//! Tokens are raw bytes; only the prefix and tag have a fixed spelling.

use crate::error::{ProtocolViolation, ViolationKind};
use bytes::{BufMut, Bytes, BytesMut};

/// Literal first token of every message.
pub const PROTOCOL_PREFIX: &str = "ex_string";

/// Token separator. Consecutive separators yield empty tokens.
const SEPARATOR: u8 = b' ';

/// Command tag carried in token 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Find,
    Count,
    Bye,
}

impl Command {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"HELLO" => Some(Command::Hello),
            b"FIND" => Some(Command::Find),
            b"COUNT" => Some(Command::Count),
            b"BYE" => Some(Command::Bye),
            _ => None,
        }
    }

    /// Wire spelling of the tag.
    pub fn tag(self) -> &'static str {
        match self {
            Command::Hello => "HELLO",
            Command::Find => "FIND",
            Command::Count => "COUNT",
            Command::Bye => "BYE",
        }
    }

    /// Total token count, prefix and tag included.
    fn token_count(self) -> usize {
        match self {
            Command::Hello | Command::Count | Command::Bye => 3,
            Command::Find => 4,
        }
    }
}

/// A FIND payload borrowed from its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge<'a> {
    pub symbol: &'a [u8],
    pub haystack: &'a [u8],
}

/// A validated protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    command: Command,
    tokens: Vec<Bytes>,
    raw: Bytes,
}

impl Message {
    /// Validate a received line (without its newline).
    pub fn parse(line: impl Into<Bytes>) -> Result<Self, ProtocolViolation> {
        let raw = line.into();
        let tokens = split_tokens(&raw);
        let violation = |kind| ProtocolViolation::new(kind, String::from_utf8_lossy(&raw));

        if tokens[0] != PROTOCOL_PREFIX.as_bytes() {
            return Err(violation(ViolationKind::MissingPrefix));
        }
        if tokens.len() < 2 {
            return Err(violation(ViolationKind::MissingCommand));
        }

        // Unknown tags are rejected before the token count is looked at.
        let command = match Command::from_tag(&tokens[1]) {
            Some(command) => command,
            None => return Err(violation(ViolationKind::UnrecognizedCommand)),
        };

        if tokens.len() != command.token_count() {
            return Err(violation(ViolationKind::WrongArgumentCount));
        }

        Ok(Message {
            command,
            tokens,
            raw,
        })
    }

    fn build(command: Command, argument: &[u8]) -> Self {
        let mut line = BytesMut::new();
        line.put_slice(PROTOCOL_PREFIX.as_bytes());
        line.put_u8(SEPARATOR);
        line.put_slice(command.tag().as_bytes());
        line.put_u8(SEPARATOR);
        line.put_slice(argument);

        let raw = line.freeze();
        Message {
            command,
            tokens: split_tokens(&raw),
            raw,
        }
    }

    /// The opening message carrying the client identifier.
    pub fn hello(identifier: &str) -> Self {
        Self::build(Command::Hello, identifier.as_bytes())
    }

    /// The answer to a FIND challenge.
    pub fn count(n: usize) -> Self {
        Self::build(Command::Count, n.to_string().as_bytes())
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// All tokens, with the prefix at index 0 and the tag at index 1.
    pub fn tokens(&self) -> &[Bytes] {
        &self.tokens
    }

    /// The line exactly as received or as it will be sent.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The challenge of a FIND message.
    pub fn challenge(&self) -> Option<Challenge<'_>> {
        match self.command {
            Command::Find => Some(Challenge {
                symbol: &self.tokens[2],
                haystack: &self.tokens[3],
            }),
            _ => None,
        }
    }

    /// The result token of a BYE message.
    pub fn result(&self) -> Option<&Bytes> {
        match self.command {
            Command::Bye => Some(&self.tokens[2]),
            _ => None,
        }
    }
}

/// Split on every separator. Always yields at least one (possibly empty)
/// token; the pieces share the line's buffer.
fn split_tokens(line: &Bytes) -> Vec<Bytes> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (i, byte) in line.iter().enumerate() {
        if *byte == SEPARATOR {
            tokens.push(line.slice(start..i));
            start = i + 1;
        }
    }
    tokens.push(line.slice(start..));
    tokens
}
