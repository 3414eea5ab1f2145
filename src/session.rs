//! The client side of one ex_string exchange.
//!
//! ```text
//! Connecting --HELLO--> AwaitingChallenge --FIND/COUNT--> AwaitingChallenge
//!                                         --BYE---------> Done
//! any state --error--> Aborted
//! ```
//!
//! The server decides how many challenge rounds there are; the client loops
//! until BYE or the first error. The transport is closed once on every exit.

use crate::config::Config;
use crate::counter;
use crate::error::{ClientError, ProtocolViolation, ViolationKind};
use crate::framing::LineFramer;
use crate::message::{Command, Message};
use crate::transport::Transport;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Where a session is in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Transport open, HELLO not yet sent.
    Connecting,
    /// Waiting for the next FIND or the final BYE.
    AwaitingChallenge,
    /// BYE received.
    Done,
    /// Ended by an error.
    Aborted,
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The BYE payload, as received.
    pub result: Bytes,
    /// Number of FIND challenges answered.
    pub rounds: u64,
}

/// One connection's worth of protocol state.
#[derive(Debug)]
pub struct Session {
    identifier: String,
    framer: LineFramer<Transport>,
    phase: Phase,
    rounds: u64,
}

impl Session {
    /// Open the transport described by `config`.
    pub async fn connect(config: &Config) -> Result<Self, ClientError> {
        let endpoint = config.endpoint();
        let transport = Transport::open(&endpoint).await?;
        info!(peer = %endpoint.address(), tls = config.tls, "Connected");
        Ok(Self::new(transport, &config.identifier, config.io_timeout))
    }

    /// Start a session over an already-open transport.
    pub fn new(transport: Transport, identifier: &str, io_timeout: Option<Duration>) -> Self {
        Self {
            identifier: identifier.to_string(),
            framer: LineFramer::new(transport, io_timeout),
            phase: Phase::Connecting,
            rounds: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn is_transport_open(&self) -> bool {
        self.framer.get_ref().is_open()
    }

    /// Drive the exchange to BYE or the first error, then close the transport.
    pub async fn run(&mut self) -> Result<Outcome, ClientError> {
        let result = self.exchange().await;
        self.phase = match result {
            Ok(_) => Phase::Done,
            Err(_) => Phase::Aborted,
        };

        // Bounded by the I/O deadline so a stalled peer cannot hang the exit.
        let limit = self.framer.io_timeout();
        let closed = self.framer.get_mut().close(limit).await;
        match (&result, closed) {
            (_, Ok(())) => {}
            (Ok(_), Err(e)) => warn!(error = %e, "Failed to close connection after BYE"),
            (Err(_), Err(e)) => debug!(error = %e, "Failed to close aborted connection"),
        }

        match &result {
            Ok(outcome) => info!(rounds = outcome.rounds, "Session complete"),
            Err(e) => debug!(error = %e, rounds = self.rounds, "Session aborted"),
        }
        result
    }

    async fn exchange(&mut self) -> Result<Outcome, ClientError> {
        let hello = Message::hello(&self.identifier);
        self.send(&hello).await?;
        self.phase = Phase::AwaitingChallenge;

        loop {
            let line = self.framer.read_line().await?;
            trace!(line = ?line, "Received");
            let message = Message::parse(line)?;

            match message.command() {
                Command::Find => {
                    let reply = self.answer(&message)?;
                    self.send(&reply).await?;
                }
                Command::Bye => {
                    let result = message.result().cloned().unwrap_or_default();
                    return Ok(Outcome {
                        result,
                        rounds: self.rounds,
                    });
                }
                Command::Hello | Command::Count => {
                    return Err(unexpected(&message).into());
                }
            }
        }
    }

    /// Build the COUNT reply for a FIND message.
    fn answer(&mut self, message: &Message) -> Result<Message, ClientError> {
        let challenge = message.challenge().ok_or_else(|| unexpected(message))?;
        let n = counter::count(challenge.symbol, challenge.haystack);
        self.rounds += 1;
        debug!(
            round = self.rounds,
            symbol = %String::from_utf8_lossy(challenge.symbol),
            haystack_len = challenge.haystack.len(),
            count = n,
            "Answered challenge"
        );
        Ok(Message::count(n))
    }

    async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        trace!(line = ?message.raw(), "Sending");
        self.framer.write_line(message.raw()).await
    }
}

fn unexpected(message: &Message) -> ProtocolViolation {
    ProtocolViolation::new(
        ViolationKind::UnexpectedCommand,
        String::from_utf8_lossy(message.raw()),
    )
}

/// Connect with `config` and run one session to completion.
pub async fn run(config: &Config) -> Result<Outcome, ClientError> {
    let mut session = Session::connect(config).await?;
    session.run().await
}
