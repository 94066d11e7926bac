// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy of the instrument layer
//!
//! [`InstrumentError`] is what a single transport round trip can fail with.
//! [`GatewayError`] is what the session hands to request handlers and
//! streaming loops, it adds the session-level conditions on top.

use std::time::Duration;

use thiserror::Error;

/// Failure of one SCPI round trip or of the transport itself.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    /// Error when reading from/writing to the transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No reply arrived within the session timeout.
    #[error("Timeout while waiting for a reply to {command} (timeout {timeout:?})")]
    Timeout { command: String, timeout: Duration },

    /// The reply could not be interpreted.
    #[error("Response from instrument could not be parsed. Response was: {0}")]
    Parse(String),

    /// A binary block was malformed.
    #[error("Malformed binary block: {0}")]
    Block(String),

    /// The instrument error queue reported one or more errors.
    #[error("{0}")]
    Status(String),

    /// The transport address could not be understood.
    #[error("Invalid instrument address: {0}")]
    Address(String),

    /// The instrument rejected or does not know the command.
    #[error("Command not supported: {0}")]
    Unsupported(String),
}

impl InstrumentError {
    /// Map an I/O error raised by a socket with read/write timeouts.
    pub fn from_io(err: std::io::Error, command: &str, timeout: Duration) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Self::Timeout {
                command: command.to_string(),
                timeout,
            },
            _ => Self::Io(err),
        }
    }
}

/// Errors surfaced by the instrument session.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No live session. Retryable once a client connects.
    #[error("Not connected to CTP10")]
    NotConnected,

    /// A serialized call failed.
    #[error(transparent)]
    Hardware(#[from] InstrumentError),

    /// Establishing the session failed, nothing was kept.
    #[error("CTP10 connection failed: {0}")]
    ConnectionFailed(String),

    /// Input rejected before touching the instrument.
    #[error("{0}")]
    Validation(String),

    /// The blocking worker panicked or was cancelled.
    #[error("Instrument worker failed: {0}")]
    Worker(String),
}

impl GatewayError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

pub type InstrumentResult<T> = Result<T, InstrumentError>;
pub type GatewayResult<T> = Result<T, GatewayError>;
