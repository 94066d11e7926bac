// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # CTP10 instrument layer
//!
//! Everything that talks to the instrument lives here:
//!
//! - [`ScpiTransport`]: the capability interface a driver binding implements
//!   (scalar write, scalar read, block read)
//! - [`TransportConnector`]: opens a transport for an address, selected from
//!   the configuration by [`create_connector`]
//! - [`commands::Ctp10`]: typed CTP10 operations mapped to SCPI
//! - [`session::InstrumentSession`]: lifecycle, command lock and blocking
//!   call offload
//!
//! ## Architecture
//!
//! ```text
//! REST handlers / WebSocket loops
//!          │  async
//!          ▼
//!   InstrumentSession ── tokio Mutex (command lock) ── spawn_blocking
//!          │  sync, lock held
//!          ▼
//!   Ctp10 command layer ──► Box<dyn ScpiTransport> (TCP socket | simulator)
//! ```

pub mod block;
pub mod commands;
pub mod condition;
pub mod drivers;
pub mod error;
pub mod readings;
pub mod session;

use std::time::Duration;

use crate::config::{DriverKind, InstrumentConfig};

pub use commands::Ctp10;
pub use error::{GatewayError, GatewayResult, InstrumentError, InstrumentResult};
pub use readings::{DetectorSnapshot, RawTrace, RLaserReading, Stabilization, TlsSettings, TraceMetadata};
pub use session::InstrumentSession;

/// Blocking SCPI channel to one instrument.
///
/// A transport is only ever used by one caller at a time: the session keeps
/// it behind the command lock. Implementations therefore do not need any
/// internal synchronization.
#[cfg_attr(test, mockall::automock)]
pub trait ScpiTransport: Send {
    /// Send a command that produces no reply.
    fn write(&mut self, command: &str) -> InstrumentResult<()>;

    /// Send a query and return its reply without the line terminator.
    fn query(&mut self, command: &str) -> InstrumentResult<String>;

    /// Send a query answered with an IEEE 488.2 block, return the payload.
    fn query_block(&mut self, command: &str) -> InstrumentResult<Vec<u8>>;

    /// Release the underlying resource.
    fn close(&mut self) -> InstrumentResult<()> {
        Ok(())
    }
}

/// Factory for transports.
#[cfg_attr(test, mockall::automock)]
pub trait TransportConnector: Send + Sync {
    /// Open a transport to `address`. Blocking.
    fn open(&self, address: &str, timeout: Duration) -> InstrumentResult<Box<dyn ScpiTransport>>;

    /// Human readable name of the binding, for logs.
    fn name(&self) -> &'static str;
}

/// Create the connector matching the configured driver.
///
/// # Example
///
/// ```
/// use ctp10_gateway::config::{DriverKind, InstrumentConfig};
/// use ctp10_gateway::instrument::create_connector;
///
/// let config = InstrumentConfig {
///     driver: DriverKind::Simulated,
///     ..Default::default()
/// };
/// let connector = create_connector(&config);
/// assert_eq!(connector.name(), "simulated");
/// ```
pub fn create_connector(config: &InstrumentConfig) -> Box<dyn TransportConnector> {
    match config.driver {
        DriverKind::Scpi => Box::new(drivers::tcp::TcpConnector),
        DriverKind::Simulated => Box::new(drivers::simulated::SimulatedConnector::default()),
    }
}
