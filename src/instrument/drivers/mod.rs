// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transport bindings
//!
//! - [`tcp`]: raw SCPI socket to the real instrument
//! - [`simulated`]: in-process CTP10 for offline use and tests

pub mod simulated;
pub mod tcp;

pub use simulated::{SimulatedConnector, SimulatedCtp10};
pub use tcp::{TcpConnector, TcpScpiTransport};
