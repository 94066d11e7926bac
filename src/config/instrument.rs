// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Instrument connection configuration
//!
//! Settings used by the session manager to reach the CTP10 and to seed the
//! detector defaults applied after a successful auto-connect.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which transport binding the session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Raw SCPI over a TCP socket (the CTP10 listens on port 5025).
    #[default]
    Scpi,
    /// In-process simulated CTP10, pre-connected at startup.
    Simulated,
}

/// CTP10 connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Transport binding.
    #[serde(default)]
    pub driver: DriverKind,

    /// IP address of the instrument.
    #[serde(default = "default_ip")]
    pub ip: String,

    /// SCPI socket port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// I/O timeout in milliseconds. Long sweeps need generous values.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect when the daemon starts.
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,

    /// Detector module used when a request omits it (1-20).
    #[serde(default = "default_module")]
    pub default_module: u8,

    /// Detector channel used when a request omits it (1-6).
    #[serde(default = "default_channel")]
    pub default_channel: u8,

    /// Detector wavelength applied after auto-connect, in nm.
    #[serde(default = "default_wavelength_nm")]
    pub default_wavelength_nm: f64,
}

fn default_ip() -> String {
    "192.168.1.37".to_string()
}

fn default_port() -> u16 {
    5025
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_auto_connect() -> bool {
    true
}

fn default_module() -> u8 {
    4
}

fn default_channel() -> u8 {
    1
}

fn default_wavelength_nm() -> f64 {
    1310.0
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            ip: default_ip(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            auto_connect: default_auto_connect(),
            default_module: default_module(),
            default_channel: default_channel(),
            default_wavelength_nm: default_wavelength_nm(),
        }
    }
}

impl InstrumentConfig {
    /// VISA-style resource string, e.g. `TCPIP::192.168.1.37::5025::SOCKET`.
    pub fn address(&self) -> String {
        format!("TCPIP::{}::{}::SOCKET", self.ip, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
