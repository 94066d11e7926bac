// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Typed values read back from the CTP10
//!
//! These are shared by the REST handlers and the streaming loop, so they
//! carry both serde and JsonSchema derives.

use rocket_okapi::JsonSchema;
use serde::{Deserialize, Serialize};

/// Temporally consistent power reading of one detector module.
///
/// The wavelength and unit are read once, then the four channel powers, all
/// under a single acquisition of the command lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectorSnapshot {
    /// Unix timestamp in seconds
    pub timestamp: f64,
    pub module: u8,
    pub wavelength_nm: f64,
    pub unit: String,
    pub ch1_power: f64,
    pub ch2_power: f64,
    pub ch3_power: f64,
    pub ch4_power: f64,
}

/// Sweep stabilization settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Stabilization {
    /// Laser output left on after the sweep
    pub output: bool,
    pub duration_seconds: f64,
}

/// Description of one trace stored by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TraceMetadata {
    pub module: u8,
    pub channel: u8,
    pub trace_type: u8,
    pub num_points: usize,
    pub unit: String,
    pub sampling_pm: f64,
    pub start_wavelength_nm: f64,
}

/// A full trace, wavelengths in metres as the instrument sends them.
#[derive(Debug, Clone)]
pub struct RawTrace {
    pub metadata: TraceMetadata,
    pub wavelengths_m: Vec<f64>,
    pub values: Vec<f64>,
}

impl RawTrace {
    pub fn wavelengths_nm(&self) -> Vec<f64> {
        self.wavelengths_m.iter().map(|w| w * 1e9).collect()
    }
}

/// Current settings of one tunable laser source channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TlsSettings {
    pub channel: u8,
    pub start_wavelength_nm: f64,
    pub stop_wavelength_nm: f64,
    pub sweep_speed_nmps: f64,
    pub laser_power_dbm: f64,
    pub trigin: u8,
    pub identifier: u8,
}

/// Current settings of one reference laser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RLaserReading {
    pub laser_number: u8,
    pub id: String,
    pub power_dbm: f64,
    pub wavelength_nm: f64,
    pub is_on: bool,
}

/// `*IDN?`-style identification split into its four fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Identity {
    /// Missing fields come back as empty strings.
    pub fn parse(idn: &str) -> Self {
        let mut parts = idn.trim().splitn(4, ',').map(|p| p.trim().to_string());
        Self {
            manufacturer: parts.next().unwrap_or_default(),
            model: parts.next().unwrap_or_default(),
            serial: parts.next().unwrap_or_default(),
            firmware: parts.next().unwrap_or_default(),
        }
    }
}
