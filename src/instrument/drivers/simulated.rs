// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated CTP10
//!
//! A stateful in-process instrument that interprets the same SCPI vocabulary
//! the command layer emits. It is used when the gateway runs with
//! `driver: simulated` and by the test suite.
//!
//! ### Behaviour
//!
//! - mnemonics are accepted in short or long form, case-insensitive
//! - unknown headers and out-of-range data are queued on the error queue,
//!   read back with `:SYST:ERR?`
//! - `:INIT` sets the scanning bit of the condition register for
//!   [`SWEEP_DURATION`], `:ABOR` clears it
//! - detector channel `c` reads `-15.5 + 2.3 c` dBm with ±0.05 dB noise
//! - traces span the TLS 1 sweep range: type 11 is a raw live trace of a
//!   micro-ring (Lorentzian dips every 1.2 nm), type 12 a flat -6 dB
//!   reference, the other types the transfer function `raw - reference`
//!
//! TLS channels default to the O-band laser (identifier 2).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::instrument::block::{encode_block, encode_f64_le};
use crate::instrument::commands::parse_f64;
use crate::instrument::condition::SCANNING;
use crate::instrument::error::{InstrumentError, InstrumentResult};
use crate::instrument::{ScpiTransport, TransportConnector};

pub const IDENTITY: &str = "EXFO,CTP10,12345678,1.2.3";
pub const SWEEP_DURATION: Duration = Duration::from_millis(500);
pub const DEFAULT_TRACE_POINTS: usize = 100_000;

const REFERENCE_LEVEL_DB: f64 = -6.0;
const RAW_BASELINE_DB: f64 = -16.0;
const RING_FSR_NM: f64 = 1.2;
const RING_OFFSET_NM: f64 = 0.3;

/// Short and long forms of every mnemonic the simulator knows.
const MNEMONICS: &[(&str, &str)] = &[
    ("ABOR", "ABORT"),
    ("CHAN", "CHANNEL"),
    ("COND", "CONDITION"),
    ("CTP", "CTP"),
    ("DATA", "DATA"),
    ("ERR", "ERROR"),
    ("IDN", "IDN"),
    ("INIT", "INITIATE"),
    ("LAS", "LASER"),
    ("LENG", "LENGTH"),
    ("OPER", "OPERATION"),
    ("POW", "POWER"),
    ("REF", "REFERENCE"),
    ("RLAS", "RLASER"),
    ("SAMP", "SAMPLING"),
    ("SENS", "SENSOR"),
    ("SPE", "SPEED"),
    ("SPEC", "SPECTRAL"),
    ("STAB", "STABILIZATION"),
    ("STAR", "START"),
    ("STAT", "STATE"),
    ("STAT", "STATUS"),
    ("STOP", "STOP"),
    ("SYST", "SYSTEM"),
    ("TLS", "TLS"),
    ("TRAC", "TRACE"),
    ("TRIG", "TRIGIN"),
    ("TYPE", "TYPE"),
    ("UNIT", "UNIT"),
    ("WAV", "WAVELENGTH"),
    ("X", "X"),
];

/// Reply produced by one command.
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    None,
    Text(String),
    Block(Vec<u8>),
}

#[derive(Debug, Clone)]
struct DetectorState {
    wavelength_nm: f64,
    power_unit: String,
    spectral_unit: String,
}

impl Default for DetectorState {
    fn default() -> Self {
        Self {
            wavelength_nm: 1310.0,
            power_unit: "dBm".to_string(),
            spectral_unit: "nm".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TlsState {
    start_nm: f64,
    stop_nm: f64,
    speed_nmps: f64,
    power_dbm: f64,
    trigin: u8,
    identifier: u8,
}

impl TlsState {
    /// Preset applied when a laser identifier is selected.
    fn preset(identifier: u8) -> Self {
        match identifier {
            1 => Self {
                start_nm: 1502.0,
                stop_nm: 1627.0,
                speed_nmps: 20.0,
                power_dbm: 8.0,
                trigin: 1,
                identifier,
            },
            2 => Self {
                start_nm: 1262.5,
                stop_nm: 1355.0,
                speed_nmps: 20.0,
                power_dbm: 10.0,
                trigin: 2,
                identifier,
            },
            _ => Self {
                start_nm: 1500.0,
                stop_nm: 1600.0,
                speed_nmps: 20.0,
                power_dbm: 5.0,
                trigin: 0,
                identifier,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct RLaserState {
    id: String,
    wavelength_nm: f64,
    power_dbm: f64,
    on: bool,
}

impl RLaserState {
    fn for_number(number: u8) -> Self {
        let (id, wavelength_nm, power_dbm) = match number {
            1 => ("EXFO,T100S-HP,0,6.07", 1550.0, 8.0),
            2 => ("EXFO,T200S-O-M,EO241510155,4.6.3.0", 1355.0, 10.0),
            _ => ("EXFO,Unknown,0,0.0.0", 1550.0, 5.0),
        };
        Self {
            id: id.to_string(),
            wavelength_nm,
            power_dbm,
            on: false,
        }
    }
}

/// One micro-ring resonance.
#[derive(Debug, Clone, Copy)]
struct Resonance {
    extinction_db: f64,
    linewidth_nm: f64,
}

/// The simulated instrument state.
pub struct SimulatedCtp10 {
    error_queue: VecDeque<(i32, String)>,
    resolution_pm: f64,
    stabilization: (bool, f64),
    sweep_range_nm: (f64, f64),
    sweep_until: Option<Instant>,
    detectors: HashMap<(u32, u32), DetectorState>,
    tls: Vec<TlsState>,
    rlasers: Vec<RLaserState>,
    trace_points: usize,
    resonances: Vec<Resonance>,
    rng: StdRng,
}

impl Default for SimulatedCtp10 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCtp10 {
    pub fn new() -> Self {
        let tls = vec![TlsState::preset(2); 4];
        let first = tls[0].clone();
        Self {
            error_queue: VecDeque::new(),
            resolution_pm: 0.1,
            stabilization: (true, 0.0),
            sweep_range_nm: (first.start_nm, first.stop_nm),
            sweep_until: None,
            detectors: HashMap::new(),
            tls,
            rlasers: (1..=10).map(RLaserState::for_number).collect(),
            trace_points: DEFAULT_TRACE_POINTS,
            resonances: Vec::new(),
            rng: StdRng::seed_from_u64(rand::random()),
        }
    }

    /// Use fewer trace points, tests do not need 100 000.
    pub fn with_trace_points(mut self, points: usize) -> Self {
        self.trace_points = points.max(2);
        self
    }

    pub fn condition_register(&self) -> u16 {
        match self.sweep_until {
            Some(until) if Instant::now() < until => SCANNING,
            _ => 0,
        }
    }

    fn push_error(&mut self, code: i32, message: &str) {
        debug!("Simulated CTP10 error {}: {}", code, message);
        if self.error_queue.len() < 32 {
            self.error_queue.push_back((code, message.to_string()));
        }
    }

    fn execute(&mut self, command: &str) -> Reply {
        trace!("Simulated CTP10 <- {}", command);
        match self.dispatch(command) {
            Ok(reply) => reply,
            Err((code, message)) => {
                self.push_error(code, message);
                Reply::None
            }
        }
    }

    fn dispatch(&mut self, command: &str) -> Result<Reply, (i32, &'static str)> {
        let command = command.trim();
        let (header, args) = match command.split_once(char::is_whitespace) {
            Some((header, args)) => (header, args.trim()),
            None => (command, ""),
        };
        let is_query = header.ends_with('?');
        let header = header.trim_end_matches('?');

        if let Some(common) = header.strip_prefix('*') {
            return self.common_command(&common.to_ascii_uppercase(), is_query);
        }

        let nodes = parse_header(header).ok_or((-113, "Undefined header"))?;
        let path: Vec<(&str, Option<u32>)> = nodes.iter().map(|(n, s)| (*n, *s)).collect();

        match (path.as_slice(), is_query) {
            ([("STAT", None), ("OPER", None), ("COND", None)], true) => {
                Ok(text(self.condition_register()))
            }
            ([("SYST", None), ("ERR", None)], true) => Ok(Reply::Text(
                match self.error_queue.pop_front() {
                    Some((code, message)) => format!("{},\"{}\"", code, message),
                    None => "0,\"No error\"".to_string(),
                },
            )),
            ([("INIT", None)], false) => {
                self.sweep_until = Some(Instant::now() + SWEEP_DURATION);
                Ok(Reply::None)
            }
            ([("ABOR", None)], false) => {
                self.sweep_until = None;
                Ok(Reply::None)
            }
            ([("INIT", None), ("WAV", None), ("SAMP", None)], true) => {
                Ok(text(self.resolution_pm))
            }
            ([("INIT", None), ("WAV", None), ("SAMP", None)], false) => {
                let value = scaled(args, Scale::Pm)?;
                if !(value > 0.0 && value <= 250.0) {
                    return Err((-222, "Data out of range"));
                }
                self.resolution_pm = value;
                Ok(Reply::None)
            }
            ([("INIT", None), ("WAV", None), (leaf @ ("STAR" | "STOP"), None)], query) => {
                let slot = if *leaf == "STAR" {
                    &mut self.sweep_range_nm.0
                } else {
                    &mut self.sweep_range_nm.1
                };
                if query {
                    return Ok(text(*slot));
                }
                *slot = in_range(scaled(args, Scale::Nm)?, 1200.0, 1700.0)?;
                Ok(Reply::None)
            }
            ([("INIT", None), ("STAB", None)], true) => Ok(Reply::Text(format!(
                "{},{}",
                u8::from(self.stabilization.0),
                self.stabilization.1
            ))),
            ([("INIT", None), ("STAB", None)], false) => {
                let (output, duration) = args.split_once(',').ok_or((-109, "Missing parameter"))?;
                let output = bool_arg(output)?;
                let duration = in_range(scaled(duration, Scale::None)?, 0.0, 60.0)?;
                self.stabilization = (output, duration);
                Ok(Reply::None)
            }
            ([("INIT", None), ("TLS", Some(ch)), (leaf, None)], query) => {
                let idx = suffix_index(*ch, 4)?;
                self.tls_command(idx, leaf, query, args)
            }
            ([("CTP", None), ("RLAS", Some(n)), rest @ ..], query) => {
                let idx = suffix_index(*n, 10)?;
                self.rlaser_command(idx, rest, query, args)
            }
            ([("CTP", None), ("SENS", Some(m)), ("CHAN", Some(c)), rest @ ..], query) => {
                suffix_index(*m, 20)?;
                let c_idx = suffix_index(*c, 6)?;
                self.detector_command((*m, *c), c_idx, rest, query, args)
            }
            ([("REF", None), ("SENS", Some(m)), ("CHAN", Some(c)), ("INIT", None)], false) => {
                suffix_index(*m, 20)?;
                suffix_index(*c, 6)?;
                debug!("Simulated reference taken on module {} channel {}", m, c);
                Ok(Reply::None)
            }
            (
                [("TRAC", None), ("SENS", Some(m)), ("CHAN", Some(c)), ("TYPE", Some(t)), rest @ ..],
                true,
            ) => {
                suffix_index(*m, 20)?;
                suffix_index(*c, 6)?;
                suffix_index(*t, 23)?;
                self.trace_command(*t, rest, args)
            }
            _ => Err((-113, "Undefined header")),
        }
    }

    fn common_command(&mut self, name: &str, is_query: bool) -> Result<Reply, (i32, &'static str)> {
        match (name, is_query) {
            ("IDN", true) => Ok(Reply::Text(IDENTITY.to_string())),
            ("OPC", true) => Ok(Reply::Text("1".to_string())),
            ("CLS", false) => {
                self.error_queue.clear();
                Ok(Reply::None)
            }
            ("RST", false) => {
                let trace_points = self.trace_points;
                *self = Self::new().with_trace_points(trace_points);
                Ok(Reply::None)
            }
            _ => Err((-113, "Undefined header")),
        }
    }

    fn tls_command(
        &mut self,
        idx: usize,
        leaf: &str,
        query: bool,
        args: &str,
    ) -> Result<Reply, (i32, &'static str)> {
        let tls = &mut self.tls[idx];
        if query {
            return match leaf {
                "STAR" => Ok(text(tls.start_nm)),
                "STOP" => Ok(text(tls.stop_nm)),
                "SPE" => Ok(text(tls.speed_nmps)),
                "POW" => Ok(text(tls.power_dbm)),
                "TRIG" => Ok(text(tls.trigin)),
                "LAS" => Ok(text(tls.identifier)),
                _ => Err((-113, "Undefined header")),
            };
        }
        match leaf {
            "STAR" => tls.start_nm = in_range(scaled(args, Scale::Nm)?, 1200.0, 1700.0)?,
            "STOP" => tls.stop_nm = in_range(scaled(args, Scale::Nm)?, 1200.0, 1700.0)?,
            "SPE" => tls.speed_nmps = in_range(scaled(args, Scale::None)?, 5.0, 200.0)?,
            "POW" => tls.power_dbm = in_range(scaled(args, Scale::None)?, -10.0, 10.0)?,
            "TRIG" => tls.trigin = in_range(scaled(args, Scale::None)?, 0.0, 8.0)? as u8,
            "LAS" => {
                let identifier = in_range(scaled(args, Scale::None)?, 0.0, 255.0)? as u8;
                *tls = TlsState::preset(identifier);
            }
            _ => return Err((-113, "Undefined header")),
        }
        if idx == 0 {
            self.resonances.clear();
        }
        Ok(Reply::None)
    }

    fn rlaser_command(
        &mut self,
        idx: usize,
        rest: &[(&str, Option<u32>)],
        query: bool,
        args: &str,
    ) -> Result<Reply, (i32, &'static str)> {
        let laser = &mut self.rlasers[idx];
        match (rest, query) {
            ([("IDN", None)], true) => Ok(Reply::Text(laser.id.clone())),
            ([("WAV", None)], true) => Ok(text(laser.wavelength_nm)),
            ([("WAV", None)], false) => {
                laser.wavelength_nm = in_range(scaled(args, Scale::Nm)?, 1200.0, 1700.0)?;
                Ok(Reply::None)
            }
            ([("POW", None)], true) => Ok(text(laser.power_dbm)),
            ([("POW", None)], false) => {
                laser.power_dbm = in_range(scaled(args, Scale::None)?, -20.0, 20.0)?;
                Ok(Reply::None)
            }
            ([("POW", None), ("STAT", None)], true) => Ok(text(u8::from(laser.on))),
            ([("POW", None), ("STAT", None)], false) => {
                laser.on = bool_arg(args)?;
                Ok(Reply::None)
            }
            _ => Err((-113, "Undefined header")),
        }
    }

    fn detector_command(
        &mut self,
        key: (u32, u32),
        channel_idx: usize,
        rest: &[(&str, Option<u32>)],
        query: bool,
        args: &str,
    ) -> Result<Reply, (i32, &'static str)> {
        let noise = self.rng.random_range(-0.05..0.05);
        let detector = self.detectors.entry(key).or_default();
        match (rest, query) {
            ([("POW", None)], true) => {
                let dbm = -15.5 + (channel_idx as f64 + 1.0) * 2.3 + noise;
                let value = match detector.power_unit.to_ascii_uppercase().as_str() {
                    "W" => 10f64.powf(dbm / 10.0) / 1000.0,
                    "MW" => 10f64.powf(dbm / 10.0),
                    _ => dbm,
                };
                Ok(text(value))
            }
            ([("POW", None), ("WAV", None)], true) => Ok(text(detector.wavelength_nm)),
            ([("POW", None), ("WAV", None)], false) => {
                detector.wavelength_nm = in_range(scaled(args, Scale::Nm)?, 1200.0, 1700.0)?;
                Ok(Reply::None)
            }
            ([("POW", None), ("UNIT", None)], true) => Ok(Reply::Text(detector.power_unit.clone())),
            ([("POW", None), ("UNIT", None)], false) => {
                detector.power_unit = match args.to_ascii_uppercase().as_str() {
                    "DBM" => "dBm".to_string(),
                    "W" => "W".to_string(),
                    "MW" => "mW".to_string(),
                    _ => return Err((-224, "Illegal parameter value")),
                };
                Ok(Reply::None)
            }
            ([("SPEC", None), ("UNIT", None)], true) => {
                Ok(Reply::Text(detector.spectral_unit.clone()))
            }
            ([("SPEC", None), ("UNIT", None)], false) => {
                detector.spectral_unit = match args.to_ascii_uppercase().as_str() {
                    "NM" | "WAV" => "nm".to_string(),
                    "THZ" | "FREQ" => "THz".to_string(),
                    _ => return Err((-224, "Illegal parameter value")),
                };
                Ok(Reply::None)
            }
            _ => Err((-113, "Undefined header")),
        }
    }

    fn trace_command(
        &mut self,
        trace_type: u32,
        rest: &[(&str, Option<u32>)],
        args: &str,
    ) -> Result<Reply, (i32, &'static str)> {
        let (start, stop) = (self.tls[0].start_nm, self.tls[0].stop_nm);
        let points = self.trace_points;
        match rest {
            [("DATA", None), ("LENG", None)] => Ok(text(points)),
            [("DATA", None), ("SAMP", None)] => {
                Ok(text((stop - start) / (points - 1) as f64 * 1000.0))
            }
            [("DATA", None), ("STAR", None)] => Ok(text(start)),
            [("DATA", None), ("X", None)] => {
                let axis: Vec<f64> = linspace(start, stop, points)
                    .into_iter()
                    .map(|nm| nm * 1e-9)
                    .collect();
                Ok(Reply::Block(encode_block(&encode_f64_le(&axis))))
            }
            [("DATA", None)] => {
                if !args.to_ascii_uppercase().starts_with("DB") {
                    return Err((-224, "Illegal parameter value"));
                }
                let values = self.trace_values(trace_type, start, stop, points);
                Ok(Reply::Block(encode_block(&encode_f64_le(&values))))
            }
            _ => Err((-113, "Undefined header")),
        }
    }

    fn trace_values(&mut self, trace_type: u32, start: f64, stop: f64, points: usize) -> Vec<f64> {
        let wavelengths = linspace(start, stop, points);
        match trace_type {
            12 => wavelengths
                .iter()
                .map(|_| REFERENCE_LEVEL_DB + self.rng.random_range(-0.02..0.02))
                .collect(),
            11 => self.raw_trace(&wavelengths, start),
            _ => self
                .raw_trace(&wavelengths, start)
                .into_iter()
                .map(|raw| raw - REFERENCE_LEVEL_DB)
                .collect(),
        }
    }

    fn raw_trace(&mut self, wavelengths: &[f64], start: f64) -> Vec<f64> {
        let span = wavelengths.last().copied().unwrap_or(start) - start;
        let needed = (span / RING_FSR_NM).ceil() as usize + 2;
        while self.resonances.len() < needed {
            self.resonances.push(Resonance {
                extinction_db: self.rng.random_range(15.0..20.0),
                linewidth_nm: self.rng.random_range(0.05..0.1),
            });
        }

        wavelengths
            .iter()
            .map(|&wl| {
                let position = (wl - start - RING_OFFSET_NM) / RING_FSR_NM;
                let nearest = position.round().max(0.0) as usize;
                let mut dip = 0.0;
                for k in nearest.saturating_sub(1)..=nearest + 1 {
                    if let Some(res) = self.resonances.get(k) {
                        let center = start + RING_OFFSET_NM + k as f64 * RING_FSR_NM;
                        let half = res.linewidth_nm / 2.0;
                        let detuning = wl - center;
                        dip += res.extinction_db * half * half / (detuning * detuning + half * half);
                    }
                }
                RAW_BASELINE_DB + 0.001 * (wl - start) - dip + self.rng.random_range(-0.05..0.05)
            })
            .collect()
    }
}

/// Split `CTP:SENS4:CHAN1:POW` into canonical mnemonics and numeric suffixes.
fn parse_header(header: &str) -> Option<Vec<(&'static str, Option<u32>)>> {
    header
        .trim_start_matches(':')
        .split(':')
        .map(|node| {
            let upper = node.to_ascii_uppercase();
            let digits_at = upper
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(upper.len());
            let (name, suffix) = upper.split_at(digits_at);
            let suffix = if suffix.is_empty() {
                None
            } else {
                Some(suffix.parse::<u32>().ok()?)
            };
            Some((canonical(name)?, suffix))
        })
        .collect()
}

fn canonical(token: &str) -> Option<&'static str> {
    if token.is_empty() {
        return None;
    }
    MNEMONICS
        .iter()
        .find(|(short, long)| token.starts_with(short) && long.starts_with(token))
        .map(|(short, _)| *short)
}

fn suffix_index(suffix: u32, max: u32) -> Result<usize, (i32, &'static str)> {
    if (1..=max).contains(&suffix) {
        Ok(suffix as usize - 1)
    } else {
        Err((-114, "Header suffix out of range"))
    }
}

#[derive(Debug, Clone, Copy)]
enum Scale {
    None,
    Nm,
    Pm,
}

/// Parse a numeric argument with an optional unit suffix.
fn scaled(arg: &str, scale: Scale) -> Result<f64, (i32, &'static str)> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err((-109, "Missing parameter"));
    }
    let value = parse_f64(arg).map_err(|_| (-104, "Data type error"))?;
    let unit: String = arg
        .trim_start_matches(|c: char| c.is_ascii_digit() || "+-.eE".contains(c))
        .trim()
        .to_ascii_uppercase();
    let factor = match (scale, unit.as_str()) {
        (_, "") => 1.0,
        (Scale::Nm, "NM") | (Scale::Pm, "PM") | (Scale::None, "DBM") => 1.0,
        (Scale::Nm, "M") => 1e9,
        (Scale::Nm, "PM") => 1e-3,
        (Scale::Pm, "NM") => 1e3,
        (Scale::Pm, "M") => 1e12,
        _ => return Err((-131, "Invalid suffix")),
    };
    Ok(value * factor)
}

fn in_range(value: f64, min: f64, max: f64) -> Result<f64, (i32, &'static str)> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err((-222, "Data out of range"))
    }
}

fn bool_arg(arg: &str) -> Result<bool, (i32, &'static str)> {
    match arg.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" => Ok(true),
        "0" | "OFF" => Ok(false),
        _ => Err((-224, "Illegal parameter value")),
    }
}

fn text(value: impl ToString) -> Reply {
    Reply::Text(value.to_string())
}

fn linspace(start: f64, stop: f64, points: usize) -> Vec<f64> {
    if points < 2 {
        return vec![start; points];
    }
    let step = (stop - start) / (points - 1) as f64;
    (0..points).map(|i| start + step * i as f64).collect()
}

fn lock(instrument: &Mutex<SimulatedCtp10>) -> std::sync::MutexGuard<'_, SimulatedCtp10> {
    instrument.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport bound to a shared [`SimulatedCtp10`].
pub struct SimulatedTransport {
    instrument: Arc<Mutex<SimulatedCtp10>>,
    latency: Duration,
    timeout: Duration,
    closed: bool,
}

impl SimulatedTransport {
    fn round_trip(&mut self, command: &str) -> InstrumentResult<Reply> {
        if self.closed {
            return Err(InstrumentError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "simulated transport is closed",
            )));
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(lock(&self.instrument).execute(command))
    }

    fn no_reply(&self, command: &str) -> InstrumentError {
        InstrumentError::Timeout {
            command: command.to_string(),
            timeout: self.timeout,
        }
    }
}

impl ScpiTransport for SimulatedTransport {
    fn write(&mut self, command: &str) -> InstrumentResult<()> {
        self.round_trip(command).map(|_| ())
    }

    fn query(&mut self, command: &str) -> InstrumentResult<String> {
        match self.round_trip(command)? {
            Reply::Text(text) => Ok(text),
            Reply::Block(_) => Err(InstrumentError::Unsupported(format!(
                "{} returns a binary block",
                command
            ))),
            Reply::None => Err(self.no_reply(command)),
        }
    }

    fn query_block(&mut self, command: &str) -> InstrumentResult<Vec<u8>> {
        match self.round_trip(command)? {
            Reply::Block(block) => crate::instrument::block::parse_block(&block).map(<[u8]>::to_vec),
            Reply::Text(text) => Err(InstrumentError::Block(format!(
                "expected a block, got {:?}",
                text
            ))),
            Reply::None => Err(self.no_reply(command)),
        }
    }

    fn close(&mut self) -> InstrumentResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Opens transports onto one shared simulated instrument, so that state
/// survives a disconnect/connect cycle like on the real hardware.
#[derive(Clone)]
pub struct SimulatedConnector {
    instrument: Arc<Mutex<SimulatedCtp10>>,
    latency: Duration,
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(SimulatedCtp10::new())
    }
}

impl SimulatedConnector {
    pub fn new(instrument: SimulatedCtp10) -> Self {
        Self {
            instrument: Arc::new(Mutex::new(instrument)),
            latency: Duration::ZERO,
        }
    }

    /// Add a fixed delay to every round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Inspect the instrument state.
    pub fn instrument(&self) -> Arc<Mutex<SimulatedCtp10>> {
        Arc::clone(&self.instrument)
    }
}

impl TransportConnector for SimulatedConnector {
    fn open(&self, address: &str, timeout: Duration) -> InstrumentResult<Box<dyn ScpiTransport>> {
        debug!("Opening simulated CTP10 for {}", address);
        Ok(Box::new(SimulatedTransport {
            instrument: Arc::clone(&self.instrument),
            latency: self.latency,
            timeout,
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
