// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Typed CTP10 command layer
//!
//! [`Ctp10`] borrows a transport and turns typed operations into SCPI
//! strings. It does no locking of its own: callers obtain it through
//! [`crate::instrument::InstrumentSession::execute`], which holds the command
//! lock for the lifetime of the borrow.
//!
//! Wavelength scalars are sent in nm with an `NM` suffix. Replies are accepted
//! either in the unit that was set or in SI (metres), the latter is detected
//! by magnitude and converted.

use super::block::decode_f64_le;
use super::condition;
use super::error::{InstrumentError, InstrumentResult};
use super::readings::{DetectorSnapshot, RLaserReading, RawTrace, Stabilization, TlsSettings, TraceMetadata};
use super::ScpiTransport;

/// Number of detector channels read by a snapshot.
pub const SNAPSHOT_CHANNELS: u8 = 4;

/// Error queue entries drained by [`Ctp10::check_errors`] before giving up.
const MAX_ERROR_QUEUE: usize = 32;

/// The CTP10 as seen through one transport.
pub struct Ctp10<'a> {
    io: &'a mut dyn ScpiTransport,
}

impl<'a> Ctp10<'a> {
    pub fn new(io: &'a mut dyn ScpiTransport) -> Self {
        Self { io }
    }

    /// Raw access for commands not covered by the typed API.
    pub fn transport(&mut self) -> &mut dyn ScpiTransport {
        &mut *self.io
    }

    pub fn identify(&mut self) -> InstrumentResult<String> {
        Ok(self.io.query("*IDN?")?.trim().to_string())
    }

    /// Operation condition register.
    pub fn condition_register(&mut self) -> InstrumentResult<u16> {
        let reply = self.io.query(":STAT:OPER:COND?")?;
        let value = parse_f64(&reply)?;
        if !(0.0..=u16::MAX as f64).contains(&value) {
            return Err(InstrumentError::Parse(reply));
        }
        Ok(value as u16)
    }

    /// Drain the error queue, failing if it held anything.
    pub fn check_errors(&mut self) -> InstrumentResult<()> {
        let mut errors = Vec::new();
        for _ in 0..MAX_ERROR_QUEUE {
            let reply = self.io.query(":SYST:ERR?")?;
            let (code, message) = parse_error_entry(&reply)?;
            if code == 0 {
                break;
            }
            errors.push(format!("{}, {}", code, message));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InstrumentError::Status(errors.join("; ")))
        }
    }

    pub fn resolution_pm(&mut self) -> InstrumentResult<f64> {
        let value = parse_f64(&self.io.query(":INIT:WAV:SAMP?")?)?;
        Ok(pm_from_reply(value))
    }

    pub fn set_resolution_pm(&mut self, resolution_pm: f64) -> InstrumentResult<()> {
        self.io.write(&format!(":INIT:WAV:SAMP {}PM", resolution_pm))
    }

    pub fn stabilization(&mut self) -> InstrumentResult<Stabilization> {
        let reply = self.io.query(":INIT:STAB?")?;
        let mut fields = reply.split(',');
        let output = fields
            .next()
            .map(parse_bool)
            .transpose()?
            .ok_or_else(|| InstrumentError::Parse(reply.clone()))?;
        let duration_seconds = fields
            .next()
            .map(parse_f64)
            .transpose()?
            .ok_or_else(|| InstrumentError::Parse(reply.clone()))?;
        Ok(Stabilization {
            output,
            duration_seconds,
        })
    }

    pub fn set_stabilization(&mut self, output: bool, duration_seconds: f64) -> InstrumentResult<()> {
        self.io.write(&format!(
            ":INIT:STAB {},{}",
            u8::from(output),
            duration_seconds
        ))
    }

    /// Global sweep start and stop, in nm.
    pub fn sweep_wavelengths(&mut self) -> InstrumentResult<(f64, f64)> {
        let start = nm_from_reply(parse_f64(&self.io.query(":INIT:WAV:STAR?")?)?);
        let stop = nm_from_reply(parse_f64(&self.io.query(":INIT:WAV:STOP?")?)?);
        Ok((start, stop))
    }

    pub fn set_sweep_wavelengths(&mut self, start_nm: f64, stop_nm: f64) -> InstrumentResult<()> {
        self.io.write(&format!(":INIT:WAV:STAR {}NM", start_nm))?;
        self.io.write(&format!(":INIT:WAV:STOP {}NM", stop_nm))
    }

    pub fn initiate_sweep(&mut self) -> InstrumentResult<()> {
        self.io.write(":INIT")
    }

    pub fn abort(&mut self) -> InstrumentResult<()> {
        self.io.write(":ABOR")
    }

    pub fn sweep_complete(&mut self) -> InstrumentResult<bool> {
        Ok(!condition::is_sweeping(self.condition_register()?))
    }

    /// Read wavelength and unit once, then the power of channels 1 to 4.
    ///
    /// All reads go through the same borrow of the transport, so a caller
    /// holding the command lock gets a temporally consistent group.
    pub fn snapshot(&mut self, module: u8) -> InstrumentResult<DetectorSnapshot> {
        let (wavelength_nm, unit) = {
            let mut first = self.detector(module, 1);
            (first.wavelength_nm()?, first.power_unit()?)
        };
        let mut powers = [0.0f64; SNAPSHOT_CHANNELS as usize];
        for (idx, power) in powers.iter_mut().enumerate() {
            *power = self.detector(module, idx as u8 + 1).power()?;
        }
        Ok(DetectorSnapshot {
            timestamp: unix_timestamp(),
            module,
            wavelength_nm,
            unit,
            ch1_power: powers[0],
            ch2_power: powers[1],
            ch3_power: powers[2],
            ch4_power: powers[3],
        })
    }

    pub fn detector(&mut self, module: u8, channel: u8) -> Detector<'_> {
        Detector {
            io: &mut *self.io,
            module,
            channel,
        }
    }

    pub fn tls(&mut self, channel: u8) -> Tls<'_> {
        Tls {
            io: &mut *self.io,
            channel,
        }
    }

    pub fn rlaser(&mut self, number: u8) -> RLaser<'_> {
        RLaser {
            io: &mut *self.io,
            number,
        }
    }
}

/// One detector channel of one module.
pub struct Detector<'a> {
    io: &'a mut dyn ScpiTransport,
    module: u8,
    channel: u8,
}

impl Detector<'_> {
    fn node(&self) -> String {
        format!(":CTP:SENS{}:CHAN{}", self.module, self.channel)
    }

    fn trace_node(&self, trace_type: u8) -> String {
        format!(
            ":TRAC:SENS{}:CHAN{}:TYPE{}",
            self.module, self.channel, trace_type
        )
    }

    pub fn power(&mut self) -> InstrumentResult<f64> {
        parse_f64(&self.io.query(&format!("{}:POW?", self.node()))?)
    }

    pub fn wavelength_nm(&mut self) -> InstrumentResult<f64> {
        let value = parse_f64(&self.io.query(&format!("{}:POW:WAV?", self.node()))?)?;
        Ok(nm_from_reply(value))
    }

    pub fn set_wavelength_nm(&mut self, wavelength_nm: f64) -> InstrumentResult<()> {
        self.io
            .write(&format!("{}:POW:WAV {}NM", self.node(), wavelength_nm))
    }

    pub fn power_unit(&mut self) -> InstrumentResult<String> {
        parse_text(&self.io.query(&format!("{}:POW:UNIT?", self.node()))?)
    }

    pub fn set_power_unit(&mut self, unit: &str) -> InstrumentResult<()> {
        self.io.write(&format!("{}:POW:UNIT {}", self.node(), unit))
    }

    pub fn spectral_unit(&mut self) -> InstrumentResult<String> {
        parse_text(&self.io.query(&format!("{}:SPEC:UNIT?", self.node()))?)
    }

    pub fn set_spectral_unit(&mut self, unit: &str) -> InstrumentResult<()> {
        self.io.write(&format!("{}:SPEC:UNIT {}", self.node(), unit))
    }

    pub fn create_reference(&mut self) -> InstrumentResult<()> {
        self.io.write(&format!(
            ":REF:SENS{}:CHAN{}:INIT",
            self.module, self.channel
        ))
    }

    pub fn trace_length(&mut self, trace_type: u8) -> InstrumentResult<usize> {
        let reply = self
            .io
            .query(&format!("{}:DATA:LENG?", self.trace_node(trace_type)))?;
        let value = parse_f64(&reply)?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(InstrumentError::Parse(reply));
        }
        Ok(value as usize)
    }

    pub fn trace_sampling_pm(&mut self, trace_type: u8) -> InstrumentResult<f64> {
        let value = parse_f64(
            &self
                .io
                .query(&format!("{}:DATA:SAMP?", self.trace_node(trace_type)))?,
        )?;
        Ok(pm_from_reply(value))
    }

    pub fn trace_start_nm(&mut self, trace_type: u8) -> InstrumentResult<f64> {
        let value = parse_f64(
            &self
                .io
                .query(&format!("{}:DATA:STAR?", self.trace_node(trace_type)))?,
        )?;
        Ok(nm_from_reply(value))
    }

    pub fn trace_metadata(&mut self, trace_type: u8) -> InstrumentResult<TraceMetadata> {
        Ok(TraceMetadata {
            module: self.module,
            channel: self.channel,
            trace_type,
            num_points: self.trace_length(trace_type)?,
            unit: "dB".to_string(),
            sampling_pm: self.trace_sampling_pm(trace_type)?,
            start_wavelength_nm: self.trace_start_nm(trace_type)?,
        })
    }

    /// Wavelength axis in metres.
    pub fn trace_wavelengths_m(&mut self, trace_type: u8) -> InstrumentResult<Vec<f64>> {
        let payload = self
            .io
            .query_block(&format!("{}:DATA:X? M,BIN", self.trace_node(trace_type)))?;
        decode_f64_le(&payload)
    }

    /// Trace values in dB.
    pub fn trace_values(&mut self, trace_type: u8) -> InstrumentResult<Vec<f64>> {
        let payload = self
            .io
            .query_block(&format!("{}:DATA? DB,BIN", self.trace_node(trace_type)))?;
        decode_f64_le(&payload)
    }

    /// Metadata plus both axes. The two arrays must have the same length.
    pub fn trace(&mut self, trace_type: u8) -> InstrumentResult<RawTrace> {
        let metadata = self.trace_metadata(trace_type)?;
        let wavelengths_m = self.trace_wavelengths_m(trace_type)?;
        let values = self.trace_values(trace_type)?;
        if wavelengths_m.len() != values.len() {
            return Err(InstrumentError::Block(format!(
                "trace axes differ in length: {} wavelengths, {} values",
                wavelengths_m.len(),
                values.len()
            )));
        }
        Ok(RawTrace {
            metadata,
            wavelengths_m,
            values,
        })
    }
}

/// One tunable laser source channel.
pub struct Tls<'a> {
    io: &'a mut dyn ScpiTransport,
    channel: u8,
}

impl Tls<'_> {
    fn node(&self) -> String {
        format!(":INIT:TLS{}", self.channel)
    }

    fn query_number(&mut self, leaf: &str) -> InstrumentResult<f64> {
        parse_f64(&self.io.query(&format!("{}:{}?", self.node(), leaf))?)
    }

    pub fn start_wavelength_nm(&mut self) -> InstrumentResult<f64> {
        Ok(nm_from_reply(self.query_number("STAR")?))
    }

    pub fn set_start_wavelength_nm(&mut self, value: f64) -> InstrumentResult<()> {
        self.io.write(&format!("{}:STAR {}NM", self.node(), value))
    }

    pub fn stop_wavelength_nm(&mut self) -> InstrumentResult<f64> {
        Ok(nm_from_reply(self.query_number("STOP")?))
    }

    pub fn set_stop_wavelength_nm(&mut self, value: f64) -> InstrumentResult<()> {
        self.io.write(&format!("{}:STOP {}NM", self.node(), value))
    }

    pub fn sweep_speed_nmps(&mut self) -> InstrumentResult<f64> {
        self.query_number("SPE")
    }

    pub fn set_sweep_speed_nmps(&mut self, value: f64) -> InstrumentResult<()> {
        self.io.write(&format!("{}:SPE {}", self.node(), value))
    }

    pub fn power_dbm(&mut self) -> InstrumentResult<f64> {
        self.query_number("POW")
    }

    pub fn set_power_dbm(&mut self, value: f64) -> InstrumentResult<()> {
        self.io.write(&format!("{}:POW {}DBM", self.node(), value))
    }

    pub fn trigin(&mut self) -> InstrumentResult<u8> {
        to_u8(self.query_number("TRIG")?)
    }

    pub fn set_trigin(&mut self, value: u8) -> InstrumentResult<()> {
        self.io.write(&format!("{}:TRIG {}", self.node(), value))
    }

    pub fn identifier(&mut self) -> InstrumentResult<u8> {
        to_u8(self.query_number("LAS")?)
    }

    pub fn set_identifier(&mut self, value: u8) -> InstrumentResult<()> {
        self.io.write(&format!("{}:LAS {}", self.node(), value))
    }

    pub fn settings(&mut self) -> InstrumentResult<TlsSettings> {
        Ok(TlsSettings {
            channel: self.channel,
            start_wavelength_nm: self.start_wavelength_nm()?,
            stop_wavelength_nm: self.stop_wavelength_nm()?,
            sweep_speed_nmps: self.sweep_speed_nmps()?,
            laser_power_dbm: self.power_dbm()?,
            trigin: self.trigin()?,
            identifier: self.identifier()?,
        })
    }
}

/// One reference laser.
pub struct RLaser<'a> {
    io: &'a mut dyn ScpiTransport,
    number: u8,
}

impl RLaser<'_> {
    fn node(&self) -> String {
        format!(":CTP:RLAS{}", self.number)
    }

    pub fn identity(&mut self) -> InstrumentResult<String> {
        Ok(self
            .io
            .query(&format!("{}:IDN?", self.node()))?
            .trim()
            .to_string())
    }

    pub fn wavelength_nm(&mut self) -> InstrumentResult<f64> {
        let value = parse_f64(&self.io.query(&format!("{}:WAV?", self.node()))?)?;
        Ok(nm_from_reply(value))
    }

    pub fn set_wavelength_nm(&mut self, value: f64) -> InstrumentResult<()> {
        self.io.write(&format!("{}:WAV {}NM", self.node(), value))
    }

    pub fn power_dbm(&mut self) -> InstrumentResult<f64> {
        parse_f64(&self.io.query(&format!("{}:POW?", self.node()))?)
    }

    pub fn set_power_dbm(&mut self, value: f64) -> InstrumentResult<()> {
        self.io.write(&format!("{}:POW {}DBM", self.node(), value))
    }

    pub fn is_on(&mut self) -> InstrumentResult<bool> {
        parse_bool(&self.io.query(&format!("{}:POW:STAT?", self.node()))?)
    }

    pub fn set_on(&mut self, on: bool) -> InstrumentResult<()> {
        self.io
            .write(&format!("{}:POW:STAT {}", self.node(), u8::from(on)))
    }

    pub fn reading(&mut self) -> InstrumentResult<RLaserReading> {
        Ok(RLaserReading {
            laser_number: self.number,
            id: self.identity()?,
            power_dbm: self.power_dbm()?,
            wavelength_nm: self.wavelength_nm()?,
            is_on: self.is_on()?,
        })
    }
}

/// Parse a numeric reply, tolerating a trailing unit such as `NM` or `DBM`.
pub fn parse_f64(reply: &str) -> InstrumentResult<f64> {
    let trimmed = reply.trim();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| {
            !(c.is_ascii_digit()
                || c == '.'
                || c == '+'
                || c == '-'
                || ((c == 'e' || c == 'E') && is_exponent(&trimmed[i + 1..])))
        })
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end]
        .parse::<f64>()
        .map_err(|_| InstrumentError::Parse(reply.trim().to_string()))
}

fn is_exponent(rest: &str) -> bool {
    let rest = rest.strip_prefix(['+', '-']).unwrap_or(rest);
    rest.starts_with(|c: char| c.is_ascii_digit())
}

pub fn parse_bool(reply: &str) -> InstrumentResult<bool> {
    match reply.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" | "TRUE" => Ok(true),
        "0" | "OFF" | "FALSE" => Ok(false),
        other => parse_f64(other)
            .map(|v| v != 0.0)
            .map_err(|_| InstrumentError::Parse(reply.trim().to_string())),
    }
}

fn parse_text(reply: &str) -> InstrumentResult<String> {
    let text = reply.trim().trim_matches('"');
    if text.is_empty() {
        return Err(InstrumentError::Parse(reply.to_string()));
    }
    Ok(text.to_string())
}

/// Parse one `:SYST:ERR?` entry, e.g. `-113,"Undefined header"`.
pub fn parse_error_entry(reply: &str) -> InstrumentResult<(i32, String)> {
    let reply = reply.trim();
    let (code, message) = reply.split_once(',').unwrap_or((reply, ""));
    let code = code
        .trim()
        .parse::<i32>()
        .map_err(|_| InstrumentError::Parse(reply.to_string()))?;
    Ok((code, message.trim().trim_matches('"').to_string()))
}

fn to_u8(value: f64) -> InstrumentResult<u8> {
    if (0.0..=u8::MAX as f64).contains(&value) && value.fract() == 0.0 {
        Ok(value as u8)
    } else {
        Err(InstrumentError::Parse(value.to_string()))
    }
}

/// Wavelengths below a millimetre can only be SI metres.
fn nm_from_reply(value: f64) -> f64 {
    if value != 0.0 && value.abs() < 1e-3 {
        value * 1e9
    } else {
        value
    }
}

fn pm_from_reply(value: f64) -> f64 {
    if value != 0.0 && value.abs() < 1e-6 {
        value * 1e12
    } else {
        value
    }
}

pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}
