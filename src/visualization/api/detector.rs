// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Detector endpoints under `/detector`
//!
//! Module and channel come from the `module` and `channel` query parameters
//! and default to the configured ones. Reads that must be consistent (the
//! four-channel snapshot, a trace with both axes) run under one acquisition
//! of the command lock; configuration reads and writes issue one acquisition
//! per field so a long request does not starve the streaming clients.

use std::io::Cursor;

use rocket::http::{ContentType, Header};
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{get, post, Request, Response};
use rocket_okapi::gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{MediaType, OpenApi, RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::Map;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::{openapi, openapi_get_routes_spec, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::instrument::{DetectorSnapshot, Stabilization, TraceMetadata};
use crate::utility::write_structured_f64;

use super::{in_range, ApiError, ApiResult, Instrument, StatusMessage};

pub const TRACE_TYPE_RANGE: (u8, u8) = (1, 23);
pub const POWER_UNITS: &[&str] = &["DBM", "W", "MW"];
pub const SPECTRAL_UNITS: &[&str] = &["WAV", "FREQ", "NM", "THZ"];

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PowerReading {
    pub module: u8,
    pub channel: u8,
    pub power: f64,
    pub unit: String,
}

/// Detector settings. A field is null when its read failed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectorConfig {
    pub module: u8,
    pub channel: u8,
    pub wavelength_nm: Option<f64>,
    pub power_unit: Option<String>,
    pub spectral_unit: Option<String>,
    pub resolution_pm: Option<f64>,
}

/// Partial detector update, absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectorConfigUpdate {
    /// 1200 to 1700 nm
    pub wavelength_nm: Option<f64>,
    /// DBM, W or MW
    pub power_unit: Option<String>,
    /// WAV or FREQ
    pub spectral_unit: Option<String>,
    /// Sweep sampling resolution, 0.1 to 250 pm
    pub resolution_pm: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectorConfigResponse {
    pub success: bool,
    pub module: u8,
    pub channel: u8,
    /// The fields that were applied
    pub applied: DetectorConfigUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TraceData {
    pub metadata: TraceMetadata,
    pub wavelengths_nm: Vec<f64>,
    pub values: Vec<f64>,
}

/// Check the stabilization duration, shared with `/measurement`.
pub fn stabilization_duration(duration_seconds: f64) -> ApiResult<f64> {
    if (0.0..=60.0).contains(&duration_seconds) {
        Ok(duration_seconds)
    } else {
        Err(ApiError::bad_request("Duration must be 0-60 seconds"))
    }
}

pub fn resolution_pm(resolution_pm: f64) -> ApiResult<f64> {
    in_range("resolution_pm", resolution_pm, 0.1, 250.0)
}

fn unit_choice(name: &str, value: &str, allowed: &[&str]) -> ApiResult<String> {
    let upper = value.trim().to_ascii_uppercase();
    if allowed.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ApiError::validation(format!(
            "{} must be one of {}",
            name,
            allowed.join(", ")
        )))
    }
}

fn trace_type(trace_type: Option<u8>) -> ApiResult<u8> {
    in_range(
        "trace_type",
        trace_type.unwrap_or(1),
        TRACE_TYPE_RANGE.0,
        TRACE_TYPE_RANGE.1,
    )
}

/// NPY download with an attachment file name.
pub struct NpyFile {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl<'r> Responder<'r, 'static> for NpyFile {
    fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(ContentType::Binary)
            .header(Header::new(
                "Content-Disposition",
                format!("attachment; filename={}", self.filename),
            ))
            .sized_body(self.bytes.len(), Cursor::new(self.bytes))
            .ok()
    }
}

impl OpenApiResponderInner for NpyFile {
    fn responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut content = Map::new();
        content.insert("application/octet-stream".to_owned(), MediaType::default());
        let mut responses = Responses::default();
        responses.responses.insert(
            "200".to_owned(),
            RefOr::Object(OpenApiResponse {
                description: "NumPy structured array [('wavelengths','<f8'),('values','<f8')]"
                    .to_owned(),
                content,
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}

/// # Four-channel power snapshot
///
/// Wavelength and unit are read once, then channels 1 to 4, under a single
/// acquisition.
#[openapi(tag = "Detector")]
#[get("/detector/snapshot?<module>")]
pub async fn get_snapshot(
    instrument: Instrument,
    module: Option<u8>,
) -> ApiResult<Json<DetectorSnapshot>> {
    let module = instrument.module(module)?;
    instrument
        .call("Failed to read detector snapshot", move |ctp| ctp.snapshot(module))
        .await
        .map(Json)
}

/// # Power of one channel
#[openapi(tag = "Detector")]
#[get("/detector/power?<module>&<channel>")]
pub async fn get_power(
    instrument: Instrument,
    module: Option<u8>,
    channel: Option<u8>,
) -> ApiResult<Json<PowerReading>> {
    let module = instrument.module(module)?;
    let channel = instrument.channel(channel)?;
    let (power, unit) = instrument
        .call("Failed to read power", move |ctp| {
            let mut detector = ctp.detector(module, channel);
            Ok((detector.power()?, detector.power_unit()?))
        })
        .await?;
    Ok(Json(PowerReading {
        module,
        channel,
        power,
        unit,
    }))
}

/// # Detector configuration
#[openapi(tag = "Detector")]
#[get("/detector/config?<module>&<channel>")]
pub async fn get_detector_config(
    instrument: Instrument,
    module: Option<u8>,
    channel: Option<u8>,
) -> ApiResult<Json<DetectorConfig>> {
    let module = instrument.module(module)?;
    let channel = instrument.channel(channel)?;

    let wavelength_nm = instrument
        .call("Failed to read wavelength", move |ctp| {
            ctp.detector(module, channel).wavelength_nm()
        })
        .await
        .ok();
    let power_unit = instrument
        .call("Failed to read power unit", move |ctp| {
            ctp.detector(module, channel).power_unit()
        })
        .await
        .ok();
    let spectral_unit = instrument
        .call("Failed to read spectral unit", move |ctp| {
            ctp.detector(module, channel).spectral_unit()
        })
        .await
        .ok();
    let resolution_pm = instrument
        .call("Failed to read resolution", |ctp| ctp.resolution_pm())
        .await
        .ok();

    Ok(Json(DetectorConfig {
        module,
        channel,
        wavelength_nm,
        power_unit,
        spectral_unit,
        resolution_pm,
    }))
}

/// # Update the detector configuration
///
/// Every provided field is validated before anything is written.
#[openapi(tag = "Detector")]
#[post("/detector/config?<module>&<channel>", format = "json", data = "<update>")]
pub async fn set_detector_config(
    instrument: Instrument,
    module: Option<u8>,
    channel: Option<u8>,
    update: Json<DetectorConfigUpdate>,
) -> ApiResult<Json<DetectorConfigResponse>> {
    let module = instrument.module(module)?;
    let channel = instrument.channel(channel)?;
    let update = update.into_inner();

    let wavelength_nm = update
        .wavelength_nm
        .map(|nm| in_range("wavelength_nm", nm, 1200.0, 1700.0))
        .transpose()?;
    let power_unit = update
        .power_unit
        .as_deref()
        .map(|unit| unit_choice("power_unit", unit, POWER_UNITS))
        .transpose()?;
    let spectral_unit = update
        .spectral_unit
        .as_deref()
        .map(|unit| unit_choice("spectral_unit", unit, SPECTRAL_UNITS))
        .transpose()?;
    let resolution = update.resolution_pm.map(resolution_pm).transpose()?;

    if let Some(nm) = wavelength_nm {
        instrument
            .call("Failed to set wavelength", move |ctp| {
                ctp.detector(module, channel).set_wavelength_nm(nm)
            })
            .await?;
    }
    if let Some(unit) = power_unit.clone() {
        instrument
            .call("Failed to set power unit", move |ctp| {
                ctp.detector(module, channel).set_power_unit(&unit)
            })
            .await?;
    }
    if let Some(unit) = spectral_unit.clone() {
        instrument
            .call("Failed to set spectral unit", move |ctp| {
                ctp.detector(module, channel).set_spectral_unit(&unit)
            })
            .await?;
    }
    if let Some(pm) = resolution {
        instrument
            .call("Failed to set resolution", move |ctp| ctp.set_resolution_pm(pm))
            .await?;
    }

    Ok(Json(DetectorConfigResponse {
        success: true,
        module,
        channel,
        applied: DetectorConfigUpdate {
            wavelength_nm,
            power_unit,
            spectral_unit,
            resolution_pm: resolution,
        },
    }))
}

/// # Sweep stabilization
#[openapi(tag = "Detector")]
#[get("/detector/stabilization")]
pub async fn get_detector_stabilization(instrument: Instrument) -> ApiResult<Json<Stabilization>> {
    instrument
        .call("Failed to read stabilization", |ctp| ctp.stabilization())
        .await
        .map(Json)
}

/// # Set the sweep stabilization
#[openapi(tag = "Detector")]
#[post("/detector/stabilization", format = "json", data = "<settings>")]
pub async fn set_detector_stabilization(
    instrument: Instrument,
    settings: Json<Stabilization>,
) -> ApiResult<Json<Stabilization>> {
    let Stabilization {
        output,
        duration_seconds,
    } = settings.into_inner();
    let duration_seconds = stabilization_duration(duration_seconds)?;
    instrument
        .call("Failed to set stabilization", move |ctp| {
            ctp.set_stabilization(output, duration_seconds)
        })
        .await?;
    Ok(Json(Stabilization {
        output,
        duration_seconds,
    }))
}

/// # Create a reference trace
#[openapi(tag = "Detector")]
#[post("/detector/reference?<module>&<channel>")]
pub async fn create_reference(
    instrument: Instrument,
    module: Option<u8>,
    channel: Option<u8>,
) -> ApiResult<Json<StatusMessage>> {
    let module = instrument.module(module)?;
    let channel = instrument.channel(channel)?;
    instrument
        .call("Failed to create reference", move |ctp| {
            ctp.detector(module, channel).create_reference()
        })
        .await?;
    Ok(Json(StatusMessage::ok(format!(
        "Reference created for module {} channel {}",
        module, channel
    ))))
}

/// # Trace metadata
#[openapi(tag = "Detector")]
#[get("/detector/trace/metadata?<module>&<channel>&<trace_type>")]
pub async fn get_trace_metadata(
    instrument: Instrument,
    module: Option<u8>,
    channel: Option<u8>,
    trace_type: Option<u8>,
) -> ApiResult<Json<TraceMetadata>> {
    let module = instrument.module(module)?;
    let channel = instrument.channel(channel)?;
    let trace_type = self::trace_type(trace_type)?;
    instrument
        .call("Failed to read trace metadata", move |ctp| {
            ctp.detector(module, channel).trace_metadata(trace_type)
        })
        .await
        .map(Json)
}

/// # Trace as JSON
///
/// Wavelengths are returned in nm. Prefer `/detector/trace/binary` for full
/// resolution traces.
#[openapi(tag = "Detector")]
#[get("/detector/trace/data?<module>&<channel>&<trace_type>")]
pub async fn get_trace_data(
    instrument: Instrument,
    module: Option<u8>,
    channel: Option<u8>,
    trace_type: Option<u8>,
) -> ApiResult<Json<TraceData>> {
    let module = instrument.module(module)?;
    let channel = instrument.channel(channel)?;
    let trace_type = self::trace_type(trace_type)?;
    let raw = instrument
        .call("Failed to read trace", move |ctp| {
            ctp.detector(module, channel).trace(trace_type)
        })
        .await?;
    Ok(Json(TraceData {
        wavelengths_nm: raw.wavelengths_nm(),
        metadata: raw.metadata,
        values: raw.values,
    }))
}

/// # Trace as a NumPy file
///
/// Structured array with `wavelengths` (nm) and `values` (dB) fields.
#[openapi(tag = "Detector")]
#[get("/detector/trace/binary?<module>&<channel>&<trace_type>")]
pub async fn get_trace_binary(
    instrument: Instrument,
    module: Option<u8>,
    channel: Option<u8>,
    trace_type: Option<u8>,
) -> ApiResult<NpyFile> {
    let module = instrument.module(module)?;
    let channel = instrument.channel(channel)?;
    let trace_type = self::trace_type(trace_type)?;
    let raw = instrument
        .call("Failed to read trace", move |ctp| {
            ctp.detector(module, channel).trace(trace_type)
        })
        .await?;
    let wavelengths = raw.wavelengths_nm();
    let bytes = write_structured_f64(&[
        ("wavelengths", wavelengths.as_slice()),
        ("values", raw.values.as_slice()),
    ])
    .map_err(|e| ApiError::internal("Failed to encode trace", e))?;
    Ok(NpyFile {
        bytes,
        filename: format!("trace_m{}_c{}_t{}.npy", module, channel, trace_type),
    })
}

pub fn get_detector_routes() -> (Vec<rocket::Route>, OpenApi) {
    openapi_get_routes_spec![
        get_snapshot,
        get_power,
        get_detector_config,
        set_detector_config,
        get_detector_stabilization,
        set_detector_stabilization,
        create_reference,
        get_trace_metadata,
        get_trace_data,
        get_trace_binary
    ]
}
