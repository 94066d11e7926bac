// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Global sweep endpoints under `/measurement`.

use log::info;
use rocket::serde::json::Json;
use rocket::{get, post};
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::{openapi, openapi_get_routes_spec, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::instrument::condition::{self, ConditionBits};
use crate::instrument::Stabilization;

use super::detector::{resolution_pm as check_resolution, stabilization_duration};
use super::{in_range, ApiError, ApiResult, Instrument, StatusMessage};

pub const SWEEP_RANGE_NM: (f64, f64) = (1200.0, 1700.0);

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub resolution_pm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MeasurementConfig {
    pub resolution_pm: f64,
    pub stabilization_output: bool,
    pub stabilization_duration: f64,
    pub start_wavelength_nm: f64,
    pub stop_wavelength_nm: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MeasurementConfigUpdate {
    pub stabilization_output: Option<bool>,
    /// 0 to 60 s
    pub stabilization_duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SweepStartResponse {
    pub success: bool,
    pub message: String,
    /// True when the call waited for the end of the sweep
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SweepStatus {
    pub is_sweeping: bool,
    pub is_idle: bool,
    pub register_value: u16,
    pub bits: ConditionBits,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct SweepWavelength {
    /// 1200 to 1700 nm
    pub start_nm: f64,
    /// 1200 to 1700 nm, above `start_nm`
    pub stop_nm: f64,
}

/// # Sampling resolution
#[openapi(tag = "Measurement")]
#[get("/measurement/resolution")]
pub async fn get_resolution(instrument: Instrument) -> ApiResult<Json<Resolution>> {
    let resolution_pm = instrument
        .call("Failed to read resolution", |ctp| ctp.resolution_pm())
        .await?;
    Ok(Json(Resolution { resolution_pm }))
}

/// # Set the sampling resolution
#[openapi(tag = "Measurement")]
#[post("/measurement/resolution?<resolution_pm>")]
pub async fn set_resolution(
    instrument: Instrument,
    resolution_pm: f64,
) -> ApiResult<Json<Resolution>> {
    let resolution_pm = check_resolution(resolution_pm)?;
    instrument
        .call("Failed to set resolution", move |ctp| {
            ctp.set_resolution_pm(resolution_pm)
        })
        .await?;
    Ok(Json(Resolution { resolution_pm }))
}

/// # Sweep stabilization
#[openapi(tag = "Measurement")]
#[get("/measurement/stabilization")]
pub async fn get_measurement_stabilization(instrument: Instrument) -> ApiResult<Json<Stabilization>> {
    instrument
        .call("Failed to read stabilization", |ctp| ctp.stabilization())
        .await
        .map(Json)
}

/// # Set the sweep stabilization
#[openapi(tag = "Measurement")]
#[post("/measurement/stabilization?<output>&<duration_seconds>")]
pub async fn set_measurement_stabilization(
    instrument: Instrument,
    output: bool,
    duration_seconds: f64,
) -> ApiResult<Json<Stabilization>> {
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

/// # Measurement configuration
#[openapi(tag = "Measurement")]
#[get("/measurement/config")]
pub async fn get_measurement_config(instrument: Instrument) -> ApiResult<Json<MeasurementConfig>> {
    let context = "Failed to read measurement config";
    let resolution_pm = instrument
        .call(context, |ctp| ctp.resolution_pm())
        .await?;
    let stabilization = instrument
        .call(context, |ctp| ctp.stabilization())
        .await?;
    let (start_wavelength_nm, stop_wavelength_nm) = instrument
        .call(context, |ctp| ctp.sweep_wavelengths())
        .await?;
    Ok(Json(MeasurementConfig {
        resolution_pm,
        stabilization_output: stabilization.output,
        stabilization_duration: stabilization.duration_seconds,
        start_wavelength_nm,
        stop_wavelength_nm,
    }))
}

/// # Update the measurement configuration
///
/// A missing stabilization field keeps its current value.
#[openapi(tag = "Measurement")]
#[post("/measurement/config", format = "json", data = "<update>")]
pub async fn set_measurement_config(
    instrument: Instrument,
    update: Json<MeasurementConfigUpdate>,
) -> ApiResult<Json<Stabilization>> {
    let update = update.into_inner();
    let duration = update
        .stabilization_duration
        .map(stabilization_duration)
        .transpose()?;

    let current = instrument
        .call("Failed to read stabilization", |ctp| ctp.stabilization())
        .await?;
    let target = Stabilization {
        output: update.stabilization_output.unwrap_or(current.output),
        duration_seconds: duration.unwrap_or(current.duration_seconds),
    };
    if target != current {
        instrument
            .call("Failed to set stabilization", move |ctp| {
                ctp.set_stabilization(target.output, target.duration_seconds)
            })
            .await?;
    }
    Ok(Json(target))
}

/// # Start a sweep
///
/// With `wait=true` the call returns once the scanning bit clears, bounded by
/// the session timeout. The condition register is polled with one
/// acquisition per poll.
#[openapi(tag = "Measurement")]
#[post("/measurement/sweep/start?<wait>")]
pub async fn start_sweep(
    instrument: Instrument,
    wait: Option<bool>,
) -> ApiResult<Json<SweepStartResponse>> {
    instrument
        .call("Failed to start sweep", |ctp| ctp.initiate_sweep())
        .await?;
    info!("Sweep started");

    if !wait.unwrap_or(false) {
        return Ok(Json(SweepStartResponse {
            success: true,
            message: "Sweep started".to_string(),
            completed: false,
        }));
    }

    instrument
        .wait_for_sweep(instrument.timeout())
        .await
        .map_err(|e| ApiError::from_gateway("Sweep did not complete", e))?;
    info!("Sweep completed");
    Ok(Json(SweepStartResponse {
        success: true,
        message: "Sweep completed".to_string(),
        completed: true,
    }))
}

/// # Abort the running sweep
#[openapi(tag = "Measurement")]
#[post("/measurement/sweep/abort")]
pub async fn abort_sweep(instrument: Instrument) -> ApiResult<Json<StatusMessage>> {
    instrument
        .call("Failed to abort sweep", |ctp| ctp.abort())
        .await?;
    Ok(Json(StatusMessage::ok("Sweep aborted")))
}

/// # Sweep status
#[openapi(tag = "Measurement")]
#[get("/measurement/sweep/status")]
pub async fn sweep_status(instrument: Instrument) -> ApiResult<Json<SweepStatus>> {
    let register = instrument
        .call("Failed to read sweep status", |ctp| ctp.condition_register())
        .await?;
    Ok(Json(SweepStatus {
        is_sweeping: condition::is_sweeping(register),
        is_idle: condition::is_idle(register),
        register_value: register,
        bits: ConditionBits::from(register),
    }))
}

/// # Global sweep wavelength range
#[openapi(tag = "Measurement")]
#[get("/measurement/sweep/wavelength")]
pub async fn get_sweep_wavelength(instrument: Instrument) -> ApiResult<Json<SweepWavelength>> {
    let (start_nm, stop_nm) = instrument
        .call("Failed to read sweep wavelengths", |ctp| ctp.sweep_wavelengths())
        .await?;
    Ok(Json(SweepWavelength { start_nm, stop_nm }))
}

/// # Set the global sweep wavelength range
#[openapi(tag = "Measurement")]
#[post("/measurement/sweep/wavelength", format = "json", data = "<range>")]
pub async fn set_sweep_wavelength(
    instrument: Instrument,
    range: Json<SweepWavelength>,
) -> ApiResult<Json<SweepWavelength>> {
    let range = range.into_inner();
    let start_nm = in_range("start_nm", range.start_nm, SWEEP_RANGE_NM.0, SWEEP_RANGE_NM.1)?;
    let stop_nm = in_range("stop_nm", range.stop_nm, SWEEP_RANGE_NM.0, SWEEP_RANGE_NM.1)?;
    if start_nm >= stop_nm {
        return Err(ApiError::validation("start_nm must be below stop_nm"));
    }
    instrument
        .call("Failed to set sweep wavelengths", move |ctp| {
            ctp.set_sweep_wavelengths(start_nm, stop_nm)
        })
        .await?;
    Ok(Json(SweepWavelength { start_nm, stop_nm }))
}

pub fn get_measurement_routes() -> (Vec<rocket::Route>, OpenApi) {
    openapi_get_routes_spec![
        get_resolution,
        set_resolution,
        get_measurement_stabilization,
        set_measurement_stabilization,
        get_measurement_config,
        set_measurement_config,
        start_sweep,
        abort_sweep,
        sweep_status,
        get_sweep_wavelength,
        set_sweep_wavelength
    ]
}
