// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tunable laser source endpoints under `/tls/<channel>`, channels 1 to 4.

use rocket::serde::json::Json;
use rocket::{get, post};
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::{openapi, openapi_get_routes_spec, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::instrument::TlsSettings;

use super::{in_range, ApiError, ApiResult, Instrument};

pub const CHANNEL_RANGE: (u8, u8) = (1, 4);
pub const WAVELENGTH_RANGE_NM: (f64, f64) = (1260.0, 1640.0);
pub const SPEED_RANGE_NMPS: (f64, f64) = (5.0, 200.0);
pub const POWER_RANGE_DBM: (f64, f64) = (-10.0, 10.0);
pub const TRIGGER_MAX: u8 = 8;
pub const IDENTIFIER_RANGE: (u8, u8) = (1, 2);

/// Partial TLS update. Only the provided fields are written and echoed back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TlsConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_wavelength_nm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_wavelength_nm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_speed_nmps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laser_power_dbm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigin: Option<u8>,
    /// 1 selects the C-band laser, 2 the O-band laser. Resets the other
    /// settings to that laser's preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<u8>,
}

impl TlsConfigUpdate {
    fn validate(&self) -> ApiResult<()> {
        let (lo, hi) = WAVELENGTH_RANGE_NM;
        if let Some(nm) = self.start_wavelength_nm {
            in_range("start_wavelength_nm", nm, lo, hi)?;
        }
        if let Some(nm) = self.stop_wavelength_nm {
            in_range("stop_wavelength_nm", nm, lo, hi)?;
        }
        if let (Some(start), Some(stop)) = (self.start_wavelength_nm, self.stop_wavelength_nm) {
            if start >= stop {
                return Err(ApiError::validation(
                    "start_wavelength_nm must be below stop_wavelength_nm",
                ));
            }
        }
        if let Some(speed) = self.sweep_speed_nmps {
            in_range("sweep_speed_nmps", speed, SPEED_RANGE_NMPS.0, SPEED_RANGE_NMPS.1)?;
        }
        if let Some(power) = self.laser_power_dbm {
            in_range("laser_power_dbm", power, POWER_RANGE_DBM.0, POWER_RANGE_DBM.1)?;
        }
        if let Some(trigin) = self.trigin {
            in_range("trigin", trigin, 0, TRIGGER_MAX)?;
        }
        if let Some(identifier) = self.identifier {
            in_range("identifier", identifier, IDENTIFIER_RANGE.0, IDENTIFIER_RANGE.1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TlsConfigResponse {
    pub success: bool,
    pub channel: u8,
    pub updated: TlsConfigUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TlsWavelength {
    pub channel: u8,
    pub start_nm: f64,
    pub stop_nm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TlsPower {
    pub channel: u8,
    pub power_dbm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TlsSpeed {
    pub channel: u8,
    pub speed_nmps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TlsTrigger {
    pub channel: u8,
    pub trigin: u8,
    pub description: String,
}

fn tls_channel(channel: u8) -> ApiResult<u8> {
    in_range("channel", channel, CHANNEL_RANGE.0, CHANNEL_RANGE.1)
}

pub fn trigger_description(trigin: u8) -> String {
    match trigin {
        0 => "Software trigger".to_string(),
        n => format!("TRIG IN port {}", n),
    }
}

/// # TLS configuration
///
/// All six settings are read under one acquisition.
#[openapi(tag = "TLS")]
#[get("/tls/<channel>/config")]
pub async fn get_tls_config(instrument: Instrument, channel: u8) -> ApiResult<Json<TlsSettings>> {
    let ch = tls_channel(channel)?;
    instrument
        .call("Failed to read TLS config", move |ctp| ctp.tls(ch).settings())
        .await
        .map(Json)
}

/// # Update the TLS configuration
///
/// The laser identifier is written first since it resets the other settings.
#[openapi(tag = "TLS")]
#[post("/tls/<channel>/config", format = "json", data = "<update>")]
pub async fn set_tls_config(
    instrument: Instrument,
    channel: u8,
    update: Json<TlsConfigUpdate>,
) -> ApiResult<Json<TlsConfigResponse>> {
    let ch = tls_channel(channel)?;
    let update = update.into_inner();
    update.validate()?;
    let context = "Failed to update TLS config";

    if let Some(identifier) = update.identifier {
        instrument
            .call(context, move |ctp| ctp.tls(ch).set_identifier(identifier))
            .await?;
    }
    if let Some(nm) = update.start_wavelength_nm {
        instrument
            .call(context, move |ctp| ctp.tls(ch).set_start_wavelength_nm(nm))
            .await?;
    }
    if let Some(nm) = update.stop_wavelength_nm {
        instrument
            .call(context, move |ctp| ctp.tls(ch).set_stop_wavelength_nm(nm))
            .await?;
    }
    if let Some(speed) = update.sweep_speed_nmps {
        instrument
            .call(context, move |ctp| ctp.tls(ch).set_sweep_speed_nmps(speed))
            .await?;
    }
    if let Some(power) = update.laser_power_dbm {
        instrument
            .call(context, move |ctp| ctp.tls(ch).set_power_dbm(power))
            .await?;
    }
    if let Some(trigin) = update.trigin {
        instrument
            .call(context, move |ctp| ctp.tls(ch).set_trigin(trigin))
            .await?;
    }

    Ok(Json(TlsConfigResponse {
        success: true,
        channel: ch,
        updated: update,
    }))
}

/// # TLS sweep wavelength range
#[openapi(tag = "TLS")]
#[get("/tls/<channel>/wavelength")]
pub async fn get_tls_wavelength(instrument: Instrument, channel: u8) -> ApiResult<Json<TlsWavelength>> {
    let ch = tls_channel(channel)?;
    let context = "Failed to read TLS wavelength";
    let start_nm = instrument
        .call(context, move |ctp| ctp.tls(ch).start_wavelength_nm())
        .await?;
    let stop_nm = instrument
        .call(context, move |ctp| ctp.tls(ch).stop_wavelength_nm())
        .await?;
    Ok(Json(TlsWavelength {
        channel: ch,
        start_nm,
        stop_nm,
    }))
}

/// # Set the TLS sweep wavelength range
#[openapi(tag = "TLS")]
#[post("/tls/<channel>/wavelength?<start_nm>&<stop_nm>")]
pub async fn set_tls_wavelength(
    instrument: Instrument,
    channel: u8,
    start_nm: f64,
    stop_nm: f64,
) -> ApiResult<Json<TlsWavelength>> {
    let ch = tls_channel(channel)?;
    TlsConfigUpdate {
        start_wavelength_nm: Some(start_nm),
        stop_wavelength_nm: Some(stop_nm),
        ..Default::default()
    }
    .validate()?;
    let context = "Failed to set TLS wavelength";
    instrument
        .call(context, move |ctp| ctp.tls(ch).set_start_wavelength_nm(start_nm))
        .await?;
    instrument
        .call(context, move |ctp| ctp.tls(ch).set_stop_wavelength_nm(stop_nm))
        .await?;
    Ok(Json(TlsWavelength {
        channel: ch,
        start_nm,
        stop_nm,
    }))
}

/// # TLS output power
#[openapi(tag = "TLS")]
#[get("/tls/<channel>/power")]
pub async fn get_tls_power(instrument: Instrument, channel: u8) -> ApiResult<Json<TlsPower>> {
    let ch = tls_channel(channel)?;
    let power_dbm = instrument
        .call("Failed to read TLS power", move |ctp| ctp.tls(ch).power_dbm())
        .await?;
    Ok(Json(TlsPower {
        channel: ch,
        power_dbm,
    }))
}

/// # Set the TLS output power
#[openapi(tag = "TLS")]
#[post("/tls/<channel>/power?<power_dbm>")]
pub async fn set_tls_power(
    instrument: Instrument,
    channel: u8,
    power_dbm: f64,
) -> ApiResult<Json<TlsPower>> {
    let ch = tls_channel(channel)?;
    in_range("power_dbm", power_dbm, POWER_RANGE_DBM.0, POWER_RANGE_DBM.1)?;
    instrument
        .call("Failed to set TLS power", move |ctp| ctp.tls(ch).set_power_dbm(power_dbm))
        .await?;
    Ok(Json(TlsPower {
        channel: ch,
        power_dbm,
    }))
}

/// # TLS sweep speed
#[openapi(tag = "TLS")]
#[get("/tls/<channel>/speed")]
pub async fn get_tls_speed(instrument: Instrument, channel: u8) -> ApiResult<Json<TlsSpeed>> {
    let ch = tls_channel(channel)?;
    let speed_nmps = instrument
        .call("Failed to read TLS speed", move |ctp| ctp.tls(ch).sweep_speed_nmps())
        .await?;
    Ok(Json(TlsSpeed {
        channel: ch,
        speed_nmps,
    }))
}

/// # Set the TLS sweep speed
#[openapi(tag = "TLS")]
#[post("/tls/<channel>/speed?<speed_nmps>")]
pub async fn set_tls_speed(
    instrument: Instrument,
    channel: u8,
    speed_nmps: f64,
) -> ApiResult<Json<TlsSpeed>> {
    let ch = tls_channel(channel)?;
    in_range("speed_nmps", speed_nmps, SPEED_RANGE_NMPS.0, SPEED_RANGE_NMPS.1)?;
    instrument
        .call("Failed to set TLS speed", move |ctp| {
            ctp.tls(ch).set_sweep_speed_nmps(speed_nmps)
        })
        .await?;
    Ok(Json(TlsSpeed {
        channel: ch,
        speed_nmps,
    }))
}

/// # TLS trigger input
#[openapi(tag = "TLS")]
#[get("/tls/<channel>/trigger")]
pub async fn get_tls_trigger(instrument: Instrument, channel: u8) -> ApiResult<Json<TlsTrigger>> {
    let ch = tls_channel(channel)?;
    let trigin = instrument
        .call("Failed to read TLS trigger", move |ctp| ctp.tls(ch).trigin())
        .await?;
    Ok(Json(TlsTrigger {
        channel: ch,
        trigin,
        description: trigger_description(trigin),
    }))
}

/// # Set the TLS trigger input
///
/// 0 is the software trigger, 1 to 8 select a TRIG IN port.
#[openapi(tag = "TLS")]
#[post("/tls/<channel>/trigger?<trigin>")]
pub async fn set_tls_trigger(
    instrument: Instrument,
    channel: u8,
    trigin: u8,
) -> ApiResult<Json<TlsTrigger>> {
    let ch = tls_channel(channel)?;
    if trigin > TRIGGER_MAX {
        return Err(ApiError::bad_request("Trigger must be 0-8"));
    }
    instrument
        .call("Failed to set TLS trigger", move |ctp| ctp.tls(ch).set_trigin(trigin))
        .await?;
    Ok(Json(TlsTrigger {
        channel: ch,
        trigin,
        description: trigger_description(trigin),
    }))
}

pub fn get_tls_routes() -> (Vec<rocket::Route>, OpenApi) {
    openapi_get_routes_spec![
        get_tls_config,
        set_tls_config,
        get_tls_wavelength,
        set_tls_wavelength,
        get_tls_power,
        set_tls_power,
        get_tls_speed,
        set_tls_speed,
        get_tls_trigger,
        set_tls_trigger
    ]
}
