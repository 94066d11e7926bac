// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Reference laser endpoints under `/rlaser/<laser_number>`, lasers 1 to 10.
//!
//! Power and wavelength limits depend on the laser model, so values are only
//! checked for being finite and the instrument has the last word.

use log::info;
use rocket::serde::json::Json;
use rocket::{get, post};
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::{openapi, openapi_get_routes_spec, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::instrument::readings::Identity;
use crate::instrument::RLaserReading;

use super::{in_range, ApiError, ApiResult, Instrument};

pub const LASER_RANGE: (u8, u8) = (1, 10);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RLaserConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_dbm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wavelength_nm: Option<f64>,
    /// `true` switches the output on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RLaserConfigResponse {
    pub success: bool,
    pub message: String,
    pub config: RLaserConfigUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RLaserId {
    pub laser_number: u8,
    pub id: String,
    #[serde(flatten)]
    pub identity: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RLaserPower {
    pub laser_number: u8,
    pub power_dbm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RLaserWavelength {
    pub laser_number: u8,
    pub wavelength_nm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RLaserState {
    pub laser_number: u8,
    pub is_on: bool,
    /// `ON` or `OFF`
    pub state: String,
}

impl RLaserState {
    fn new(laser_number: u8, is_on: bool) -> Self {
        Self {
            laser_number,
            is_on,
            state: if is_on { "ON" } else { "OFF" }.to_string(),
        }
    }
}

fn laser(laser_number: u8) -> ApiResult<u8> {
    in_range("laser_number", laser_number, LASER_RANGE.0, LASER_RANGE.1)
}

fn finite(name: &str, value: f64) -> ApiResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ApiError::validation(format!("{} must be a finite number", name)))
    }
}

/// # Reference laser configuration
#[openapi(tag = "RLaser")]
#[get("/rlaser/<laser_number>/config")]
pub async fn get_rlaser_config(
    instrument: Instrument,
    laser_number: u8,
) -> ApiResult<Json<RLaserReading>> {
    let n = laser(laser_number)?;
    instrument
        .call("Failed to get laser config", move |ctp| ctp.rlaser(n).reading())
        .await
        .map(Json)
}

/// # Update the reference laser configuration
///
/// Only the provided fields are written, power first, then wavelength, then
/// the output state.
#[openapi(tag = "RLaser")]
#[post("/rlaser/<laser_number>/config", format = "json", data = "<update>")]
pub async fn set_rlaser_config(
    instrument: Instrument,
    laser_number: u8,
    update: Json<RLaserConfigUpdate>,
) -> ApiResult<Json<RLaserConfigResponse>> {
    let n = laser(laser_number)?;
    let update = update.into_inner();
    if let Some(power) = update.power_dbm {
        finite("power_dbm", power)?;
    }
    if let Some(nm) = update.wavelength_nm {
        finite("wavelength_nm", nm)?;
    }

    let apply = update.clone();
    instrument
        .call("Failed to configure laser", move |ctp| {
            let mut rlaser = ctp.rlaser(n);
            if let Some(power) = apply.power_dbm {
                rlaser.set_power_dbm(power)?;
            }
            if let Some(nm) = apply.wavelength_nm {
                rlaser.set_wavelength_nm(nm)?;
            }
            if let Some(on) = apply.power_state {
                rlaser.set_on(on)?;
            }
            Ok(())
        })
        .await?;

    Ok(Json(RLaserConfigResponse {
        success: true,
        message: format!("Reference laser {} configured successfully", n),
        config: update,
    }))
}

/// # Reference laser identification
#[openapi(tag = "RLaser")]
#[get("/rlaser/<laser_number>/id")]
pub async fn get_rlaser_id(instrument: Instrument, laser_number: u8) -> ApiResult<Json<RLaserId>> {
    let n = laser(laser_number)?;
    let id = instrument
        .call("Failed to get laser ID", move |ctp| ctp.rlaser(n).identity())
        .await?;
    Ok(Json(RLaserId {
        laser_number: n,
        identity: Identity::parse(&id),
        id,
    }))
}

/// # Reference laser power
#[openapi(tag = "RLaser")]
#[get("/rlaser/<laser_number>/power")]
pub async fn get_rlaser_power(
    instrument: Instrument,
    laser_number: u8,
) -> ApiResult<Json<RLaserPower>> {
    let n = laser(laser_number)?;
    let power_dbm = instrument
        .call("Failed to get power", move |ctp| ctp.rlaser(n).power_dbm())
        .await?;
    Ok(Json(RLaserPower {
        laser_number: n,
        power_dbm,
    }))
}

/// # Set the reference laser power
#[openapi(tag = "RLaser")]
#[post("/rlaser/<laser_number>/power?<power_dbm>")]
pub async fn set_rlaser_power(
    instrument: Instrument,
    laser_number: u8,
    power_dbm: f64,
) -> ApiResult<Json<RLaserPower>> {
    let n = laser(laser_number)?;
    let power_dbm = finite("power_dbm", power_dbm)?;
    instrument
        .call("Failed to set power", move |ctp| ctp.rlaser(n).set_power_dbm(power_dbm))
        .await?;
    Ok(Json(RLaserPower {
        laser_number: n,
        power_dbm,
    }))
}

/// # Reference laser wavelength
#[openapi(tag = "RLaser")]
#[get("/rlaser/<laser_number>/wavelength")]
pub async fn get_rlaser_wavelength(
    instrument: Instrument,
    laser_number: u8,
) -> ApiResult<Json<RLaserWavelength>> {
    let n = laser(laser_number)?;
    let wavelength_nm = instrument
        .call("Failed to get wavelength", move |ctp| ctp.rlaser(n).wavelength_nm())
        .await?;
    Ok(Json(RLaserWavelength {
        laser_number: n,
        wavelength_nm,
    }))
}

/// # Set the reference laser wavelength
#[openapi(tag = "RLaser")]
#[post("/rlaser/<laser_number>/wavelength?<wavelength_nm>")]
pub async fn set_rlaser_wavelength(
    instrument: Instrument,
    laser_number: u8,
    wavelength_nm: f64,
) -> ApiResult<Json<RLaserWavelength>> {
    let n = laser(laser_number)?;
    let wavelength_nm = finite("wavelength_nm", wavelength_nm)?;
    instrument
        .call("Failed to set wavelength", move |ctp| {
            ctp.rlaser(n).set_wavelength_nm(wavelength_nm)
        })
        .await?;
    Ok(Json(RLaserWavelength {
        laser_number: n,
        wavelength_nm,
    }))
}

/// # Reference laser output state
#[openapi(tag = "RLaser")]
#[get("/rlaser/<laser_number>/state")]
pub async fn get_rlaser_state(
    instrument: Instrument,
    laser_number: u8,
) -> ApiResult<Json<RLaserState>> {
    let n = laser(laser_number)?;
    let is_on = instrument
        .call("Failed to get laser state", move |ctp| ctp.rlaser(n).is_on())
        .await?;
    Ok(Json(RLaserState::new(n, is_on)))
}

async fn switch(instrument: &Instrument, n: u8, on: bool) -> ApiResult<Json<RLaserState>> {
    let context = if on {
        "Failed to turn on laser"
    } else {
        "Failed to turn off laser"
    };
    instrument
        .call(context, move |ctp| ctp.rlaser(n).set_on(on))
        .await?;
    info!("Reference laser {} turned {}", n, if on { "ON" } else { "OFF" });
    Ok(Json(RLaserState::new(n, on)))
}

/// # Turn the reference laser on
#[openapi(tag = "RLaser")]
#[post("/rlaser/<laser_number>/on")]
pub async fn turn_on_rlaser(
    instrument: Instrument,
    laser_number: u8,
) -> ApiResult<Json<RLaserState>> {
    let n = laser(laser_number)?;
    switch(&instrument, n, true).await
}

/// # Turn the reference laser off
#[openapi(tag = "RLaser")]
#[post("/rlaser/<laser_number>/off")]
pub async fn turn_off_rlaser(
    instrument: Instrument,
    laser_number: u8,
) -> ApiResult<Json<RLaserState>> {
    let n = laser(laser_number)?;
    switch(&instrument, n, false).await
}

pub fn get_rlaser_routes() -> (Vec<rocket::Route>, OpenApi) {
    openapi_get_routes_spec![
        get_rlaser_config,
        set_rlaser_config,
        get_rlaser_id,
        get_rlaser_power,
        set_rlaser_power,
        get_rlaser_wavelength,
        set_rlaser_wavelength,
        get_rlaser_state,
        turn_on_rlaser,
        turn_off_rlaser
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_response_flattens_identity() {
        let id = "EXFO,T100S-HP,0,6.07".to_string();
        let response = RLaserId {
            laser_number: 1,
            identity: Identity::parse(&id),
            id,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["manufacturer"], "EXFO");
        assert_eq!(value["model"], "T100S-HP");
        assert_eq!(value["serial"], "0");
        assert_eq!(value["firmware"], "6.07");
        assert_eq!(value["id"], "EXFO,T100S-HP,0,6.07");
    }

    #[test]
    fn test_state_label() {
        assert_eq!(RLaserState::new(2, true).state, "ON");
        assert_eq!(RLaserState::new(2, false).state, "OFF");
    }

    #[test]
    fn test_laser_number_range() {
        assert!(laser(1).is_ok());
        assert!(laser(10).is_ok());
        assert!(laser(0).is_err());
        assert!(laser(11).is_err());
    }
}
