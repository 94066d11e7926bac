// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session lifecycle endpoints under `/connection`.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::{openapi, openapi_get_routes_spec, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::instrument::condition::{self, ConditionBits};
use crate::instrument::{GatewayError, InstrumentSession};

use super::{in_range, ApiError, ApiResult, Instrument, StatusMessage};

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConnectRequest {
    /// VISA-style address, e.g. `TCPIP::192.168.1.37::5025::SOCKET`
    pub address: Option<String>,
    /// I/O timeout, 1000 to 300000 ms
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectResponse {
    pub connected: bool,
    pub instrument_id: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub address: String,
    pub timeout_ms: u64,
    pub driver: String,
    /// `*IDN?` reply, null when disconnected or when the query fails
    pub instrument_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConditionResponse {
    pub register_value: u16,
    pub is_idle: bool,
    pub bits: ConditionBits,
}

/// # Open the CTP10 session
///
/// The body is optional; without one the configured address and timeout
/// are used. Returns the existing session when already connected.
#[openapi(tag = "Connection")]
#[post("/connection/connect", data = "<request>")]
pub async fn connect(
    session: &State<Arc<InstrumentSession>>,
    request: Option<Json<ConnectRequest>>,
) -> ApiResult<Json<ConnectResponse>> {
    let request = request.map(Json::into_inner).unwrap_or_default();
    let timeout = request
        .timeout_ms
        .map(|ms| in_range("timeout_ms", ms, 1000, 300_000))
        .transpose()?
        .map(Duration::from_millis);

    let info = session
        .connect(request.address, timeout)
        .await
        .map_err(|e| match e {
            GatewayError::ConnectionFailed(reason) => {
                ApiError::internal("Failed to connect to CTP10", reason)
            }
            other => ApiError::from_gateway("Failed to connect to CTP10", other),
        })?;

    Ok(Json(ConnectResponse {
        connected: true,
        instrument_id: info.instrument_id,
        address: info.address,
    }))
}

/// # Close the CTP10 session
///
/// Safe to call when already disconnected.
#[openapi(tag = "Connection")]
#[post("/connection/disconnect")]
pub async fn disconnect(session: &State<Arc<InstrumentSession>>) -> ApiResult<Json<StatusMessage>> {
    let closed = session
        .disconnect()
        .await
        .map_err(|e| ApiError::from_gateway("Failed to disconnect", e))?;
    debug!("Disconnect request, link closed: {}", closed);
    Ok(Json(StatusMessage::ok("Disconnected successfully")))
}

/// # Session status
#[openapi(tag = "Connection")]
#[get("/connection/status")]
pub async fn status(session: &State<Arc<InstrumentSession>>) -> Json<ConnectionStatus> {
    let connected = session.is_connected();
    let instrument_id = if connected {
        session.identify().await.ok()
    } else {
        None
    };
    let settings = session.settings();
    Json(ConnectionStatus {
        connected,
        address: settings.address,
        timeout_ms: settings.timeout.as_millis() as u64,
        driver: session.driver_name().to_string(),
        instrument_id,
    })
}

/// # Operation condition register
#[openapi(tag = "Connection")]
#[get("/connection/condition")]
pub async fn get_condition(instrument: Instrument) -> ApiResult<Json<ConditionResponse>> {
    let register = instrument
        .call("Failed to read condition register", |ctp| ctp.condition_register())
        .await?;
    Ok(Json(ConditionResponse {
        register_value: register,
        is_idle: condition::is_idle(register),
        bits: ConditionBits::from(register),
    }))
}

/// # Drain the instrument error queue
///
/// Fails with the collected messages when the queue was not empty.
#[openapi(tag = "Connection")]
#[post("/connection/check_errors")]
pub async fn check_errors(instrument: Instrument) -> ApiResult<Json<StatusMessage>> {
    instrument
        .call("Instrument reported errors", |ctp| ctp.check_errors())
        .await?;
    Ok(Json(StatusMessage::ok("No errors found")))
}

pub fn get_connection_routes() -> (Vec<rocket::Route>, OpenApi) {
    openapi_get_routes_spec![
        connect,
        disconnect,
        status,
        get_condition,
        check_errors
    ]
}
