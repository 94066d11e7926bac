// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Service information and liveness endpoints. None of them touch the
//! instrument.

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{get, State};
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::{openapi, openapi_get_routes_spec, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::instrument::commands::unix_timestamp;
use crate::instrument::InstrumentSession;
use crate::visualization::streaming::{StreamInfo, StreamRegistry};

pub const SERVICE_NAME: &str = "EXFO CTP10 Vector Analyzer API";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Whether a CTP10 session is open
    pub connected: bool,
    pub timestamp: f64,
    /// Number of open `/ws/power` streams
    pub active_streams: usize,
}

/// # Service information
#[openapi(tag = "System")]
#[get("/")]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

/// # Liveness check
///
/// Always answers, connected or not.
#[openapi(tag = "System")]
#[get("/health")]
pub async fn health(
    session: &State<Arc<InstrumentSession>>,
    registry: &State<StreamRegistry>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        connected: session.is_connected(),
        timestamp: unix_timestamp(),
        active_streams: registry.len(),
    })
}

/// # Open power streams
#[openapi(tag = "System")]
#[get("/streams")]
pub async fn list_streams(registry: &State<StreamRegistry>) -> Json<Vec<StreamInfo>> {
    Json(registry.list())
}

pub fn get_system_routes() -> (Vec<rocket::Route>, OpenApi) {
    openapi_get_routes_spec![root, health, list_streams]
}
