// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! REST API
//!
//! Every group of endpoints lives in its own module and exposes a
//! `get_xxx_routes()` function returning the Rocket routes together with
//! their OpenAPI fragment; the server builder merges the fragments into
//! `/openapi.json`.
//!
//! Errors are reported as `{"detail": "..."}` through [`ApiError`]:
//!
//! | Status | When |
//! |--------|------|
//! | 400 | explicit business checks (stabilization duration, trigger input) |
//! | 422 | out-of-range or malformed parameters |
//! | 500 | instrument or driver failure, `"<context>: <error>"` |
//! | 503 | no live session |

pub mod connection;
pub mod detector;
pub mod measurement;
pub mod rlaser;
pub mod system;
pub mod tls;

use std::fmt::Display;
use std::io::Cursor;
use std::ops::Deref;
use std::sync::Arc;

use log::warn;
use rocket::http::{ContentType, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::response::{self, Responder};
use rocket::{Request, Response, State};
use rocket_okapi::gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{MediaType, RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::Map;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::instrument::{Ctp10, GatewayError, InstrumentResult, InstrumentSession};

pub use connection::get_connection_routes;
pub use detector::get_detector_routes;
pub use measurement::get_measurement_routes;
pub use rlaser::get_rlaser_routes;
pub use system::get_system_routes;
pub use tls::get_tls_routes;

pub const NOT_CONNECTED_DETAIL: &str = "Not connected to CTP10. Use POST /connection/connect first.";

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Body of write endpoints that only report success.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusMessage {
    pub success: bool,
    pub message: String,
}

impl StatusMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// HTTP error carrying a `detail` message.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: Status,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: Status, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn not_connected() -> Self {
        Self::new(Status::ServiceUnavailable, NOT_CONNECTED_DETAIL)
    }

    /// 422, rejected before any instrument traffic.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(Status::UnprocessableEntity, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, detail)
    }

    pub fn internal(context: &str, err: impl Display) -> Self {
        Self::new(Status::InternalServerError, format!("{}: {}", context, err))
    }

    /// Map a session error, `context` describes the failed operation.
    pub fn from_gateway(context: &str, err: GatewayError) -> Self {
        match err {
            GatewayError::NotConnected => Self::not_connected(),
            GatewayError::Validation(detail) => Self::validation(detail),
            other => {
                warn!("{}: {}", context, other);
                Self::internal(context, other)
            }
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'o> {
        let body = serde_json::json!({ "detail": self.detail }).to_string();
        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let schema = gen.json_schema::<ErrorDetail>();
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Rejected by a business rule"),
            ("422", "Invalid or out-of-range parameter"),
            ("500", "Instrument or driver failure"),
            ("503", "No live CTP10 session"),
        ] {
            let mut content = Map::new();
            content.insert(
                "application/json".to_owned(),
                MediaType {
                    schema: Some(schema.clone()),
                    ..Default::default()
                },
            );
            responses.responses.insert(
                code.to_owned(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_owned(),
                    content,
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Check an inclusive range, naming the parameter in the error.
pub fn in_range<T>(name: &str, value: T, min: T, max: T) -> ApiResult<T>
where
    T: PartialOrd + Display + Copy,
{
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(ApiError::validation(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        )))
    }
}

pub const MODULE_RANGE: (u8, u8) = (1, 20);
pub const CHANNEL_RANGE: (u8, u8) = (1, 6);

/// Connected session plus the configured defaults.
///
/// Fails the request with 503 when the session is down, before the handler
/// runs.
pub struct Instrument {
    session: Arc<InstrumentSession>,
    config: Arc<Config>,
}

impl Instrument {
    /// Run `op` under one acquisition, mapping failures with `context`.
    pub async fn call<F, T>(&self, context: &str, op: F) -> ApiResult<T>
    where
        F: FnOnce(&mut Ctp10<'_>) -> InstrumentResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.session
            .execute(op)
            .await
            .map_err(|e| ApiError::from_gateway(context, e))
    }

    /// Detector module from the query, or the configured default.
    pub fn module(&self, module: Option<u8>) -> ApiResult<u8> {
        let module = module.unwrap_or(self.config.instrument.default_module);
        in_range("module", module, MODULE_RANGE.0, MODULE_RANGE.1)
    }

    /// Detector channel from the query, or the configured default.
    pub fn channel(&self, channel: Option<u8>) -> ApiResult<u8> {
        let channel = channel.unwrap_or(self.config.instrument.default_channel);
        in_range("channel", channel, CHANNEL_RANGE.0, CHANNEL_RANGE.1)
    }
}

impl Deref for Instrument {
    type Target = InstrumentSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Instrument {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = match request.guard::<&State<Arc<InstrumentSession>>>().await {
            Outcome::Success(session) => Arc::clone(session.inner()),
            Outcome::Error((status, _)) => return Outcome::Error((status, "Missing instrument session")),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };
        let config = match request.guard::<&State<Arc<Config>>>().await {
            Outcome::Success(config) => Arc::clone(config.inner()),
            Outcome::Error((status, _)) => return Outcome::Error((status, "Missing configuration")),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };
        if !session.is_connected() {
            return Outcome::Error((Status::ServiceUnavailable, NOT_CONNECTED_DETAIL));
        }
        Outcome::Success(Instrument { session, config })
    }
}

impl<'r> OpenApiFromRequest<'r> for Instrument {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
