// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! CORS preflight route and JSON error catchers.
//!
//! Catchers only run when Rocket itself fails a request (no route, a guard
//! error, an unparseable body). Handler errors already carry their own
//! `{"detail": ...}` body through `ApiError`.

use std::path::PathBuf;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{catch, catchers, options, Catcher, Request};
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::{openapi, openapi_get_routes_spec};

use crate::visualization::api::{ErrorDetail, NOT_CONNECTED_DETAIL};

/// # CORS preflight
///
/// Answers every OPTIONS request with 200, the CORS fairing adds the headers.
#[openapi(tag = "Cors")]
#[options("/<_path..>")]
pub async fn options(_path: PathBuf) -> Result<(), std::io::Error> {
    Ok(())
}

pub fn get_cors_routes() -> (Vec<rocket::Route>, OpenApi) {
    openapi_get_routes_spec![options]
}

fn detail(message: impl Into<String>) -> Json<ErrorDetail> {
    Json(ErrorDetail {
        detail: message.into(),
    })
}

#[catch(400)]
pub fn bad_request(_request: &Request) -> Json<ErrorDetail> {
    detail("Bad request")
}

#[catch(404)]
pub fn not_found(request: &Request) -> Json<ErrorDetail> {
    detail(format!("Not found: {}", request.uri().path()))
}

/// Bodies or parameters Rocket could not parse.
#[catch(422)]
pub fn unprocessable(_request: &Request) -> Json<ErrorDetail> {
    detail("Invalid request parameters")
}

#[catch(500)]
pub fn internal_error(_request: &Request) -> Json<ErrorDetail> {
    detail("Internal server error")
}

/// Raised by the `Instrument` guard when no session is open.
#[catch(503)]
pub fn service_unavailable(_request: &Request) -> Json<ErrorDetail> {
    detail(NOT_CONNECTED_DETAIL)
}

#[catch(default)]
pub fn default_catcher(status: Status, _request: &Request) -> Json<ErrorDetail> {
    detail(status.reason_lossy())
}

pub fn json_catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        not_found,
        unprocessable,
        internal_error,
        service_unavailable,
        default_catcher
    ]
}
