// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket server builder
//!
//! Mounts every route group, merges their OpenAPI fragments and registers
//! the managed state.

use std::sync::Arc;

use log::{debug, warn};
use rocket::figment::Figment;
use rocket::{Build, Rocket};
use rocket_okapi::okapi::merge::marge_spec_list;
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::settings::OpenApiSettings;
use rocket_okapi::get_openapi_route;
use rocket_okapi::{rapidoc::*, settings::UrlObject};

use super::cors::CORS;
use super::handlers::{get_cors_routes, json_catchers};
use crate::config::Config;
use crate::instrument::InstrumentSession;
use crate::visualization::api::*;
use crate::visualization::streaming::{get_websocket_routes, StreamRegistry};

/// Route groups documented in the OpenAPI document, in mount order.
fn openapi_route_groups() -> Vec<(Vec<rocket::Route>, OpenApi)> {
    vec![
        get_cors_routes(),
        get_system_routes(),
        get_connection_routes(),
        get_detector_routes(),
        get_measurement_routes(),
        get_tls_routes(),
        get_rlaser_routes(),
    ]
}

fn merge_specs(specs: Vec<OpenApi>) -> OpenApi {
    let mut spec_list: Vec<(String, OpenApi)> =
        specs.into_iter().map(|spec| ("/".to_string(), spec)).collect();
    let mut merged = match marge_spec_list(&spec_list) {
        Ok(merged) => merged,
        Err(e) => {
            warn!("Failed to merge OpenAPI fragments: {:?}", e);
            spec_list.pop().map(|(_, spec)| spec).unwrap_or_default()
        }
    };
    merged.info.title = crate::visualization::api::system::SERVICE_NAME.to_string();
    merged.info.version = env!("CARGO_PKG_VERSION").to_string();
    merged
}

/// The merged OpenAPI document of the REST surface.
pub fn build_openapi_spec() -> OpenApi {
    merge_specs(
        openapi_route_groups()
            .into_iter()
            .map(|(_, spec)| spec)
            .collect(),
    )
}

/// Build the Rocket instance.
///
/// # Arguments
///
/// * `figment` - Rocket configuration (address, port, TLS, limits)
/// * `config` - Application configuration, managed for the request guards
/// * `session` - The instrument session shared by every handler
/// * `registry` - Registry of open power streams
pub async fn build_rocket(
    figment: Figment,
    config: Arc<Config>,
    session: Arc<InstrumentSession>,
    registry: StreamRegistry,
) -> Rocket<Build> {
    let mut rocket_builder = rocket::custom(figment)
        .attach(CORS)
        .register("/", json_catchers());

    let mut specs = Vec::new();
    for (routes, spec) in openapi_route_groups() {
        rocket_builder = rocket_builder.mount("/", routes);
        specs.push(spec);
    }
    let merged_spec = merge_specs(specs);
    debug!(
        "OpenAPI document covers {} paths",
        merged_spec.paths.len()
    );

    let openapi_settings = OpenApiSettings::default();
    rocket_builder
        .mount("/", get_websocket_routes())
        .mount("/", vec![get_openapi_route(merged_spec, &openapi_settings)])
        .mount(
            "/api/doc/",
            make_rapidoc(&RapiDocConfig {
                title: Some("EXFO CTP10 Vector Analyzer API Doc".to_owned()),
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("General", "../../openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    allow_spec_file_download: true,
                    show_curl_before_try: true,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
        .manage(config)
        .manage(session)
        .manage(registry)
}
