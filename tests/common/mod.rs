// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket test clients backed by the simulated CTP10.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rocket::config::LogLevel;
use rocket::local::asynchronous::Client;

use ctp10_gateway::config::{Config, DriverKind};
use ctp10_gateway::instrument::drivers::simulated::{SimulatedConnector, SimulatedCtp10};
use ctp10_gateway::instrument::InstrumentSession;
use ctp10_gateway::visualization::server::build_rocket;
use ctp10_gateway::visualization::streaming::StreamRegistry;

pub const TRACE_POINTS: usize = 501;

pub fn get_figment() -> rocket::figment::Figment {
    rocket::Config::figment()
        .merge(("port", 0))
        .merge(("address", "127.0.0.1"))
        .merge(("log_level", LogLevel::Off))
}

pub fn simulated_config() -> Config {
    let mut config = Config::default();
    config.instrument.driver = DriverKind::Simulated;
    config
}

pub fn simulated_session() -> Arc<InstrumentSession> {
    let connector = SimulatedConnector::new(SimulatedCtp10::new().with_trace_points(TRACE_POINTS));
    Arc::new(InstrumentSession::new(
        Box::new(connector),
        "SIMULATED::CTP10".to_string(),
        Duration::from_secs(5),
    ))
}

/// Client over a simulated instrument, connected or not.
pub async fn simulated_client(connected: bool) -> (Client, Arc<InstrumentSession>) {
    let session = simulated_session();
    if connected {
        session
            .connect(None, None)
            .await
            .expect("simulated instrument connects");
    }
    let rocket = build_rocket(
        get_figment(),
        Arc::new(simulated_config()),
        Arc::clone(&session),
        StreamRegistry::new(),
    )
    .await;
    let client = Client::tracked(rocket)
        .await
        .expect("valid rocket instance");
    (client, session)
}
