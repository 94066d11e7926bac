// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Web server for the CTP10 gateway
//!
//! The Rocket instance carries three pieces of managed state:
//!
//! - `Arc<Config>`: the loaded configuration, read by the guards for the
//!   default module and channel and by the WebSocket routes for the
//!   streaming settings
//! - `Arc<InstrumentSession>`: the one instrument session of the process
//! - [`StreamRegistry`](crate::visualization::streaming::StreamRegistry):
//!   open power streams
//!
//! REST routes are documented through rocket_okapi; `/openapi.json` serves
//! the merged document and `/api/doc/` a RapiDoc viewer over it.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ctp10_gateway::config::Config;
//! use ctp10_gateway::instrument::InstrumentSession;
//! use ctp10_gateway::visualization::server;
//! use ctp10_gateway::visualization::streaming::StreamRegistry;
//!
//! async fn start_server() {
//!     let config = Arc::new(Config::default());
//!     let session = Arc::new(InstrumentSession::from_config(&config.instrument));
//!     let figment = rocket::Config::figment()
//!         .merge(("address", "127.0.0.1"))
//!         .merge(("port", 8002));
//!     let rocket = server::build_rocket(figment, config, session, StreamRegistry::new()).await;
//!     let _ = rocket.launch().await;
//! }
//! ```

pub mod builder;
pub mod cors;
pub mod handlers;

pub use self::builder::{build_openapi_spec, build_rocket};
