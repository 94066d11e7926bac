// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP and WebSocket gateway for the EXFO CTP10 vector analyzer.
//!
//! - [`instrument`]: SCPI transports, the CTP10 command layer and the shared
//!   session that serializes every command
//! - [`visualization`]: REST API, WebSocket streaming and the Rocket server
//! - [`daemon`]: process lifecycle
//! - [`config`]: YAML configuration with schema validation

pub mod config;
pub mod daemon;
pub mod instrument;
pub mod utility;
pub mod visualization;
