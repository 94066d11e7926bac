// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Web facing side of the gateway: REST endpoints, WebSocket streams and the
//! Rocket server that hosts them.

pub mod api;
pub mod server;
pub mod streaming;
