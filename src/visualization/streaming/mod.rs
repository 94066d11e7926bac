// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Streaming broadcaster
//!
//! Live detector power over WebSocket. Every client gets its own
//! [`PowerStream`] loop; all loops share the instrument session and therefore
//! the command lock, so a slow client only delays itself.
//!
//! - [`registry`]: live stream bookkeeping exposed on `/health` and `/streams`
//! - [`power`]: the per-client loop and its frame format
//! - [`websocket`]: the `/ws/power` and `/ws/health` routes

pub mod power;
pub mod registry;
pub mod websocket;

pub use power::{
    send_bounded, FrameSink, PowerStream, SnapshotSource, StreamError, StreamFrame,
    StreamOutcome, StreamSettings, RECONNECT_REASON,
};
pub use registry::{StreamInfo, StreamRegistry, StreamState, StreamTicket};
pub use websocket::get_websocket_routes;
