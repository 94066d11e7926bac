// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! WebSocket streaming configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning of the per-client power streaming loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Seconds between heartbeat frames on `/ws/power`.
    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: f64,

    /// Seconds between heartbeat frames on `/ws/health`.
    #[serde(default = "default_health_heartbeat_interval_s")]
    pub health_heartbeat_interval_s: f64,

    /// Upper bound on a single frame send, in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Consecutive acquisition failures tolerated before a reconnect frame.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// `retry_after` hint carried by the reconnect frame, in seconds.
    #[serde(default = "default_retry_after_s")]
    pub retry_after_s: u64,
}

fn default_heartbeat_interval_s() -> f64 {
    30.0
}

fn default_health_heartbeat_interval_s() -> f64 {
    10.0
}

fn default_send_timeout_ms() -> u64 {
    1000
}

fn default_max_consecutive_errors() -> u32 {
    10
}

fn default_retry_after_s() -> u64 {
    5
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_s: default_heartbeat_interval_s(),
            health_heartbeat_interval_s: default_health_heartbeat_interval_s(),
            send_timeout_ms: default_send_timeout_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            retry_after_s: default_retry_after_s(),
        }
    }
}

impl StreamingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_s)
    }

    pub fn health_heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.health_heartbeat_interval_s)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
