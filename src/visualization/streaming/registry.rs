// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Registry of live power streams.
//!
//! Each `/ws/power` client holds a [`StreamTicket`] for the lifetime of its
//! loop. Dropping the ticket removes the registration, so a loop that ends
//! for any reason (client gone, error budget exhausted, task cancelled) never
//! leaves a stale entry behind.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rocket_okapi::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-client streaming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Connecting,
    Streaming,
    Degraded,
    Closed,
}

/// Public view of one registration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StreamInfo {
    pub id: String,
    pub module: u8,
    pub interval_s: f64,
    pub state: StreamState,
    pub error_count: u32,
    /// RFC 3339 time the stream was opened
    pub opened_at: String,
}

#[derive(Debug, Clone)]
struct Registration {
    module: u8,
    interval: Duration,
    state: StreamState,
    error_count: u32,
    opened_at: chrono::DateTime<chrono::Utc>,
}

/// Thread-safe map of stream id to registration.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<RwLock<HashMap<Uuid, Registration>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream in the `Connecting` state.
    pub fn register(&self, module: u8, interval: Duration) -> StreamTicket {
        let id = Uuid::new_v4();
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Registration {
                    module,
                    interval,
                    state: StreamState::Connecting,
                    error_count: 0,
                    opened_at: chrono::Utc::now(),
                },
            );
        StreamTicket {
            id,
            registry: self.clone(),
        }
    }

    /// Number of live streams.
    pub fn len(&self) -> usize {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all registrations, oldest first.
    pub fn list(&self) -> Vec<StreamInfo> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(&Uuid, &Registration)> = streams.iter().collect();
        entries.sort_by_key(|(_, reg)| reg.opened_at);
        entries
            .into_iter()
            .map(|(id, reg)| StreamInfo {
                id: id.to_string(),
                module: reg.module,
                interval_s: reg.interval.as_secs_f64(),
                state: reg.state,
                error_count: reg.error_count,
                opened_at: reg.opened_at.to_rfc3339(),
            })
            .collect()
    }

    fn update(&self, id: &Uuid, f: impl FnOnce(&mut Registration)) {
        if let Some(reg) = self
            .streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
        {
            f(reg);
        }
    }

    fn remove(&self, id: &Uuid) {
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

/// Handle on one registration, removed from the registry on drop.
#[derive(Debug)]
pub struct StreamTicket {
    id: Uuid,
    registry: StreamRegistry,
}

impl StreamTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_state(&self, state: StreamState) {
        self.registry.update(&self.id, |reg| reg.state = state);
    }

    pub fn set_error_count(&self, error_count: u32) {
        self.registry.update(&self.id, |reg| reg.error_count = error_count);
    }
}

impl Drop for StreamTicket {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
