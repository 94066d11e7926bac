// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-client power streaming loop.
//!
//! [`PowerStream::run`] drives one client through
//! `Connecting → Streaming ⇄ Degraded → Closed`. Each tick it optionally
//! sends a heartbeat, then reads one detector snapshot through the shared
//! session and sends it as a `data` frame. Failed reads are reported to the
//! client as recoverable `error` frames until the consecutive error budget is
//! spent, at which point a `reconnect` frame is sent and the socket closed.
//!
//! The loop knows nothing about WebSockets: frames go through a
//! [`FrameSink`] and snapshots come from a [`SnapshotSource`], which keeps it
//! testable on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};

use crate::config::StreamingConfig;
use crate::instrument::commands::unix_timestamp;
use crate::instrument::{DetectorSnapshot, GatewayResult, InstrumentSession};

use super::registry::{StreamRegistry, StreamState};

pub const RECONNECT_REASON: &str = "Too many consecutive errors";

/// JSON frames sent to streaming clients, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    Data(DetectorSnapshot),
    Heartbeat {
        timestamp: f64,
        active_streams: usize,
    },
    Error {
        message: String,
        timestamp: f64,
        recoverable: bool,
        error_count: u32,
    },
    Reconnect {
        reason: String,
        retry_after: u64,
    },
    Pong {
        timestamp: f64,
    },
}

impl StreamFrame {
    pub fn heartbeat(active_streams: usize) -> Self {
        StreamFrame::Heartbeat {
            timestamp: unix_timestamp(),
            active_streams,
        }
    }

    pub fn pong() -> Self {
        StreamFrame::Pong {
            timestamp: unix_timestamp(),
        }
    }

    pub fn to_json(&self) -> Result<String, StreamError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Send failed: {0}")]
    Send(String),
}

/// Where snapshots come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self, module: u8) -> GatewayResult<DetectorSnapshot>;
}

#[async_trait]
impl SnapshotSource for InstrumentSession {
    async fn snapshot(&self, module: u8) -> GatewayResult<DetectorSnapshot> {
        InstrumentSession::snapshot(self, module).await
    }
}

/// Where frames go.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &StreamFrame) -> Result<(), StreamError>;

    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Loop parameters for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub interval: Duration,
    pub heartbeat_interval: Duration,
    pub send_timeout: Duration,
    pub max_consecutive_errors: u32,
    pub retry_after_s: u64,
}

impl StreamSettings {
    pub fn from_config(config: &StreamingConfig, interval: Duration) -> Self {
        Self {
            interval,
            heartbeat_interval: config.heartbeat_interval(),
            send_timeout: config.send_timeout(),
            max_consecutive_errors: config.max_consecutive_errors.max(1),
            retry_after_s: config.retry_after_s,
        }
    }
}

/// Why a loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The error budget was spent and the client was told to reconnect.
    TooManyErrors,
    /// The transport refused a frame.
    SendFailed,
}

pub struct PowerStream {
    source: Arc<dyn SnapshotSource>,
    registry: StreamRegistry,
    module: u8,
    settings: StreamSettings,
}

impl PowerStream {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        registry: StreamRegistry,
        module: u8,
        settings: StreamSettings,
    ) -> Self {
        Self {
            source,
            registry,
            module,
            settings,
        }
    }

    /// Stream until the error budget is spent or a send fails.
    ///
    /// Client disconnects are detected by the caller, which drops this
    /// future; the registration is released either way.
    pub async fn run<K: FrameSink + ?Sized>(&self, sink: &mut K) -> StreamOutcome {
        let ticket = self.registry.register(self.module, self.settings.interval);
        info!(
            "Power stream {} opened (module {}, interval {:?})",
            ticket.id(),
            self.module,
            self.settings.interval
        );
        ticket.set_state(StreamState::Streaming);

        let mut last_heartbeat = Instant::now();
        let mut error_count: u32 = 0;

        let outcome = loop {
            if last_heartbeat.elapsed() >= self.settings.heartbeat_interval {
                last_heartbeat = Instant::now();
                let frame = StreamFrame::heartbeat(self.registry.len());
                if self.emit(sink, &frame).await.is_err() {
                    break StreamOutcome::SendFailed;
                }
            }

            let frame = match self.source.snapshot(self.module).await {
                Ok(snapshot) => {
                    if error_count > 0 {
                        info!(
                            "Power stream {} recovered after {} error(s)",
                            ticket.id(),
                            error_count
                        );
                        error_count = 0;
                        ticket.set_error_count(0);
                        ticket.set_state(StreamState::Streaming);
                    }
                    debug!("Power stream {}: {:?}", ticket.id(), snapshot);
                    StreamFrame::Data(snapshot)
                }
                Err(e) => {
                    error_count += 1;
                    ticket.set_error_count(error_count);
                    ticket.set_state(StreamState::Degraded);
                    warn!(
                        "Power stream {}: snapshot failed ({}/{}): {}",
                        ticket.id(),
                        error_count,
                        self.settings.max_consecutive_errors,
                        e
                    );
                    StreamFrame::Error {
                        message: e.to_string(),
                        timestamp: unix_timestamp(),
                        recoverable: true,
                        error_count,
                    }
                }
            };
            if self.emit(sink, &frame).await.is_err() {
                break StreamOutcome::SendFailed;
            }

            if error_count >= self.settings.max_consecutive_errors {
                warn!(
                    "Power stream {}: {} consecutive errors, asking the client to reconnect",
                    ticket.id(),
                    error_count
                );
                let frame = StreamFrame::Reconnect {
                    reason: RECONNECT_REASON.to_string(),
                    retry_after: self.settings.retry_after_s,
                };
                // Closing regardless of the outcome of this last frame
                let _ = self.emit(sink, &frame).await;
                if let Err(e) = sink.close().await {
                    debug!("Closing power stream {}: {}", ticket.id(), e);
                }
                break StreamOutcome::TooManyErrors;
            }

            tokio::time::sleep(self.settings.interval).await;
        };

        ticket.set_state(StreamState::Closed);
        info!("Power stream {} closed: {:?}", ticket.id(), outcome);
        outcome
    }

    async fn emit<K: FrameSink + ?Sized>(
        &self,
        sink: &mut K,
        frame: &StreamFrame,
    ) -> Result<(), StreamError> {
        send_bounded(sink, frame, self.settings.send_timeout).await
    }
}

/// Send one frame, dropping it if the client does not take it in time.
///
/// Only a transport error is returned; an expired send is logged and
/// reported as success so the caller moves on to the next frame.
pub async fn send_bounded<K: FrameSink + ?Sized>(
    sink: &mut K,
    frame: &StreamFrame,
    send_timeout: Duration,
) -> Result<(), StreamError> {
    match timeout(send_timeout, sink.send(frame)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "Frame dropped: client did not accept it within {:?}",
                send_timeout
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::GatewayError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back scripted results, then succeeds forever.
    struct ScriptedSource {
        script: Mutex<VecDeque<bool>>,
    }

    impl ScriptedSource {
        fn failing_then_ok(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(std::iter::repeat(false).take(failures).collect()),
            })
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn snapshot(&self, module: u8) -> GatewayResult<DetectorSnapshot> {
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            if !ok {
                return Err(GatewayError::NotConnected);
            }
            Ok(DetectorSnapshot {
                timestamp: 0.0,
                module,
                wavelength_nm: 1310.0,
                unit: "dBm".to_string(),
                ch1_power: -13.2,
                ch2_power: -10.9,
                ch3_power: -8.6,
                ch4_power: -6.3,
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<StreamFrame>,
        attempts: usize,
        closed: bool,
        /// Sends with this index stall for the given time
        stall: Option<(usize, Duration)>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send(&mut self, frame: &StreamFrame) -> Result<(), StreamError> {
            let index = self.attempts;
            self.attempts += 1;
            if let Some((stalled, delay)) = self.stall {
                if stalled == index {
                    tokio::time::sleep(delay).await;
                }
            }
            self.frames.push(frame.clone());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), StreamError> {
            self.closed = true;
            Ok(())
        }
    }

    fn settings(interval: Duration) -> StreamSettings {
        StreamSettings::from_config(&StreamingConfig::default(), interval)
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_budget_ends_with_reconnect() {
        let registry = StreamRegistry::new();
        let stream = PowerStream::new(
            ScriptedSource::failing_then_ok(100),
            registry.clone(),
            4,
            settings(Duration::from_millis(100)),
        );
        let mut sink = RecordingSink::default();

        let outcome = stream.run(&mut sink).await;

        assert_eq!(outcome, StreamOutcome::TooManyErrors);
        assert_eq!(sink.frames.len(), 11);
        for (i, frame) in sink.frames[..10].iter().enumerate() {
            match frame {
                StreamFrame::Error {
                    error_count,
                    recoverable,
                    message,
                    ..
                } => {
                    assert_eq!(*error_count as usize, i + 1);
                    assert!(*recoverable);
                    assert_eq!(message, "Not connected to CTP10");
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(
            sink.frames[10],
            StreamFrame::Reconnect {
                reason: RECONNECT_REASON.to_string(),
                retry_after: 5
            }
        );
        assert!(sink.closed);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_the_error_budget() {
        let stream = PowerStream::new(
            ScriptedSource::failing_then_ok(9),
            StreamRegistry::new(),
            4,
            settings(Duration::from_millis(100)),
        );
        let mut sink = RecordingSink::default();

        let _ = timeout(Duration::from_secs(2), stream.run(&mut sink)).await;

        assert!(!sink.closed);
        assert!(sink.frames.len() > 12);
        assert!(sink.frames[..9]
            .iter()
            .all(|f| matches!(f, StreamFrame::Error { .. })));
        assert!(sink.frames[9..]
            .iter()
            .all(|f| matches!(f, StreamFrame::Data(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_send_drops_only_that_frame() {
        let stream = PowerStream::new(
            ScriptedSource::failing_then_ok(0),
            StreamRegistry::new(),
            4,
            settings(Duration::from_millis(100)),
        );
        let mut sink = RecordingSink {
            stall: Some((0, Duration::from_secs(10))),
            ..Default::default()
        };

        let _ = timeout(Duration::from_millis(1500), stream.run(&mut sink)).await;

        // First frame timed out after 1 s, later ones still went through
        assert!(sink.attempts >= 3, "attempts: {}", sink.attempts);
        assert!(!sink.frames.is_empty());
        assert!(sink
            .frames
            .iter()
            .all(|f| matches!(f, StreamFrame::Data(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_cadence_and_prompt_release() {
        let registry = StreamRegistry::new();
        let stream = PowerStream::new(
            ScriptedSource::failing_then_ok(0),
            registry.clone(),
            4,
            settings(Duration::from_millis(100)),
        );
        let mut sink = RecordingSink::default();

        let _ = timeout(Duration::from_millis(500), stream.run(&mut sink)).await;

        assert!(
            (4..=6).contains(&sink.frames.len()),
            "frames: {}",
            sink.frames.len()
        );
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_precedes_data_when_due() {
        let registry = StreamRegistry::new();
        let mut settings = settings(Duration::from_millis(100));
        settings.heartbeat_interval = Duration::from_millis(250);
        let stream = PowerStream::new(
            ScriptedSource::failing_then_ok(0),
            registry.clone(),
            2,
            settings,
        );
        let mut sink = RecordingSink::default();

        let _ = timeout(Duration::from_millis(350), stream.run(&mut sink)).await;

        let heartbeat = sink
            .frames
            .iter()
            .position(|f| matches!(f, StreamFrame::Heartbeat { .. }))
            .expect("no heartbeat");
        assert!(matches!(
            sink.frames[heartbeat],
            StreamFrame::Heartbeat {
                active_streams: 1,
                ..
            }
        ));
        assert!(matches!(sink.frames[heartbeat + 1], StreamFrame::Data(_)));
    }

    #[test]
    fn test_frame_wire_format() {
        let json = StreamFrame::Reconnect {
            reason: RECONNECT_REASON.to_string(),
            retry_after: 5,
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "reconnect");
        assert_eq!(value["retry_after"], 5);

        let value = serde_json::to_value(StreamFrame::pong()).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
    }
}
