// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! WebSocket routes.
//!
//! Query parameters are validated before the upgrade so that a bad request
//! gets a plain 422 response. Each socket is split: the write half becomes
//! the loop's [`FrameSink`], the read half is watched for the client going
//! away, and whichever finishes first cancels the other.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use rocket::futures::stream::{SplitSink, SplitStream};
use rocket::futures::{SinkExt, StreamExt};
use rocket::{get, routes, Route, State};
use rocket_ws as ws;

use crate::config::Config;
use crate::instrument::InstrumentSession;
use crate::visualization::api::{in_range, ApiResult, MODULE_RANGE};

use super::power::{
    send_bounded, FrameSink, PowerStream, SnapshotSource, StreamError, StreamFrame, StreamOutcome,
    StreamSettings,
};
use super::registry::StreamRegistry;

pub const DEFAULT_INTERVAL_S: f64 = 0.1;
pub const INTERVAL_RANGE_S: (f64, f64) = (0.01, 10.0);

/// Write half of a WebSocket carrying JSON text frames.
pub struct WsSink {
    inner: SplitSink<ws::stream::DuplexStream, ws::Message>,
}

impl WsSink {
    pub fn new(inner: SplitSink<ws::stream::DuplexStream, ws::Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &StreamFrame) -> Result<(), StreamError> {
        let text = frame.to_json()?;
        self.inner
            .send(ws::Message::Text(text))
            .await
            .map_err(|e| StreamError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.inner
            .close()
            .await
            .map_err(|e| StreamError::Send(e.to_string()))
    }
}

/// Resolve once the client closes the socket or the connection breaks.
async fn client_gone(incoming: &mut SplitStream<ws::stream::DuplexStream>) {
    while let Some(message) = incoming.next().await {
        match message {
            Ok(ws::Message::Close(_)) => return,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket read error: {}", e);
                return;
            }
        }
    }
}

/// Run `stream` until it ends on its own or `gone` resolves.
///
/// Returns `None` when the client left first. The loop future is dropped at
/// its next suspension point, which releases its registration.
pub async fn stream_until_gone<K, G>(
    stream: &PowerStream,
    sink: &mut K,
    gone: G,
) -> Option<StreamOutcome>
where
    K: FrameSink + ?Sized,
    G: Future<Output = ()>,
{
    tokio::select! {
        outcome = stream.run(sink) => Some(outcome),
        _ = gone => None,
    }
}

/// Stream power readings of one detector module.
///
/// `interval` is the period between snapshots in seconds.
#[get("/ws/power?<module>&<interval>")]
pub fn power_stream(
    socket: ws::WebSocket,
    session: &State<Arc<InstrumentSession>>,
    registry: &State<StreamRegistry>,
    config: &State<Arc<Config>>,
    module: Option<u8>,
    interval: Option<f64>,
) -> ApiResult<ws::Channel<'static>> {
    let module = in_range(
        "module",
        module.unwrap_or(config.instrument.default_module),
        MODULE_RANGE.0,
        MODULE_RANGE.1,
    )?;
    let interval = in_range(
        "interval",
        interval.unwrap_or(DEFAULT_INTERVAL_S),
        INTERVAL_RANGE_S.0,
        INTERVAL_RANGE_S.1,
    )?;

    let source: Arc<dyn SnapshotSource> = Arc::clone(session.inner()) as Arc<dyn SnapshotSource>;
    let settings = StreamSettings::from_config(&config.streaming, Duration::from_secs_f64(interval));
    let stream = PowerStream::new(source, registry.inner().clone(), module, settings);

    Ok(socket.channel(move |duplex| {
        Box::pin(async move {
            let (sink, mut incoming) = duplex.split();
            let mut sink = WsSink::new(sink);
            match stream_until_gone(&stream, &mut sink, client_gone(&mut incoming)).await {
                Some(outcome) => {
                    debug!("Power stream on module {} ended: {:?}", module, outcome);
                }
                None => info!("Power stream client on module {} disconnected", module),
            }
            Ok(())
        })
    }))
}

/// Connection liveness channel.
///
/// Sends a heartbeat periodically and answers the text `ping` with `pong`.
#[get("/ws/health")]
pub fn health_stream(
    socket: ws::WebSocket,
    registry: &State<StreamRegistry>,
    config: &State<Arc<Config>>,
) -> ws::Channel<'static> {
    let registry = registry.inner().clone();
    let period = config.streaming.health_heartbeat_interval();
    let send_timeout = config.streaming.send_timeout();

    socket.channel(move |duplex| {
        Box::pin(async move {
            let (sink, mut incoming) = duplex.split();
            let mut sink = WsSink::new(sink);
            let mut ticker = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let frame = StreamFrame::heartbeat(registry.len());
                        if send_bounded(&mut sink, &frame, send_timeout).await.is_err() {
                            break;
                        }
                    }
                    message = incoming.next() => match message {
                        Some(Ok(ws::Message::Text(text))) if text.trim() == "ping" => {
                            if send_bounded(&mut sink, &StreamFrame::pong(), send_timeout)
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Some(Ok(ws::Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("Health socket read error: {}", e);
                            break;
                        }
                    }
                }
            }
            debug!("Health socket closed");
            Ok(())
        })
    })
}

/// WebSocket routes are not part of the OpenAPI document.
pub fn get_websocket_routes() -> Vec<Route> {
    routes![power_stream, health_stream]
}
