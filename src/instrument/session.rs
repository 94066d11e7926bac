// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Instrument session
//!
//! [`InstrumentSession`] owns the single connection to the CTP10. It is
//! created once by the daemon, shared with Rocket as managed state and with
//! every streaming loop through an `Arc`.
//!
//! ### Command lock
//!
//! The transport lives inside a `tokio::sync::Mutex<Option<Link>>`. Every
//! operation acquires an *owned* guard and moves it into the blocking worker
//! together with the closure, so:
//!
//! - no two round trips ever overlap on the wire
//! - the lock is held until the blocking call returns, even if the request
//!   that started it is cancelled
//! - a panicking call unwinds through the guard and releases it
//!
//! One [`InstrumentSession::execute`] is one acquisition. Composite reads that
//! must be consistent (a detector snapshot, a trace with both axes) run inside
//! one closure, other multi-step handlers issue several `execute` calls so
//! they do not starve concurrent clients.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::config::InstrumentConfig;

use super::commands::Ctp10;
use super::error::{GatewayError, GatewayResult, InstrumentError, InstrumentResult};
use super::readings::DetectorSnapshot;
use super::{create_connector, ScpiTransport, TransportConnector};

/// Interval between condition register polls while waiting for a sweep.
const SWEEP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A live connection.
struct Link {
    transport: Box<dyn ScpiTransport>,
    instrument_id: String,
    address: String,
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub address: String,
    pub timeout: Duration,
}

/// Outcome of a successful connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub instrument_id: String,
    pub address: String,
}

/// Run a blocking operation on the worker pool.
///
/// This is the only place the gateway leaves the async scheduler; the
/// returned future resolves once the operation has returned or panicked.
pub fn submit<F, T>(op: F) -> impl Future<Output = GatewayResult<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(op);
    async move {
        handle
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))
    }
}

/// The single CTP10 session of the process.
pub struct InstrumentSession {
    connector: Arc<dyn TransportConnector>,
    settings: RwLock<ConnectionSettings>,
    link: Arc<Mutex<Option<Link>>>,
    connected: Arc<AtomicBool>,
}

impl InstrumentSession {
    /// Create a disconnected session.
    pub fn new(connector: Box<dyn TransportConnector>, address: String, timeout: Duration) -> Self {
        Self {
            connector: Arc::from(connector),
            settings: RwLock::new(ConnectionSettings { address, timeout }),
            link: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a disconnected session for the configured driver and address.
    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(create_connector(config), config.address(), config.timeout())
    }

    pub fn driver_name(&self) -> &'static str {
        self.connector.name()
    }

    /// Pure query, never touches the transport.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn address(&self) -> String {
        self.settings().address
    }

    pub fn timeout(&self) -> Duration {
        self.settings().timeout
    }

    /// Open the connection and identify the instrument.
    ///
    /// Already connected: the existing link is reported and nothing is
    /// opened. Otherwise `address`/`timeout` replace the stored settings when
    /// given. A failed open or identification leaves the session
    /// disconnected.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] for a blank address or a zero timeout,
    /// before the lock is taken.
    pub async fn connect(
        &self,
        address: Option<String>,
        timeout: Option<Duration>,
    ) -> GatewayResult<ConnectionInfo> {
        if address.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(GatewayError::Validation(
                "address must not be empty".to_string(),
            ));
        }
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(GatewayError::Validation(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let mut guard = Arc::clone(&self.link).lock_owned().await;
        if let Some(link) = guard.as_ref() {
            debug!("Already connected to {}, reusing the session", link.address);
            return Ok(ConnectionInfo {
                instrument_id: link.instrument_id.clone(),
                address: link.address.clone(),
            });
        }

        let settings = {
            let mut settings = self
                .settings
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(address) = address {
                settings.address = address;
            }
            if let Some(timeout) = timeout {
                settings.timeout = timeout;
            }
            settings.clone()
        };

        info!(
            "Connecting to CTP10 at {} ({} driver, timeout {:?})",
            settings.address,
            self.connector.name(),
            settings.timeout
        );

        let connector = Arc::clone(&self.connector);
        let connected = Arc::clone(&self.connected);
        let result = submit(move || -> GatewayResult<ConnectionInfo> {
            let mut transport = connector
                .open(&settings.address, settings.timeout)
                .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;

            match Ctp10::new(transport.as_mut()).identify() {
                Ok(instrument_id) => {
                    *guard = Some(Link {
                        transport,
                        instrument_id: instrument_id.clone(),
                        address: settings.address.clone(),
                    });
                    connected.store(true, Ordering::SeqCst);
                    Ok(ConnectionInfo {
                        instrument_id,
                        address: settings.address,
                    })
                }
                Err(e) => {
                    if let Err(close_err) = transport.close() {
                        warn!("Closing the failed transport: {}", close_err);
                    }
                    *guard = None;
                    connected.store(false, Ordering::SeqCst);
                    Err(GatewayError::ConnectionFailed(format!(
                        "identification failed: {}",
                        e
                    )))
                }
            }
        })
        .await?;

        match &result {
            Ok(info) => info!("Connected to {} at {}", info.instrument_id, info.address),
            Err(e) => warn!("{}", e),
        }
        result
    }

    /// Close the connection. Idempotent; returns whether a link was closed.
    ///
    /// Close errors are logged, the link is cleared regardless.
    pub async fn disconnect(&self) -> GatewayResult<bool> {
        let mut guard = Arc::clone(&self.link).lock_owned().await;
        self.connected.store(false, Ordering::SeqCst);
        let Some(mut link) = guard.take() else {
            debug!("Disconnect requested while not connected");
            return Ok(false);
        };

        submit(move || {
            if let Err(e) = link.transport.close() {
                warn!("Error while closing the CTP10 transport: {}", e);
            }
            info!("Disconnected from {}", link.address);
            drop(guard);
        })
        .await?;
        Ok(true)
    }

    /// Run `op` on the instrument under one acquisition of the command lock.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotConnected`] without a live session, otherwise the
    /// error returned by `op` as [`GatewayError::Hardware`].
    pub async fn execute<F, T>(&self, op: F) -> GatewayResult<T>
    where
        F: FnOnce(&mut Ctp10<'_>) -> InstrumentResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = Arc::clone(&self.link).lock_owned().await;
        if guard.is_none() {
            return Err(GatewayError::NotConnected);
        }
        submit(move || {
            let link = guard.as_mut().ok_or(GatewayError::NotConnected)?;
            let mut ctp = Ctp10::new(link.transport.as_mut());
            op(&mut ctp).map_err(GatewayError::from)
        })
        .await?
    }

    /// One consistent detector reading: shared properties then channels 1-4.
    pub async fn snapshot(&self, module: u8) -> GatewayResult<DetectorSnapshot> {
        self.execute(move |ctp| ctp.snapshot(module)).await
    }

    /// Query the identification string again.
    pub async fn identify(&self) -> GatewayResult<String> {
        self.execute(|ctp| ctp.identify()).await
    }

    /// Wait for the running sweep to finish.
    ///
    /// The condition register is polled with one acquisition per poll, other
    /// clients keep their access to the instrument in between.
    pub async fn wait_for_sweep(&self, timeout: Duration) -> GatewayResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.execute(|ctp| ctp.sweep_complete()).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GatewayError::Hardware(InstrumentError::Timeout {
                    command: "sweep completion".to_string(),
                    timeout,
                }));
            }
            tokio::time::sleep(SWEEP_POLL_INTERVAL).await;
        }
    }
}
