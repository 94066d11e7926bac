// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::prelude::*;
use log::{debug, error, info, warn};
use rocket::config::LogLevel;
use rocket::data::{Limits, ToByteUnit};
use rocket::Shutdown;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{Config, DriverKind, InstrumentConfig};
use crate::instrument::InstrumentSession;
use crate::visualization::server::build_rocket;
use crate::visualization::streaming::StreamRegistry;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

/// Owns the instrument session and the background tasks of the gateway.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    session: Option<Arc<InstrumentSession>>,
    registry: StreamRegistry,
    rocket_shutdown: Option<Shutdown>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
            session: None,
            registry: StreamRegistry::new(),
            rocket_shutdown: None,
        }
    }

    /// The instrument session, once [`launch`](Self::launch) has run.
    pub fn session(&self) -> Option<Arc<InstrumentSession>> {
        self.session.clone()
    }

    /// Build the session, connect it if configured, then start the web
    /// server and the heartbeat.
    ///
    /// A failed auto-connect is not fatal: the API comes up anyway and a
    /// client can retry with `POST /connection/connect`.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let session = Arc::new(InstrumentSession::from_config(&config.instrument));
        info!(
            "Instrument session created ({} driver, {})",
            session.driver_name(),
            session.address()
        );

        // The simulator has nothing to wait for, so it is always connected
        if config.instrument.auto_connect || config.instrument.driver == DriverKind::Simulated {
            Self::auto_connect(&session, &config.instrument).await;
        } else {
            info!("Auto-connect disabled, waiting for POST /connection/connect");
        }
        self.session = Some(Arc::clone(&session));

        if config.visualization.enabled {
            self.start_web_server(config, session).await?;
        }

        self.start_heartbeat()?;
        Ok(())
    }

    async fn auto_connect(session: &InstrumentSession, instrument: &InstrumentConfig) {
        if let Err(e) = session.connect(None, None).await {
            warn!("Auto-connect failed, the API stays available: {}", e);
            return;
        }

        let module = instrument.default_module;
        let channel = instrument.default_channel;
        let wavelength_nm = instrument.default_wavelength_nm;
        if let Err(e) = session
            .execute(move |ctp| ctp.detector(module, channel).set_wavelength_nm(wavelength_nm))
            .await
        {
            warn!(
                "Failed to set default wavelength {} nm on module {} channel {}: {}",
                wavelength_nm, module, channel, e
            );
        }
    }

    async fn start_web_server(
        &mut self,
        config: &Config,
        session: Arc<InstrumentSession>,
    ) -> Result<()> {
        info!(
            "Starting web server on {}:{}",
            config.visualization.address, config.visualization.port
        );

        let mut figment = rocket::Config::figment()
            .merge(("ident", config.visualization.name.clone()))
            .merge(("limits", Limits::new().limit("json", 2.mebibytes())))
            .merge(("address", config.visualization.address.clone()))
            .merge(("port", config.visualization.port))
            .merge(("log_level", LogLevel::Normal));

        if let (Some(cert), Some(key)) = (&config.visualization.cert, &config.visualization.key) {
            debug!("SSL certificates found in configuration, enabling TLS");
            let cert_data = BASE64_STANDARD
                .decode(cert)
                .context("Failed to decode the TLS certificate")?;
            let key_data = BASE64_STANDARD
                .decode(key)
                .context("Failed to decode the TLS key")?;
            figment = figment
                .merge(("tls.certs", cert_data))
                .merge(("tls.key", key_data));
            info!("TLS enabled for web server");
        }

        let rocket = build_rocket(
            figment,
            Arc::new(config.clone()),
            session,
            self.registry.clone(),
        )
        .await;
        let ignited = rocket.ignite().await?;
        self.rocket_shutdown = Some(ignited.shutdown());

        let task = tokio::spawn(async move {
            ignited.launch().await?;
            Ok(())
        });
        self.tasks.push(task);
        Ok(())
    }

    /// Periodically log the session state and the number of open streams.
    fn start_heartbeat(&mut self) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = Arc::clone(&self.running);
        let wake = Arc::clone(&self.wake);
        let session = self.session.clone();
        let registry = self.registry.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let connected = session.as_ref().is_some_and(|s| s.is_connected());
                debug!(
                    "Daemon heartbeat: instrument connected={}, active streams={}",
                    connected,
                    registry.len()
                );
                tokio::select! {
                    _ = time::sleep(HEARTBEAT_PERIOD) => {}
                    _ = wake.notified() => {}
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Ask every task to stop.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
        if let Some(shutdown) = &self.rocket_shutdown {
            shutdown.clone().notify();
        }
    }

    /// Wait for the tasks to finish, then close the instrument session.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match task.await {
                Ok(Err(e)) => error!("Task failed: {}", e),
                Err(e) => error!("Task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        if let Some(session) = self.session {
            if let Err(e) = session.disconnect().await {
                warn!("Failed to close the instrument session: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headless_simulated(auto_connect: bool) -> Config {
        let mut config = Config::default();
        config.visualization.enabled = false;
        config.instrument.driver = DriverKind::Simulated;
        config.instrument.auto_connect = auto_connect;
        config
    }

    #[tokio::test]
    async fn test_simulated_session_connects_and_applies_defaults() {
        let config = headless_simulated(false);
        let mut daemon = Daemon::new();
        daemon.launch(&config).await.unwrap();

        let session = daemon.session().unwrap();
        assert!(session.is_connected());
        let wavelength = session
            .execute(|ctp| ctp.detector(4, 1).wavelength_nm())
            .await
            .unwrap();
        assert!((wavelength - config.instrument.default_wavelength_nm).abs() < 1e-6);

        daemon.shutdown();
        daemon.join().await.unwrap();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_launch_leaves_the_sampling_resolution_alone() {
        let config = headless_simulated(true);
        let mut daemon = Daemon::new();
        daemon.launch(&config).await.unwrap();

        let session = daemon.session().unwrap();
        let resolution = session.execute(|ctp| ctp.resolution_pm()).await.unwrap();
        assert!((resolution - 0.1).abs() < 1e-9, "resolution is {} pm", resolution);

        daemon.shutdown();
        daemon.join().await.unwrap();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_instrument_is_not_fatal() {
        let mut config = Config::default();
        config.visualization.enabled = false;
        config.instrument.driver = DriverKind::Scpi;
        config.instrument.ip = "127.0.0.1".to_string();
        config.instrument.port = 1;
        config.instrument.timeout_ms = 1000;

        let mut daemon = Daemon::new();
        daemon.launch(&config).await.unwrap();
        assert!(!daemon.session().unwrap().is_connected());

        daemon.shutdown();
        daemon.join().await.unwrap();
    }
}
