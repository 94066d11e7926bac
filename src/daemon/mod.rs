// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon lifecycle
//!
//! [`launch_daemon::Daemon`] owns the process-wide instrument session. It
//! creates it at startup, optionally connects it, serves the API over it and
//! closes it on shutdown.
//!
//! ## Example
//!
//! ```no_run
//! use anyhow::Result;
//! use ctp10_gateway::config::Config;
//! use ctp10_gateway::daemon::launch_daemon::Daemon;
//!
//! async fn run() -> Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

pub mod launch_daemon;
