// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the CTP10 gateway
//!
//! The configuration is backed by a YAML file and validated against an
//! embedded JSON schema before being deserialized.
//!
//! ## Configuration Structure
//!
//! - `visualization`: Settings for the web server
//! - `instrument`: How to reach the CTP10 and which defaults to apply
//! - `streaming`: WebSocket streaming tuning
//!
//! ## Usage
//!
//! ```no_run
//! use ctp10_gateway::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(8080),                        // Web port
//!     Some("127.0.0.1".to_string()),     // Web address
//!     Some("192.168.1.40".to_string()),  // Instrument IP
//!     None,                              // Instrument port
//!     false,                             // Simulated driver
//!     false,                             // Disable auto-connect
//! );
//!
//! println!("Instrument address: {}", config.instrument.address());
//! ```

pub mod instrument;
pub mod streaming;
pub mod utils;
pub mod visualization;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use instrument::{DriverKind, InstrumentConfig};
pub use streaming::StreamingConfig;
pub use utils::{is_valid_ip_address, output_config_schema};
pub use visualization::VisualizationConfig;

/// Root configuration structure for the gateway.
///
/// Each section falls back to its default values when it is missing from the
/// file, so an empty YAML document is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Settings for the web server component.
    #[serde(default)]
    pub visualization: VisualizationConfig,

    /// CTP10 connection settings and detector defaults.
    #[serde(default)]
    pub instrument: InstrumentConfig,

    /// WebSocket streaming settings.
    #[serde(default)]
    pub streaming: StreamingConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file that fails schema
    /// validation, deserialization or the specific rules leaves a
    /// `<name>.sample.yaml` next to it and returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        Self::from_yaml_str(&contents).inspect_err(|_| {
            if let Err(e) = Self::create_sample_config(path) {
                error!("Failed to create sample config: {}", e);
            }
        })
    }

    /// Parse, validate and check a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;

        // An empty document means "all defaults"
        let json_value = match serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?
        {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = serde_json::from_value(json_value)
            .context("Failed to deserialize configuration")?;

        utils::validate_specific_rules(&config)?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only explicitly provided values override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `web_port` - TCP port for the web server
    /// * `web_address` - Network address for the web server to bind to
    /// * `instrument_ip` - IP address of the CTP10
    /// * `instrument_port` - SCPI socket port of the CTP10
    /// * `simulated` - Use the in-process simulated instrument
    /// * `no_auto_connect` - Do not connect at startup
    pub fn apply_args(
        &mut self,
        web_port: Option<u16>,
        web_address: Option<String>,
        instrument_ip: Option<String>,
        instrument_port: Option<u16>,
        simulated: bool,
        no_auto_connect: bool,
    ) {
        if let Some(web_port) = web_port {
            debug!("Overriding port from command line: {}", web_port);
            self.visualization.port = web_port;
        }

        if let Some(web_address) = web_address {
            debug!("Overriding address from command line: {}", web_address);
            self.visualization.address = web_address;
        }

        if let Some(ip) = instrument_ip {
            debug!("Overriding instrument IP from command line: {}", ip);
            self.instrument.ip = ip;
        }

        if let Some(port) = instrument_port {
            debug!("Overriding instrument port from command line: {}", port);
            self.instrument.port = port;
        }

        if simulated {
            debug!("Using the simulated instrument driver");
            self.instrument.driver = DriverKind::Simulated;
        }

        if no_auto_connect {
            debug!("Auto-connect disabled from command line");
            self.instrument.auto_connect = false;
        }
    }
}
