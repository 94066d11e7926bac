// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use base64::Engine;
use log::debug;

use super::Config;

/// Output the embedded JSON schema to the console.
///
/// Called when `--show-config-schema` is given on the command line.
///
/// # Example
///
/// ```bash
/// ./ctp10_gateway --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Accepts IPv4/IPv6 literals and the special values "localhost", "::" and
/// "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **SSL Configuration**: a certificate requires a key and vice versa, both base64
/// - **Port Range**: the web server port is within 1-65534
/// - **Instrument address**: the instrument IP is not empty, and not a wildcard
/// - **Detector defaults**: module 1-20, channel 1-6
/// - **Streaming**: positive, finite intervals
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if let Some(cert) = &config.visualization.cert {
        if config.visualization.key.is_none() {
            anyhow::bail!("SSL certificate provided without a key");
        }

        let _ = base64::engine::general_purpose::STANDARD
            .decode(cert)
            .context("SSL certificate is not valid base64")?;
    }

    if let Some(key) = &config.visualization.key {
        if config.visualization.cert.is_none() {
            anyhow::bail!("SSL key provided without a certificate");
        }

        let _ = base64::engine::general_purpose::STANDARD
            .decode(key)
            .context("SSL key is not valid base64")?;
    }

    if config.visualization.port < 1 || config.visualization.port > 65534 {
        anyhow::bail!("Invalid port number: {}", config.visualization.port);
    }

    if !is_valid_ip_address(&config.visualization.address) {
        // Hostnames are allowed, Rocket resolves them
        debug!(
            "Potentially invalid address format: {}",
            config.visualization.address
        );
    }

    let ip = config.instrument.ip.trim();
    if ip.is_empty() {
        anyhow::bail!("Instrument IP address must not be empty");
    }
    if matches!(ip, "0.0.0.0" | "::" | "::0") {
        anyhow::bail!("Instrument IP address cannot be a wildcard address: {}", ip);
    }

    if !(1..=20).contains(&config.instrument.default_module) {
        anyhow::bail!(
            "Default detector module must be 1-20, got {}",
            config.instrument.default_module
        );
    }
    if !(1..=6).contains(&config.instrument.default_channel) {
        anyhow::bail!(
            "Default detector channel must be 1-6, got {}",
            config.instrument.default_channel
        );
    }

    for (name, value) in [
        ("heartbeat_interval_s", config.streaming.heartbeat_interval_s),
        (
            "health_heartbeat_interval_s",
            config.streaming.health_heartbeat_interval_s,
        ),
    ] {
        if !value.is_finite() || value <= 0.0 {
            anyhow::bail!("Streaming {} must be a positive number, got {}", name, value);
        }
    }

    Ok(())
}
