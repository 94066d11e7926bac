// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use ctp10_gateway::config::{Config, DriverKind};
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.visualization.port = 8081;
    config.visualization.address = "192.168.1.1".to_string();
    config.instrument.ip = "10.0.0.42".to_string();
    config.instrument.default_module = 2;
    config.streaming.heartbeat_interval_s = 5.0;

    config.save_to_file(&config_path)?;
    let loaded = Config::from_file(&config_path)?;

    assert_eq!(loaded.visualization.port, 8081);
    assert_eq!(loaded.visualization.address, "192.168.1.1");
    assert_eq!(loaded.instrument.ip, "10.0.0.42");
    assert_eq!(loaded.instrument.default_module, 2);
    assert_eq!(loaded.streaming.heartbeat_interval_s, 5.0);

    Ok(())
}

#[test]
fn test_missing_file_is_created_with_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("fresh.yaml");

    let config = Config::from_file(&path)?;

    assert!(path.exists());
    assert_eq!(config.visualization.port, 8002);
    assert_eq!(config.instrument.port, 5025);
    assert_eq!(config.instrument.driver, DriverKind::Scpi);
    assert_eq!(
        config.instrument.address(),
        "TCPIP::192.168.1.37::5025::SOCKET"
    );
    assert_eq!(config.instrument.timeout().as_secs(), 120);

    Ok(())
}

#[test]
fn test_empty_document_means_defaults() -> Result<()> {
    let config = Config::from_yaml_str("")?;
    assert_eq!(config.instrument.default_module, 4);
    assert_eq!(config.instrument.default_channel, 1);
    assert!(config.visualization.enabled);

    let config = Config::from_yaml_str("instrument:\n  driver: simulated\n")?;
    assert_eq!(config.instrument.driver, DriverKind::Simulated);
    assert_eq!(config.instrument.ip, "192.168.1.37");

    Ok(())
}

#[test]
fn test_invalid_file_leaves_a_sample() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("broken.yaml");
    std::fs::write(&path, "instrument:\n  default_module: 42\n")?;

    let err = Config::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("validation"), "{}", err);
    assert!(temp_dir.path().join("broken.sample.yaml").exists());

    Ok(())
}

#[test]
fn test_specific_rules() {
    // Schema-valid but rejected by the extra checks
    let wildcard = "instrument:\n  ip: 0.0.0.0\n";
    assert!(Config::from_yaml_str(wildcard).is_err());

    let cert_without_key = "visualization:\n  cert: aGVsbG8=\n";
    assert!(Config::from_yaml_str(cert_without_key).is_err());

    let bad_driver = "instrument:\n  driver: gpib\n";
    assert!(Config::from_yaml_str(bad_driver).is_err());
}

#[test]
fn test_apply_args_overrides_only_given_values() {
    let mut config = Config::default();
    config.apply_args(None, None, None, None, false, false);
    assert_eq!(config.visualization.port, 8002);
    assert!(config.instrument.auto_connect);

    config.apply_args(
        Some(9000),
        Some("127.0.0.1".to_string()),
        Some("10.1.1.1".to_string()),
        Some(5026),
        true,
        true,
    );
    assert_eq!(config.visualization.port, 9000);
    assert_eq!(config.visualization.address, "127.0.0.1");
    assert_eq!(config.instrument.address(), "TCPIP::10.1.1.1::5026::SOCKET");
    assert_eq!(config.instrument.driver, DriverKind::Simulated);
    assert!(!config.instrument.auto_connect);
}
