// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Integration tests for opcpub-config functionality including:
//!
//! - Loading YAML, TOML and JSON files
//! - Environment placeholders
//! - Validation and error reporting
//! - Conversion into engine settings
//!
//! ## Test Categories
//!
//! - `test_load_*`: File loading tests
//! - `test_validation_*`: Validation tests
//! - `test_settings_*`: Engine settings conversion tests

use std::io::Write;
use std::time::Duration;

use opcpub_config::{
    load_config, load_config_str, ConfigError, ConfigFormat, ConfigLoader, LogFormat, LogLevel,
    PublisherConfig,
};
use opcpub_opcua::EngineSettings;
use opcpub_tests::prelude::*;
use tempfile::NamedTempFile;

fn write_config(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(suffix).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_minimal_yaml() {
    let file = write_config(ConfigFixtures::minimal_yaml(), ".yaml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.session.timeout_secs, 30);
    assert_eq!(config.subscription, PublisherConfig::default().subscription);
    assert_eq!(config.reconcile, PublisherConfig::default().reconcile);
    assert_eq!(config.telemetry, PublisherConfig::default().telemetry);
}

#[test]
fn test_load_complete_yaml() {
    let file = write_config(ConfigFixtures::complete_yaml(), ".yml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.session.timeout_secs, 60);
    assert_eq!(config.session.creation_backoff_max, 5);
    assert_eq!(config.session.keep_alive_disconnect_threshold, 5);
    assert!(!config.session.use_security);
    assert!(config.session.fetch_display_name);
    assert_eq!(config.subscription.default_publishing_interval_ms, 1000);
    assert_eq!(config.subscription.queue_size, 10);
    assert_eq!(config.reconcile.interval_secs, 30);
    assert_eq!(config.reconcile.max_concurrent_passes, 8);
    assert!(config.telemetry.status_code);
    assert_eq!(config.telemetry.shopfloor_domain.as_deref(), Some("plant-7"));
    assert_eq!(config.logging.level, LogLevel::Info);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_load_complete_toml() {
    let file = write_config(ConfigFixtures::complete_toml(), ".toml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.session.timeout_secs, 60);
    assert_eq!(config.subscription.default_sampling_interval_ms, 500);
    assert_eq!(config.reconcile.interval_secs, 15);
    assert!(config.telemetry.status);
    assert_eq!(config.telemetry.shopfloor_domain.as_deref(), Some("plant-7"));
}

#[test]
fn test_load_json_round_trip() {
    let config = load_config_str(ConfigFixtures::complete_toml(), ConfigFormat::Toml).unwrap();
    let json = serde_json::to_string_pretty(&config).unwrap();

    let file = write_config(&json, ".json");
    assert_eq!(load_config(file.path()).unwrap(), config);
}

#[test]
fn test_load_resolves_env_placeholders() {
    std::env::set_var("OPCPUB_IT_SESSION_TIMEOUT", "42");
    let yaml = r#"
session:
  timeout_secs: ${OPCPUB_IT_SESSION_TIMEOUT}
reconcile:
  interval_secs: ${OPCPUB_IT_UNSET_INTERVAL:12}
"#;
    let file = write_config(yaml, ".yaml");
    let config = ConfigLoader::new().load(file.path()).unwrap();

    assert_eq!(config.session.timeout_secs, 42);
    assert_eq!(config.reconcile.interval_secs, 12);
}

#[test]
fn test_load_strict_placeholders() {
    let yaml = "session:\n  timeout_secs: ${OPCPUB_IT_NEVER_SET}\n";
    let result = ConfigLoader::new()
        .with_strict_env_vars(true)
        .load_from_str(yaml, ConfigFormat::Yaml);

    assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
}

#[test]
fn test_load_invalid_yaml() {
    let file = write_config(ConfigFixtures::invalid_yaml(), ".yaml");
    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn test_load_unknown_field_rejected() {
    let file = write_config(ConfigFixtures::unknown_field_yaml(), ".yaml");
    assert!(load_config(file.path()).is_err());
}

#[test]
fn test_load_unsupported_extension() {
    let file = write_config(ConfigFixtures::minimal_yaml(), ".ini");
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(dir.path().join("publisher.yaml")).unwrap_err();

    assert!(matches!(err, ConfigError::FileNotFound { .. }));
    assert!(err.is_missing_file());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_validation_zero_timeout() {
    let err = load_config_str(ConfigFixtures::zero_timeout_yaml(), ConfigFormat::Yaml).unwrap_err();
    match err {
        ConfigError::Validation { field, .. } => assert_eq!(field, "session.timeout_secs"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_validation_zero_fields() {
    let cases = [
        ("session:\n  creation_backoff_max: 0\n", "session.creation_backoff_max"),
        (
            "session:\n  keep_alive_disconnect_threshold: 0\n",
            "session.keep_alive_disconnect_threshold",
        ),
        ("reconcile:\n  interval_secs: 0\n", "reconcile.interval_secs"),
        (
            "reconcile:\n  max_concurrent_passes: 0\n",
            "reconcile.max_concurrent_passes",
        ),
    ];

    for (yaml, expected) in cases {
        match load_config_str(yaml, ConfigFormat::Yaml) {
            Err(ConfigError::Validation { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected validation error for {expected}, got {other:?}"),
        }
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

#[test]
fn test_settings_from_config() {
    let config = load_config_str(ConfigFixtures::complete_yaml(), ConfigFormat::Yaml).unwrap();
    let settings = EngineSettings::from(&config);

    assert_eq!(settings.session_timeout, Duration::from_secs(60));
    assert_eq!(settings.keep_alive_interval, Duration::from_secs(2));
    assert_eq!(settings.keep_alive_disconnect_threshold, 5);
    assert_eq!(settings.default_publishing_interval, Duration::from_millis(1000));
    assert_eq!(settings.default_sampling_interval, Duration::from_millis(500));
    assert_eq!(settings.reconcile_interval, Duration::from_secs(30));
    assert_eq!(settings.max_concurrent_passes, 8);
    assert!(settings.fetch_display_name);
    assert_eq!(settings.telemetry, config.telemetry);

    assert_eq!(
        settings.connect_timeout(settings.session_timeout, 10),
        Duration::from_secs(300)
    );
}

#[tokio::test]
async fn test_settings_drive_engine() {
    let config = load_config_str(
        "subscription:\n  default_publishing_interval_ms: 250\n  default_sampling_interval_ms: 100\n",
        ConfigFormat::Yaml,
    )
    .unwrap();
    let settings = EngineSettings {
        reconcile_interval: Duration::from_secs(3600),
        ..EngineSettings::from(&config)
    };
    let harness = TestHarness::with_settings("settings_drive_engine", settings);

    harness
        .add(Endpoints::plc(), Points::numeric(1), None, None)
        .await;
    harness.settle().await;

    assert_eq!(
        harness.transport.count_calls(|c| matches!(
            c,
            MockCall::CreateSubscription { publishing_interval, .. }
                if *publishing_interval == Duration::from_millis(250)
        )),
        1
    );
    assert_eq!(
        harness.transport.count_calls(|c| matches!(
            c,
            MockCall::AddItem { sampling_interval, .. }
                if *sampling_interval == Duration::from_millis(100)
        )),
        1
    );

    harness.shutdown().await;
}
