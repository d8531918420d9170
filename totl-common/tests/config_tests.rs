//! Configuration loading and policy defaults

use std::io::Write;
use totl_common::config::{load_config, parse_config, MessagingProvider, TomlConfig};

#[test]
fn test_defaults_without_file() {
    let config = TomlConfig::default();
    assert_eq!(config.port, 5740);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.messaging.provider, MessagingProvider::Simulated);
    assert_eq!(config.messaging.brand_name, "Totl");
    assert!(config.geocoding.api_key.is_none());
    assert_eq!(config.policy.max_candidates, 3);
    assert!((config.policy.price_band - 1.10).abs() < f64::EPSILON);
    assert!((config.policy.coinsurance_rate - 0.20).abs() < f64::EPSILON);
}

#[test]
fn test_partial_toml_keeps_remaining_defaults() {
    let config = parse_config(
        r#"
        port = 6000

        [messaging]
        provider = "twilio"
        account_sid = "AC123"

        [policy]
        max_candidates = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.port, 6000);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.messaging.provider, MessagingProvider::Twilio);
    assert_eq!(config.messaging.account_sid.as_deref(), Some("AC123"));
    assert_eq!(config.messaging.brand_name, "Totl");
    assert_eq!(config.policy.max_candidates, 5);
    assert!((config.policy.negligible_oop - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_invalid_policy_rejected() {
    let err = parse_config("[policy]\nprice_band = 0.9\n").unwrap_err();
    assert!(err.to_string().contains("price_band"));

    let err = parse_config("[policy]\ncoinsurance_rate = 1.5\n").unwrap_err();
    assert!(err.to_string().contains("coinsurance_rate"));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let err = parse_config("port = \"not a number\"").unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
fn test_distance_ceiling_tiers() {
    let policy = TomlConfig::default().policy;
    assert_eq!(policy.distance_ceiling(0.0), 10.0);
    assert_eq!(policy.distance_ceiling(500.0), 10.0);
    assert_eq!(policy.distance_ceiling(500.01), 15.0);
    assert_eq!(policy.distance_ceiling(1000.0), 15.0);
    assert_eq!(policy.distance_ceiling(1000.01), 25.0);
}

#[test]
fn test_load_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database_path = \"/tmp/totl-test.db\"\nport = 7001").unwrap();

    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.port, 7001);
    assert_eq!(
        config.resolved_database_path(),
        std::path::PathBuf::from("/tmp/totl-test.db")
    );
}

#[test]
fn test_load_missing_explicit_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(load_config(Some(&missing)).is_err());
}
