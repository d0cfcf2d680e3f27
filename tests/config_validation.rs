//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bidcos_engine::config::{EngineConfig, LoggingConfig, TimingConfig, TransportConfig};
use serial_test::serial;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = EngineConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_zero_dispatches_rejected() {
    let config = EngineConfig::default_with_overrides(|c| {
        c.executor.max_concurrent_dispatches = 0;
    });
    let errors = config.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("must be greater than 0"));
}

#[test]
fn test_excessive_dispatches_rejected() {
    let config = EngineConfig::default_with_overrides(|c| {
        c.executor.max_concurrent_dispatches = 4096;
    });
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("too large: 4096")));
}

#[test]
fn test_poll_longer_than_ttl_rejected() {
    let timing = TimingConfig {
        packet_poll: Duration::from_millis(600),
        queue_poll: Duration::ZERO,
        ..TimingConfig::default()
    };
    let errors = timing.validate();
    assert!(errors.iter().any(|e| e.contains("exceeds packet TTL")));
    assert!(errors.iter().any(|e| e.contains("Queue watcher poll interval must be longer")));
}

#[test]
fn test_queue_ttl_must_cover_first_resend() {
    let timing = TimingConfig {
        queue_ttl: Duration::from_millis(400),
        queue_poll: Duration::from_millis(100),
        ..TimingConfig::default()
    };
    let errors = timing.validate();
    assert_eq!(errors, vec!["Queue TTL (400ms) shorter than the first resend delay (490ms)".to_string()]);
}

#[test]
fn test_zero_resend_cycle_rejected() {
    let timing = TimingConfig {
        resend_ticks: 0,
        ..TimingConfig::default()
    };
    assert!(timing
        .validate()
        .iter()
        .any(|e| e.contains("Resend cycle must be longer than 0ms")));
}

#[test]
fn test_transport_prefixes() {
    let ambiguous = TransportConfig {
        frame_prefix: Some('7'),
        ..TransportConfig::default()
    };
    assert!(ambiguous.validate()[0].contains("hex digit"));

    let unicode = TransportConfig {
        frame_prefix: Some('é'),
        send_prefix: "Äs".to_string(),
    };
    let errors = unicode.validate();
    assert_eq!(errors.len(), 2);

    let bare = TransportConfig {
        frame_prefix: None,
        send_prefix: String::new(),
    };
    assert!(bare.validate().is_empty());
}

#[test]
fn test_logging_name_limits() {
    let empty = LoggingConfig {
        app_name: String::new(),
        ..LoggingConfig::default()
    };
    assert!(empty.validate()[0].contains("cannot be empty"));

    let long = LoggingConfig {
        app_name: "x".repeat(65),
        ..LoggingConfig::default()
    };
    assert!(long.validate()[0].contains("too long: 65"));
}

#[test]
fn test_multiple_errors_reported_together() {
    let config = EngineConfig::default_with_overrides(|c| {
        c.executor.max_concurrent_dispatches = 0;
        c.logging.app_name = String::new();
        c.timing.pop_wait_tick = Duration::ZERO;
    });
    assert_eq!(config.validate().len(), 3);

    let message = config.validate_strict().unwrap_err().to_string();
    assert!(message.contains("Configuration validation failed"));
    assert!(message.contains("Pop-wait tick"));
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = EngineConfig::from_toml(
        r#"
[timing]
queue_ttl = 2000

[transport]
frame_prefix = "A"

[logging]
log_level = "debug"
json_format = true
"#,
    )
    .unwrap();

    assert_eq!(config.timing.queue_ttl, Duration::from_millis(2000));
    assert_eq!(config.timing.packet_ttl, Duration::from_millis(500));
    assert_eq!(config.transport.send_prefix, "As");
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.logging.json_format);
    assert_eq!(config.executor.max_concurrent_dispatches, 16);
    assert!(config.validate().is_empty());
}

#[test]
fn test_invalid_toml_reported() {
    let err = EngineConfig::from_toml("[logging]\nlog_level = \"loud\"").unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_example_config_roundtrip() {
    let text = EngineConfig::example_config();
    let parsed = EngineConfig::from_toml(&text).unwrap();
    assert_eq!(parsed.timing, TimingConfig::default());
    assert_eq!(parsed.transport.frame_prefix, Some('A'));
}

#[test]
fn test_save_and_load_file() {
    let path = std::env::temp_dir().join(format!("bidcos-engine-{}.toml", std::process::id()));
    let config = EngineConfig::default_with_overrides(|c| {
        c.timing.long_keep_alive = Duration::from_millis(7500);
    });
    config.save_to_file(&path).unwrap();
    let loaded = EngineConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.timing.long_keep_alive, Duration::from_millis(7500));

    assert!(EngineConfig::from_file(&path).is_err());
}

#[test]
#[serial]
fn test_env_overrides() {
    std::env::set_var("BIDCOS_QUEUE_TTL_MS", "3000");
    std::env::set_var("BIDCOS_PACKET_TTL_MS", "not-a-number");
    std::env::set_var("BIDCOS_MAX_DISPATCHES", "4");
    std::env::set_var("BIDCOS_SEND_PREFIX", "As");
    let config = EngineConfig::from_env().unwrap();
    std::env::remove_var("BIDCOS_QUEUE_TTL_MS");
    std::env::remove_var("BIDCOS_PACKET_TTL_MS");
    std::env::remove_var("BIDCOS_MAX_DISPATCHES");
    std::env::remove_var("BIDCOS_SEND_PREFIX");

    assert_eq!(config.timing.queue_ttl, Duration::from_millis(3000));
    assert_eq!(config.timing.packet_ttl, Duration::from_millis(500));
    assert_eq!(config.executor.max_concurrent_dispatches, 4);
    assert_eq!(config.transport.send_prefix, "As");
}

#[test]
#[serial]
fn test_env_defaults_without_variables() {
    std::env::remove_var("BIDCOS_QUEUE_TTL_MS");
    let config = EngineConfig::from_env().unwrap();
    assert_eq!(config.timing.queue_ttl, Duration::from_millis(1000));
}
