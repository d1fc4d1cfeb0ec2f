//! Integration tests for logging system

use core_runtime::logging::{init_logging, strip_path, LogFormat, LogLevel, LoggingConfig};

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_init_logging_only_once() {
    // Global subscriber can be installed once per process.
    let first = init_logging(LoggingConfig::default().with_format(LogFormat::Compact));
    assert!(first.is_ok());

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err());

    tracing::info!(file = %strip_path("/music/a.flac"), "logging initialized");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/log/app.log"), "app.log");
    assert_eq!(strip_path("D:\\data\\file.txt"), "file.txt");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_level_ordering() {
    assert!(LogLevel::Trace < LogLevel::Debug);
    assert!(LogLevel::Warn < LogLevel::Error);
    assert_eq!(LogLevel::Info.to_string(), "info");
}
