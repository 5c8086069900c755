//! Telemetry module tests for Hub-CORE.

use std::path::PathBuf;
use std::time::Duration;

use hub_core::telemetry::metrics::{
    record_device_allocated, record_force_clear, record_load, record_resident_count,
    record_unload,
};
use hub_core::telemetry::{LifecycleSpan, LoadOutcomeLabel, LogConfig, LogError, LogFormat, SpanExt};
use tracing::Span;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_with_output_path() {
    let config = LogConfig {
        format: LogFormat::Json,
        level: "hub_core=trace".to_string(),
        output_path: Some(PathBuf::from("/tmp/hub-core.log")),
    };
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/hub-core.log")));
}

#[test]
fn log_error_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("Invalid log filter"));
    assert!(error.to_string().contains("bad filter"));
    assert!(LogError::AlreadyInitialized
        .to_string()
        .contains("already initialized"));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_records_both_outcomes() {
    let span = Span::none();
    span.record_result(&Ok::<i32, &str>(42));
    span.record_result(&Err::<i32, &str>("admission refused"));
}

#[test]
fn lifecycle_spans_create_without_panic() {
    // Without a subscriber, spans are disabled by default.
    let span = LifecycleSpan::new("ensure_loaded", "generative_art");
    let _guard = span.enter();
    let lease = LifecycleSpan::lease("6f1c", "blockchain");
    let _lease_guard = lease.enter();
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn outcome_labels_are_snake_case() {
    assert_eq!(LoadOutcomeLabel::InsufficientMemory.as_str(), "insufficient_memory");
    assert_eq!(LoadOutcomeLabel::Reused.as_str(), "reused");
}

#[test]
fn metrics_record_without_recorder() {
    record_load("generative_art", LoadOutcomeLabel::Loaded, Duration::from_millis(1200));
    record_load("generative_art", LoadOutcomeLabel::Reused, Duration::ZERO);
    record_load("blockchain", LoadOutcomeLabel::LoadFailed, Duration::ZERO);
    record_unload("generative_art");
    record_force_clear(2500 * 1024 * 1024);
    record_device_allocated(0);
    record_resident_count(0);
}

#[test]
fn metrics_record_extreme_values() {
    record_force_clear(u64::MAX);
    record_device_allocated(u64::MAX);
    record_resident_count(usize::MAX);
}
