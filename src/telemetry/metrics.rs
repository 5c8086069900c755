//! Lifecycle metrics via the `metrics` crate facade.
//!
//! No exporter is installed here; the hosting process decides where the
//! facade's recorder sends values. Without a recorder these calls are no-ops.

use std::time::Duration;

/// Outcome label for load attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcomeLabel {
    Loaded,
    Reused,
    UnknownArtifact,
    InsufficientMemory,
    ResourceExhausted,
    LoadFailed,
}

impl LoadOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadOutcomeLabel::Loaded => "loaded",
            LoadOutcomeLabel::Reused => "reused",
            LoadOutcomeLabel::UnknownArtifact => "unknown_artifact",
            LoadOutcomeLabel::InsufficientMemory => "insufficient_memory",
            LoadOutcomeLabel::ResourceExhausted => "resource_exhausted",
            LoadOutcomeLabel::LoadFailed => "load_failed",
        }
    }
}

/// Record one `ensure_loaded` outcome.
pub fn record_load(artifact: &str, outcome: LoadOutcomeLabel, duration: Duration) {
    metrics::counter!(
        "hub_core_loads_total",
        "artifact" => artifact.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    if outcome == LoadOutcomeLabel::Loaded {
        metrics::histogram!("hub_core_load_seconds", "artifact" => artifact.to_string())
            .record(duration.as_secs_f64());
    }
}

/// Record an artifact leaving the resident set.
pub fn record_unload(artifact: &str) {
    metrics::counter!("hub_core_unloads_total", "artifact" => artifact.to_string()).increment(1);
}

/// Record a force-clear pass and the device state after it.
pub fn record_force_clear(reclaimed_bytes: u64) {
    metrics::counter!("hub_core_force_clears_total").increment(1);
    metrics::counter!("hub_core_reclaimed_bytes_total").increment(reclaimed_bytes);
}

/// Current device allocation.
pub fn record_device_allocated(bytes: u64) {
    metrics::gauge!("hub_core_device_allocated_bytes").set(bytes as f64);
}

/// Number of artifacts resident (0 or 1).
pub fn record_resident_count(count: usize) {
    metrics::gauge!("hub_core_resident_artifacts").set(count as f64);
}
