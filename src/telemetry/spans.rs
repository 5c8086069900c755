//! Span utilities and extension traits for lifecycle tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for lifecycle spans.
pub struct LifecycleSpan;

impl LifecycleSpan {
    /// Span for a manager transition (`ensure_loaded`, `unload`, ...).
    ///
    /// Fields:
    /// - `operation`: the transition being performed
    /// - `artifact`: artifact identity
    /// - `status`: filled in by `SpanExt::record_result`
    /// - `error.message`: filled in on error
    /// - `load_ms`: filled in after a successful load
    pub fn new(operation: &str, artifact: &str) -> Span {
        info_span!(
            "artifact_lifecycle",
            operation = %operation,
            artifact = %artifact,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            load_ms = tracing::field::Empty,
        )
    }

    /// Span covering a scoped lease from acquisition to release.
    pub fn lease(lease_id: &str, artifact: &str) -> Span {
        info_span!(
            "artifact_lease",
            lease_id = %lease_id,
            artifact = %artifact,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
