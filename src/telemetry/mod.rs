//! Telemetry module for Hub-CORE.
//!
//! Provides structured logging, lifecycle spans, and metrics recording.

mod logging;
pub mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::LoadOutcomeLabel;
pub use spans::{LifecycleSpan, SpanExt};
