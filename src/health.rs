//! Health check support for Hub-CORE.
//!
//! Summarizes device health from a fresh memory reading and the manager's
//! resident set.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::memory::DeviceKind;
use crate::models::LifecycleManager;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub device: DeviceKind,
    pub resident: Vec<String>,
    pub free_bytes: u64,
    /// Probe diagnostic when the memory reading failed.
    pub note: Option<String>,
    pub uptime_secs: u64,
}

/// Aggregates health information from the lifecycle manager.
pub struct HealthChecker {
    start_time: Instant,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Generate full health report.
    pub fn report(&self, manager: &LifecycleManager) -> HealthReport {
        let snapshot = manager.snapshot();
        let resident = manager.resident_ids();
        let state = if snapshot.note.is_some() {
            HealthState::Unhealthy
        } else {
            compute_state(
                resident.is_empty(),
                snapshot.free_bytes,
                manager.config().thresholds.smallest(),
            )
        };

        HealthReport {
            state,
            device: snapshot.device,
            resident,
            free_bytes: snapshot.free_bytes,
            note: snapshot.note,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

/// Idle with less free memory than any category needs means nothing can load.
fn compute_state(idle: bool, free_bytes: u64, smallest_threshold: u64) -> HealthState {
    if idle && free_bytes < smallest_threshold {
        return HealthState::Degraded;
    }
    HealthState::Healthy
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_without_headroom_is_degraded() {
        assert_eq!(compute_state(true, 100, 200), HealthState::Degraded);
        assert_eq!(compute_state(true, 200, 200), HealthState::Healthy);
        assert_eq!(compute_state(false, 0, 200), HealthState::Healthy);
    }

    #[test]
    fn test_report_serializes_state() {
        let report = HealthReport {
            state: HealthState::Degraded,
            device: DeviceKind::Cuda,
            resident: vec![],
            free_bytes: 42,
            note: None,
            uptime_secs: 1,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "Degraded");
        assert_eq!(json["device"], "cuda");
    }
}
