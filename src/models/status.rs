// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Reports returned by lifecycle operations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::registry::ArtifactCategory;
use crate::memory::{DeviceKind, MemorySnapshot};

/// Per-identity lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Absent,
    Loading,
    Resident,
}

/// Successful `ensure_loaded` result.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub artifact: String,
    /// The artifact was already resident; nothing was loaded.
    pub reused: bool,
    /// Zero when `reused`.
    pub load_time: Duration,
    /// Memory state after the call.
    pub memory: MemorySnapshot,
}

/// Wire shape of a load attempt: `{loaded, load_time, memory_used, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub artifact: String,
    pub loaded: bool,
    pub load_time_secs: f64,
    pub memory_used_bytes: u64,
    pub error: Option<String>,
    /// Whether retrying later may succeed.
    pub retryable: bool,
}

/// Result of a force-clear pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    /// Resident artifacts released.
    pub released: usize,
    /// Cached device bytes handed back to the device.
    pub reclaimed_bytes: u64,
}

/// Per-artifact entry in [`ManagerStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStatus {
    pub id: String,
    pub category: ArtifactCategory,
    pub source: String,
    pub state: ArtifactState,
    pub loaded: bool,
    pub footprint_bytes: u64,
    pub threshold_bytes: u64,
    pub loaded_at: Option<DateTime<Utc>>,
    pub load_time_secs: Option<f64>,
}

/// Full manager status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub device: DeviceKind,
    pub device_name: String,
    pub accelerator: bool,
    pub resident: Vec<String>,
    pub loading: Option<String>,
    pub memory: MemorySnapshot,
    pub budget_bytes: u64,
    pub artifacts: Vec<ArtifactStatus>,
}

impl ManagerStatus {
    pub fn artifact(&self, id: &str) -> Option<&ArtifactStatus> {
        self.artifacts.iter().find(|a| a.id == id)
    }
}
