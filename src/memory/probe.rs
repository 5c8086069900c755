// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Accelerator memory probe.
//!
//! Point-in-time reads of device memory. Admission decisions compare against
//! the measured free memory, never against a bookkeeping ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::device::{DeviceKind, DevicePool};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Measurement failed: {0}")]
    Measurement(String),
}

/// Raw values reported by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub allocated_bytes: u64,
    pub reserved_bytes: u64,
    pub total_bytes: u64,
    /// No accelerator: memory is not a constraint.
    pub unconstrained: bool,
}

/// Source of memory readings for one device.
pub trait MemoryProbe: Send + Sync {
    fn device(&self) -> DeviceKind;
    fn measure(&self) -> Result<MemoryReading, ProbeError>;
}

/// Point-in-time memory state. Never cached beyond the call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub device: DeviceKind,
    pub allocated_bytes: u64,
    pub reserved_bytes: u64,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub unconstrained: bool,
    /// Set when the measurement failed and the fields are zeroed.
    pub note: Option<String>,
    pub taken_at: DateTime<Utc>,
}

impl MemorySnapshot {
    fn from_reading(device: DeviceKind, reading: MemoryReading) -> Self {
        let free_bytes = if reading.unconstrained {
            u64::MAX
        } else {
            reading.total_bytes.saturating_sub(reading.allocated_bytes)
        };
        Self {
            device,
            allocated_bytes: reading.allocated_bytes,
            reserved_bytes: reading.reserved_bytes,
            total_bytes: reading.total_bytes,
            free_bytes,
            unconstrained: reading.unconstrained,
            note: None,
            taken_at: Utc::now(),
        }
    }

    fn failed(device: DeviceKind, note: String) -> Self {
        Self {
            device,
            allocated_bytes: 0,
            reserved_bytes: 0,
            total_bytes: 0,
            free_bytes: 0,
            unconstrained: false,
            note: Some(note),
            taken_at: Utc::now(),
        }
    }

    /// Fraction of total memory allocated (0.0 when total is unknown).
    pub fn utilization(&self) -> f64 {
        if self.total_bytes == 0 || self.unconstrained {
            return 0.0;
        }
        self.allocated_bytes as f64 / self.total_bytes as f64
    }

    /// One-line human readable summary for log output.
    pub fn summary(&self) -> String {
        if let Some(note) = &self.note {
            return format!("{} memory unavailable: {}", self.device, note);
        }
        if self.unconstrained {
            return format!("{} mode - memory unconstrained", self.device);
        }
        format!(
            "{} memory: {:.2}GB/{:.2}GB allocated, {:.2}GB cached, {:.2}GB free",
            self.device,
            self.allocated_bytes as f64 / GIB,
            self.total_bytes as f64 / GIB,
            self.reserved_bytes as f64 / GIB,
            self.free_bytes as f64 / GIB,
        )
    }
}

/// Take a snapshot. Never fails: measurement errors yield a zeroed snapshot
/// carrying a diagnostic note.
pub fn snapshot(probe: &dyn MemoryProbe) -> MemorySnapshot {
    match probe.measure() {
        Ok(reading) => MemorySnapshot::from_reading(probe.device(), reading),
        Err(e) => {
            tracing::warn!(device = %probe.device(), error = %e, "memory probe failed");
            MemorySnapshot::failed(probe.device(), e.to_string())
        }
    }
}

/// Probe reading the statistics of a [`DevicePool`]'s allocator.
pub struct PoolProbe {
    pool: DevicePool,
}

impl PoolProbe {
    pub fn new(pool: DevicePool) -> Self {
        Self { pool }
    }
}

impl MemoryProbe for PoolProbe {
    fn device(&self) -> DeviceKind {
        self.pool.kind()
    }

    fn measure(&self) -> Result<MemoryReading, ProbeError> {
        let allocator = self.pool.allocator();
        Ok(MemoryReading {
            allocated_bytes: allocator.allocated_bytes(),
            reserved_bytes: allocator.reserved_bytes(),
            total_bytes: allocator.total_bytes(),
            unconstrained: !self.pool.kind().is_accelerator(),
        })
    }
}

/// Probe reading free/total memory from the CUDA driver.
#[cfg(feature = "cuda")]
pub struct CudaProbe {
    device: std::sync::Arc<cudarc::driver::CudaDevice>,
}

#[cfg(feature = "cuda")]
impl CudaProbe {
    pub fn new(ordinal: usize) -> Result<Self, ProbeError> {
        let device = cudarc::driver::CudaDevice::new(ordinal)
            .map_err(|e| ProbeError::Unavailable(e.to_string()))?;
        Ok(Self { device })
    }
}

#[cfg(feature = "cuda")]
impl MemoryProbe for CudaProbe {
    fn device(&self) -> DeviceKind {
        DeviceKind::Cuda
    }

    fn measure(&self) -> Result<MemoryReading, ProbeError> {
        self.device
            .bind_to_thread()
            .map_err(|e| ProbeError::Measurement(e.to_string()))?;
        let (free, total) = cudarc::driver::result::mem_get_info()
            .map_err(|e| ProbeError::Measurement(e.to_string()))?;
        let allocated = (total - free) as u64;
        Ok(MemoryReading {
            allocated_bytes: allocated,
            reserved_bytes: allocated,
            total_bytes: total as u64,
            unconstrained: false,
        })
    }
}
