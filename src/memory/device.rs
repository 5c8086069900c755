// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Shared accelerator device pool.
//!
//! Every byte of device memory an artifact occupies is allocated through a
//! [`DevicePool`]. Loaders receive the pool via their load context; nothing
//! else in the process allocates or frees device memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accelerator backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// NVIDIA CUDA device
    Cuda,
    /// Apple Metal device (macOS only)
    Metal,
    /// No accelerator, host memory only
    #[default]
    Cpu,
}

impl DeviceKind {
    /// Whether this kind is a real accelerator with a constrained memory pool.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, DeviceKind::Cpu)
    }

    /// Parse a backend name as used in configuration.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cuda" | "gpu" => Some(DeviceKind::Cuda),
            "metal" | "mps" => Some(DeviceKind::Metal),
            "cpu" => Some(DeviceKind::Cpu),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cuda => write!(f, "CUDA"),
            DeviceKind::Metal => write!(f, "Metal"),
            DeviceKind::Cpu => write!(f, "CPU"),
        }
    }
}

/// Device configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Preferred backend
    pub kind: DeviceKind,
    /// Device ordinal
    pub device_index: usize,
    /// Capacity of the device pool in bytes
    pub capacity_bytes: u64,
    /// Ignore the configured accelerator and run on the host
    pub force_cpu: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            device_index: 0,
            capacity_bytes: 8 * 1024 * 1024 * 1024, // 8 GiB
            force_cpu: false,
        }
    }
}

impl DeviceConfig {
    /// Host-only configuration.
    pub fn cpu() -> Self {
        Self::default()
    }

    /// Single CUDA device with the given capacity.
    pub fn cuda(capacity_bytes: u64) -> Self {
        Self {
            kind: DeviceKind::Cuda,
            capacity_bytes,
            ..Default::default()
        }
    }

    /// The backend actually in use once `force_cpu` is applied.
    pub fn effective_kind(&self) -> DeviceKind {
        if self.force_cpu {
            DeviceKind::Cpu
        } else {
            self.kind
        }
    }
}

/// Device error types.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Out of device memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("Double free or unknown allocation id={0}")]
    DoubleFree(u64),

    #[error("Device unavailable: {0}")]
    Unavailable(String),
}

/// A single device allocation.
#[derive(Debug, Clone)]
pub struct DeviceAllocation {
    pub id: u64,
    pub size: u64,
}

/// Abstraction over the device's memory allocator.
///
/// `reserved_bytes` counts memory held by the allocator's cache, which is
/// always at least `allocated_bytes`. `reclaim` hands cached blocks back
/// to the device.
pub trait DeviceAllocator: Send + Sync {
    fn allocate(&self, size: u64) -> Result<DeviceAllocation, DeviceError>;
    fn deallocate(&self, allocation: &DeviceAllocation) -> Result<(), DeviceError>;
    fn allocated_bytes(&self) -> u64;
    fn reserved_bytes(&self) -> u64;
    fn peak_bytes(&self) -> u64;
    fn total_bytes(&self) -> u64;
    /// Release cached, unused memory back to the device. Returns bytes released.
    fn reclaim(&self) -> u64;
    /// Reset peak and cumulative statistics.
    fn reset_stats(&self);
}

// -- Simulated device (CPU fallback, tests, benches) --------------------------

struct SimState {
    allocations: HashMap<u64, u64>,
    allocated: u64,
    reserved: u64,
    peak: u64,
    cumulative: u64,
}

/// In-process allocator that models a caching device allocator.
///
/// Freed blocks stay reserved until [`DeviceAllocator::reclaim`] is called,
/// the way a framework caching allocator holds on to freed device memory.
pub struct SimulatedDevice {
    capacity: u64,
    next_id: AtomicU64,
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            next_id: AtomicU64::new(1),
            state: Mutex::new(SimState {
                allocations: HashMap::new(),
                allocated: 0,
                reserved: 0,
                peak: 0,
                cumulative: 0,
            }),
        }
    }

    /// Count of live (un-freed) allocations, for leak detection.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().allocations.len()
    }

    /// Total bytes ever allocated since the last stats reset.
    pub fn cumulative_bytes(&self) -> u64 {
        self.state.lock().cumulative
    }
}

impl DeviceAllocator for SimulatedDevice {
    fn allocate(&self, size: u64) -> Result<DeviceAllocation, DeviceError> {
        let mut s = self.state.lock();
        if s.allocated.checked_add(size).filter(|n| *n <= self.capacity).is_none() {
            return Err(DeviceError::OutOfMemory {
                requested: size,
                available: self.capacity - s.allocated,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        s.allocations.insert(id, size);
        s.allocated += size;
        s.reserved = s.reserved.max(s.allocated);
        s.peak = s.peak.max(s.allocated);
        s.cumulative += size;
        Ok(DeviceAllocation { id, size })
    }

    fn deallocate(&self, allocation: &DeviceAllocation) -> Result<(), DeviceError> {
        let mut s = self.state.lock();
        match s.allocations.remove(&allocation.id) {
            Some(size) => {
                s.allocated -= size;
                Ok(())
            }
            None => Err(DeviceError::DoubleFree(allocation.id)),
        }
    }

    fn allocated_bytes(&self) -> u64 {
        self.state.lock().allocated
    }

    fn reserved_bytes(&self) -> u64 {
        self.state.lock().reserved
    }

    fn peak_bytes(&self) -> u64 {
        self.state.lock().peak
    }

    fn total_bytes(&self) -> u64 {
        self.capacity
    }

    fn reclaim(&self) -> u64 {
        let mut s = self.state.lock();
        let released = s.reserved - s.allocated;
        s.reserved = s.allocated;
        released
    }

    fn reset_stats(&self) {
        let mut s = self.state.lock();
        s.peak = s.allocated;
        s.cumulative = 0;
    }
}

// -- Pool and RAII buffer -----------------------------------------------------

/// Handle to the shared device pool. Clones refer to the same device.
#[derive(Clone)]
pub struct DevicePool {
    kind: DeviceKind,
    name: String,
    allocator: Arc<dyn DeviceAllocator>,
}

impl DevicePool {
    pub fn new(kind: DeviceKind, name: impl Into<String>, allocator: Arc<dyn DeviceAllocator>) -> Self {
        Self {
            kind,
            name: name.into(),
            allocator,
        }
    }

    /// Build the pool described by `config`, backed by a simulated allocator.
    pub fn from_config(config: &DeviceConfig) -> Self {
        let kind = config.effective_kind();
        let name = match kind {
            DeviceKind::Cpu => "host".to_string(),
            other => format!("{}:{}", other, config.device_index),
        };
        Self::new(kind, name, Arc::new(SimulatedDevice::new(config.capacity_bytes)))
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allocator(&self) -> &Arc<dyn DeviceAllocator> {
        &self.allocator
    }

    /// Allocate `size` bytes on the device.
    pub fn allocate(&self, size: u64) -> Result<DeviceBuffer, DeviceError> {
        let allocation = self.allocator.allocate(size)?;
        Ok(DeviceBuffer {
            allocation: Some(allocation),
            allocator: self.allocator.clone(),
        })
    }
}

impl fmt::Debug for DevicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevicePool")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("allocated_bytes", &self.allocator.allocated_bytes())
            .finish()
    }
}

/// Device memory owned by an artifact; freed on drop.
pub struct DeviceBuffer {
    allocation: Option<DeviceAllocation>,
    allocator: Arc<dyn DeviceAllocator>,
}

impl DeviceBuffer {
    pub fn size(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.size).unwrap_or(0)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Some(alloc) = self.allocation.take() {
            if let Err(e) = self.allocator.deallocate(&alloc) {
                tracing::warn!(error = %e, "device buffer release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_device_kind_display_and_parse() {
        assert_eq!(DeviceKind::Cuda.to_string(), "CUDA");
        assert_eq!(DeviceKind::Metal.to_string(), "Metal");
        assert_eq!(DeviceKind::Cpu.to_string(), "CPU");
        assert_eq!(DeviceKind::parse(" CUDA "), Some(DeviceKind::Cuda));
        assert_eq!(DeviceKind::parse("mps"), Some(DeviceKind::Metal));
        assert_eq!(DeviceKind::parse("tpu"), None);
        assert!(!DeviceKind::Cpu.is_accelerator());
    }

    #[test]
    fn test_force_cpu_overrides_kind() {
        let mut config = DeviceConfig::cuda(4 * MIB);
        assert_eq!(config.effective_kind(), DeviceKind::Cuda);
        config.force_cpu = true;
        assert_eq!(config.effective_kind(), DeviceKind::Cpu);
        assert_eq!(DevicePool::from_config(&config).name(), "host");
    }

    #[test]
    fn test_allocate_beyond_capacity_is_out_of_memory() {
        let device = SimulatedDevice::new(1024);
        let _a = device.allocate(512).unwrap();
        let err = device.allocate(1024).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::OutOfMemory { requested: 1024, available: 512 }
        ));
    }

    #[test]
    fn test_oversized_request_does_not_overflow() {
        let dev = SimulatedDevice::new(1024);
        let first = dev.allocate(10).unwrap();
        match dev.allocate(u64::MAX) {
            Err(DeviceError::OutOfMemory { requested, available }) => {
                assert_eq!(requested, u64::MAX);
                assert_eq!(available, 1014);
            }
            other => panic!("expected OutOfMemory, got {:?}", other),
        }
        assert_eq!(dev.allocated_bytes(), 10);
        dev.deallocate(&first).unwrap();
        assert_eq!(dev.allocated_bytes(), 0);
    }

    #[test]
    fn test_double_free_detected() {
        let device = SimulatedDevice::new(4096);
        let a = device.allocate(256).unwrap();
        device.deallocate(&a).unwrap();
        assert!(matches!(device.deallocate(&a), Err(DeviceError::DoubleFree(_))));
    }

    #[test]
    fn test_freed_memory_stays_reserved_until_reclaim() {
        let device = SimulatedDevice::new(10 * MIB);
        let a = device.allocate(4 * MIB).unwrap();
        device.deallocate(&a).unwrap();
        assert_eq!(device.allocated_bytes(), 0);
        assert_eq!(device.reserved_bytes(), 4 * MIB);

        assert_eq!(device.reclaim(), 4 * MIB);
        assert_eq!(device.reserved_bytes(), 0);
        assert_eq!(device.reclaim(), 0);
    }

    #[test]
    fn test_reset_stats_clears_peak_and_cumulative() {
        let device = SimulatedDevice::new(10 * MIB);
        let a = device.allocate(6 * MIB).unwrap();
        let b = device.allocate(2 * MIB).unwrap();
        device.deallocate(&a).unwrap();
        assert_eq!(device.peak_bytes(), 8 * MIB);
        assert_eq!(device.cumulative_bytes(), 8 * MIB);

        device.reset_stats();
        assert_eq!(device.peak_bytes(), 2 * MIB);
        assert_eq!(device.cumulative_bytes(), 0);
        device.deallocate(&b).unwrap();
    }

    #[test]
    fn test_buffer_drop_releases_allocation() {
        let device = Arc::new(SimulatedDevice::new(4096));
        let pool = DevicePool::new(DeviceKind::Cuda, "cuda:0", device.clone());
        let buffer = pool.allocate(1024).unwrap();
        assert_eq!(buffer.size(), 1024);
        assert_eq!(device.live_allocations(), 1);
        drop(buffer);
        assert_eq!(device.live_allocations(), 0);
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn test_cycles_leave_no_drift() {
        let device = SimulatedDevice::new(MIB);
        for _ in 0..1000 {
            let a = device.allocate(1024).unwrap();
            device.deallocate(&a).unwrap();
        }
        assert_eq!(device.allocated_bytes(), 0);
        assert_eq!(device.live_allocations(), 0);
    }
}
