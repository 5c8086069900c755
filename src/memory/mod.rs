// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Accelerator memory module.
//!
//! Provides the shared device pool and the memory probe used for admission.

mod device;
mod probe;

pub use device::{
    DeviceAllocation, DeviceAllocator, DeviceBuffer, DeviceConfig, DeviceError, DeviceKind,
    DevicePool, SimulatedDevice,
};
#[cfg(feature = "cuda")]
pub use probe::CudaProbe;
pub use probe::{snapshot, MemoryProbe, MemoryReading, MemorySnapshot, PoolProbe, ProbeError};
