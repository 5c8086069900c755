// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Artifact management module for Hub-CORE.
//!
//! Handles the artifact registry, loaders, the single-residency lifecycle
//! manager, and scoped leases.

mod lease;
mod loader;
mod manager;
mod registry;
mod status;

pub use lease::ArtifactLease;
pub use loader::{
    Artifact, ArtifactLoader, LoadContext, LoadError, MappedArtifact, MappedWeights,
    WeightsLoader, WeightsPath,
};
pub use manager::{LifecycleError, LifecycleManager, ManagerConfig, ResidentArtifact};
pub use registry::{
    AdmissionThresholds, ArtifactCategory, ArtifactDescriptor, ArtifactRegistry, ArtifactSpec,
    RegistryBuilder, RegistryError,
};
pub use status::{
    ArtifactState, ArtifactStatus, ClearReport, LoadOutcome, LoadReport, ManagerStatus,
};
