// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Loader capability and the weights-file loader.
//!
//! A loader turns an [`ArtifactDescriptor`] into a live [`Artifact`] handle.
//! Device memory is obtained only through the [`LoadContext`] pool.

use std::any::Any;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use memmap2::Mmap;
use thiserror::Error;

use super::registry::{ArtifactCategory, ArtifactDescriptor};
use crate::memory::{DeviceBuffer, DeviceError, DeviceKind, DevicePool};

#[derive(Error, Debug)]
pub enum LoadError {
    /// The device rejected an allocation while the artifact was being built.
    #[error("Device memory exhausted: requested {requested} bytes, available {available} bytes")]
    ResourceExhausted { requested: u64, available: u64 },

    #[error("Weights path not allowed: {0}")]
    PathNotAllowed(PathBuf),

    #[error("Weights file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid weights: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load failed: {0}")]
    Failed(String),
}

impl From<DeviceError> for LoadError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::OutOfMemory { requested, available } => {
                LoadError::ResourceExhausted { requested, available }
            }
            other => LoadError::Failed(other.to_string()),
        }
    }
}

/// A live, loaded artifact. Owned by the lifecycle manager while resident;
/// callers only ever see shared borrows of it.
pub trait Artifact: Any + Send + Sync {
    /// Registry identity this handle was loaded for.
    fn id(&self) -> &str;

    /// Device memory held by this handle.
    fn device_bytes(&self) -> u64;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Artifact {
    /// Downcast to the concrete handle type produced by a loader.
    pub fn downcast_ref<T: Artifact>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Mediated access to the device for a single load.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pool: DevicePool,
}

impl LoadContext {
    pub fn new(pool: DevicePool) -> Self {
        Self { pool }
    }

    pub fn device(&self) -> DeviceKind {
        self.pool.kind()
    }

    pub fn pool(&self) -> &DevicePool {
        &self.pool
    }
}

/// Strategy that produces a live artifact from its descriptor.
///
/// Implementations must not leave device memory allocated when they return an
/// error; holding allocations in [`DeviceBuffer`]s makes that automatic.
#[async_trait]
pub trait ArtifactLoader: Send + Sync {
    async fn load(
        &self,
        descriptor: &ArtifactDescriptor,
        ctx: &LoadContext,
    ) -> Result<Arc<dyn Artifact>, LoadError>;
}

/// Allowed directories for weight files.
const ALLOWED_DIRS: &[&str] = &["models", "weights"];

/// Validated weights path within allowed directories.
#[derive(Debug, Clone)]
pub struct WeightsPath {
    path: PathBuf,
}

impl WeightsPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

/// Memory-mapped weights file (zero-copy).
pub struct MappedWeights {
    mmap: Mmap,
}

impl MappedWeights {
    pub fn open(path: &WeightsPath) -> Result<Self, LoadError> {
        let file = File::open(path.as_path())?;
        // SAFETY: weight files are opened read-only and never modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Artifact produced by [`WeightsLoader`].
pub struct MappedArtifact {
    id: String,
    category: ArtifactCategory,
    weights: MappedWeights,
    buffer: Option<DeviceBuffer>,
}

impl MappedArtifact {
    pub fn category(&self) -> ArtifactCategory {
        self.category
    }

    pub fn weights(&self) -> &[u8] {
        self.weights.as_bytes()
    }

    /// Whether the artifact lives on the accelerator or runs on the host path.
    pub fn on_device(&self) -> bool {
        self.buffer.is_some()
    }
}

impl Artifact for MappedArtifact {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_bytes(&self) -> u64 {
        self.buffer.as_ref().map(DeviceBuffer::size).unwrap_or(0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Loads artifacts from weight files under a base directory.
///
/// On an accelerator the descriptor's footprint is reserved from the device
/// pool; on the host the mapped weights are used directly.
pub struct WeightsLoader {
    base_path: PathBuf,
}

impl WeightsLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Validate that `relative_path` resolves inside an allowed directory.
    pub fn validate_path(&self, relative_path: &Path) -> Result<WeightsPath, LoadError> {
        let full_path = self.base_path.join(relative_path);
        let canonical = full_path
            .canonicalize()
            .map_err(|_| LoadError::NotFound(full_path.clone()))?;

        let is_allowed = ALLOWED_DIRS.iter().any(|dir| {
            self.base_path
                .join(dir)
                .canonicalize()
                .map(|allowed| canonical.starts_with(&allowed))
                .unwrap_or(false)
        });

        if !is_allowed {
            return Err(LoadError::PathNotAllowed(canonical));
        }

        Ok(WeightsPath { path: canonical })
    }
}

#[async_trait]
impl ArtifactLoader for WeightsLoader {
    async fn load(
        &self,
        descriptor: &ArtifactDescriptor,
        ctx: &LoadContext,
    ) -> Result<Arc<dyn Artifact>, LoadError> {
        let relative = descriptor.weights().ok_or_else(|| {
            LoadError::InvalidFormat(format!("artifact {} has no weights path", descriptor.id()))
        })?;
        let path = self.validate_path(relative)?;

        let weights = tokio::task::spawn_blocking(move || MappedWeights::open(&path))
            .await
            .map_err(|e| LoadError::Failed(format!("weights mapping task failed: {}", e)))??;
        if weights.is_empty() {
            return Err(LoadError::InvalidFormat(format!(
                "weights file for {} is empty",
                descriptor.id()
            )));
        }

        let buffer = if ctx.device().is_accelerator() {
            Some(ctx.pool().allocate(descriptor.footprint_bytes())?)
        } else {
            None
        };

        tracing::debug!(
            artifact = descriptor.id(),
            weights_bytes = weights.len(),
            on_device = buffer.is_some(),
            "weights mapped"
        );

        Ok(Arc::new(MappedArtifact {
            id: descriptor.id().to_string(),
            category: descriptor.category(),
            weights,
            buffer,
        }))
    }
}
