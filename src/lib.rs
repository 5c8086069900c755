//! Hub-CORE
//!
//! Lifecycle manager for large generative artifacts sharing one
//! memory-constrained accelerator.
//!
//! # Guarantees
//!
//! - **Exclusive**: at most one artifact is resident on the device
//! - **Admitted**: loads proceed only with enough measured free memory
//! - **Reclaimed**: every unload hands cached device memory back
//! - **Scoped**: leased artifacts are unloaded on every exit path
//!
//! # Layout
//!
//! - [`memory`]: device pool and memory probe
//! - [`models`]: registry, loaders, lifecycle manager, leases
//! - [`telemetry`]: logging, spans, metrics
//! - [`config`]: `HUB_CORE_*` environment configuration

pub mod cli;
pub mod config;
pub mod health;
pub mod memory;
pub mod models;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use health::{HealthChecker, HealthReport};
use memory::{DeviceConfig, DevicePool, MemoryProbe, PoolProbe};
use models::{
    ArtifactRegistry, ArtifactSpec, LifecycleManager, ManagerConfig, RegistryError, WeightsLoader,
};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub base_path: PathBuf,
    pub device: DeviceConfig,
    pub manager: ManagerConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            device: DeviceConfig::default(),
            manager: ManagerConfig::default(),
        }
    }
}

impl HubConfig {
    pub fn from_env(env: &config::EnvConfig) -> Self {
        Self {
            base_path: env.base_path.clone(),
            device: env.device.clone(),
            manager: ManagerConfig {
                thresholds: env.thresholds,
                budget_bytes: env.memory_budget,
            },
        }
    }
}

/// The Hub-CORE instance: one device, one manager.
pub struct Hub {
    config: HubConfig,
    manager: LifecycleManager,
    health: HealthChecker,
}

impl Hub {
    /// Create a hub serving the default artifact set from weight files
    /// under `config.base_path`.
    pub fn new(config: HubConfig) -> Result<Self, RegistryError> {
        let registry = ArtifactRegistry::builder()
            .with_loader_for_all(Arc::new(WeightsLoader::new(config.base_path.clone())))
            .with_artifacts(ArtifactSpec::defaults())
            .build()?;
        Ok(Self::with_registry(config, registry))
    }

    /// Create a hub serving a caller-supplied registry.
    pub fn with_registry(config: HubConfig, registry: ArtifactRegistry) -> Self {
        let pool = DevicePool::from_config(&config.device);
        let probe = select_probe(&config.device, &pool);
        tracing::info!(
            device = %pool.kind(),
            name = pool.name(),
            artifacts = registry.len(),
            "hub initialized"
        );
        let manager =
            LifecycleManager::with_probe(Arc::new(registry), pool, probe, config.manager.clone());

        Self {
            config,
            manager,
            health: HealthChecker::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    pub fn health(&self) -> HealthReport {
        self.health.report(&self.manager)
    }
}

#[cfg(feature = "cuda")]
fn select_probe(device: &DeviceConfig, pool: &DevicePool) -> Arc<dyn MemoryProbe> {
    if device.effective_kind() == memory::DeviceKind::Cuda {
        match memory::CudaProbe::new(device.device_index) {
            Ok(probe) => return Arc::new(probe),
            Err(e) => {
                tracing::warn!(error = %e, "CUDA probe unavailable, reading pool statistics");
            }
        }
    }
    Arc::new(PoolProbe::new(pool.clone()))
}

#[cfg(not(feature = "cuda"))]
fn select_probe(_device: &DeviceConfig, pool: &DevicePool) -> Arc<dyn MemoryProbe> {
    Arc::new(PoolProbe::new(pool.clone()))
}
