//! Shared fixtures for lifecycle integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use hub_core::memory::{DeviceBuffer, DeviceKind, DevicePool, SimulatedDevice};
use hub_core::models::{
    AdmissionThresholds, Artifact, ArtifactCategory, ArtifactDescriptor, ArtifactLoader,
    ArtifactRegistry, ArtifactSpec, LifecycleManager, LoadContext, LoadError, ManagerConfig,
};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Artifact holding a device buffer; tracks how many are alive at once.
pub struct TestArtifact {
    id: String,
    buffer: DeviceBuffer,
    live: Arc<LiveCounter>,
}

impl TestArtifact {
    pub fn payload(&self) -> String {
        format!("output of {}", self.id)
    }
}

impl Artifact for TestArtifact {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_bytes(&self) -> u64 {
        self.buffer.size()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for TestArtifact {
    fn drop(&mut self) {
        self.live.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct LiveCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl LiveCounter {
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Loader over the shared pool with scripted failures and per-id call counts.
#[derive(Default)]
pub struct TestLoader {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    pub live: Arc<LiveCounter>,
}

impl TestLoader {
    pub fn calls(&self, id: &str) -> usize {
        self.calls.lock().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn fail(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait]
impl ArtifactLoader for TestLoader {
    async fn load(
        &self,
        descriptor: &ArtifactDescriptor,
        ctx: &LoadContext,
    ) -> Result<Arc<dyn Artifact>, LoadError> {
        *self.calls.lock().entry(descriptor.id().to_string()).or_default() += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Allocate before failing so a failed load must not leak device memory.
        let buffer = ctx.pool().allocate(descriptor.footprint_bytes())?;
        if self.failing.lock().contains(descriptor.id()) {
            drop(buffer);
            return Err(LoadError::Failed(format!("corrupt weights for {}", descriptor.id())));
        }

        let now = self.live.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Arc::new(TestArtifact {
            id: descriptor.id().to_string(),
            buffer,
            live: self.live.clone(),
        }))
    }
}

pub struct Fixture {
    pub manager: LifecycleManager,
    pub loader: Arc<TestLoader>,
    pub device: Arc<SimulatedDevice>,
    pub pool: DevicePool,
}

/// A: fast image synthesis, 2000 MiB footprint, 2 GiB threshold.
/// B: video synthesis, 4500 MiB footprint, 3 GiB threshold.
/// C: language model, 1000 MiB footprint, 3 GiB threshold.
pub fn specs() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::new("A", ArtifactCategory::FastImageSynthesis, 2000 * MIB),
        ArtifactSpec::new("B", ArtifactCategory::VideoSynthesis, 4500 * MIB),
        ArtifactSpec::new("C", ArtifactCategory::LanguageModel, 1000 * MIB),
    ]
}

pub fn fixture(kind: DeviceKind, capacity: u64) -> Fixture {
    let loader = Arc::new(TestLoader::default());
    let registry = ArtifactRegistry::builder()
        .with_loader_for_all(loader.clone())
        .with_artifacts(specs())
        .build()
        .unwrap();
    let device = Arc::new(SimulatedDevice::new(capacity));
    let name = if kind.is_accelerator() { "cuda:0" } else { "host" };
    let pool = DevicePool::new(kind, name, device.clone());
    let config = ManagerConfig {
        thresholds: AdmissionThresholds::default(),
        budget_bytes: 6500 * MIB,
    };
    let manager = LifecycleManager::new(Arc::new(registry), pool.clone(), config);
    Fixture {
        manager,
        loader,
        device,
        pool,
    }
}

/// 5 GiB CUDA device, nothing allocated.
pub fn cuda_fixture() -> Fixture {
    fixture(DeviceKind::Cuda, 5 * GIB)
}
