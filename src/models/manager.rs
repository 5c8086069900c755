// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Lifecycle manager for artifacts competing for the shared device.
//!
//! At most one artifact is resident at a time. Every transition
//! (`ensure_loaded`, `unload`, `unload_all`, `force_clear`) runs under a
//! single gate, one at a time. Reads (`get`, `snapshot`, `status`) never wait
//! on the gate and see either the pre- or post-transition resident set.
//!
//! Transition sequence for a load:
//! 1. Evict every resident artifact
//! 2. Force-clear device memory
//! 3. Probe and apply the category's admission threshold
//! 4. Invoke the descriptor's loader
//! 5. On any failure, force-clear again before returning
//!
//! A load runs on its own task once started. Dropping the caller's future
//! (a timeout, a cancelled request) does not abort it mid-flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::Instrument;

use super::loader::{Artifact, LoadContext, LoadError};
use super::registry::{AdmissionThresholds, ArtifactCategory, ArtifactDescriptor, ArtifactRegistry};
use super::status::{
    ArtifactState, ArtifactStatus, ClearReport, LoadOutcome, LoadReport, ManagerStatus,
};
use crate::memory::{self, DevicePool, MemoryProbe, MemorySnapshot, PoolProbe};
use crate::telemetry::metrics as hub_metrics;
use crate::telemetry::{LifecycleSpan, LoadOutcomeLabel, SpanExt};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),

    #[error("Insufficient memory to load {artifact}: {free_bytes} bytes free, {required_bytes} required")]
    InsufficientMemory {
        artifact: String,
        free_bytes: u64,
        required_bytes: u64,
    },

    #[error("Device out of memory loading {artifact}: {detail}")]
    ResourceExhausted { artifact: String, detail: String },

    #[error("Failed to load {artifact}: {source}")]
    LoadFailed {
        artifact: String,
        #[source]
        source: LoadError,
    },
}

impl LifecycleError {
    pub fn artifact(&self) -> &str {
        match self {
            LifecycleError::UnknownArtifact(id) => id,
            LifecycleError::InsufficientMemory { artifact, .. }
            | LifecycleError::ResourceExhausted { artifact, .. }
            | LifecycleError::LoadFailed { artifact, .. } => artifact,
        }
    }

    /// Memory pressure failures may succeed later; the rest will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifecycleError::InsufficientMemory { .. } | LifecycleError::ResourceExhausted { .. }
        )
    }

    fn label(&self) -> LoadOutcomeLabel {
        match self {
            LifecycleError::UnknownArtifact(_) => LoadOutcomeLabel::UnknownArtifact,
            LifecycleError::InsufficientMemory { .. } => LoadOutcomeLabel::InsufficientMemory,
            LifecycleError::ResourceExhausted { .. } => LoadOutcomeLabel::ResourceExhausted,
            LifecycleError::LoadFailed { .. } => LoadOutcomeLabel::LoadFailed,
        }
    }
}

/// Manager tuning.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Per-category free-memory thresholds for admission on an accelerator.
    pub thresholds: AdmissionThresholds,
    /// Soft ceiling for the host (non-probed) path. Exceeding it only warns.
    pub budget_bytes: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            thresholds: AdmissionThresholds::default(),
            budget_bytes: 6500 * 1024 * 1024, // 6500 MiB
        }
    }
}

/// An artifact currently occupying the device.
pub struct ResidentArtifact {
    id: String,
    category: ArtifactCategory,
    handle: Arc<dyn Artifact>,
    loaded_at: DateTime<Utc>,
    load_duration: Duration,
    /// Claim of the most recent caller handed this handle.
    holder: AtomicU64,
}

impl ResidentArtifact {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> ArtifactCategory {
        self.category
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn load_duration(&self) -> Duration {
        self.load_duration
    }
}

struct ManagerInner {
    registry: Arc<ArtifactRegistry>,
    pool: DevicePool,
    probe: Arc<dyn MemoryProbe>,
    config: ManagerConfig,
    resident: RwLock<HashMap<String, ResidentArtifact>>,
    loading: Mutex<Option<String>>,
    gate: tokio::sync::Mutex<()>,
    next_claim: AtomicU64,
}

/// Result of a load-or-reuse, with the claim identifying this hand-out.
pub(crate) struct Acquired {
    pub(crate) report: LoadReport,
    pub(crate) handle: Arc<dyn Artifact>,
    pub(crate) claim: u64,
}

/// Clears the `loading` marker when a load attempt ends, including when the
/// attempt's future is dropped.
struct LoadingMarker<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl<'a> LoadingMarker<'a> {
    fn set(slot: &'a Mutex<Option<String>>, id: &str) -> Self {
        *slot.lock() = Some(id.to_string());
        Self { slot }
    }
}

impl Drop for LoadingMarker<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Owns the resident set and serializes every device transition.
///
/// Cheap to clone; clones share state. Construct one per process at the
/// composition root and hand clones to request handlers.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<ManagerInner>,
}

impl LifecycleManager {
    /// Create a manager probing the pool's own allocator statistics.
    pub fn new(registry: Arc<ArtifactRegistry>, pool: DevicePool, config: ManagerConfig) -> Self {
        let probe = Arc::new(PoolProbe::new(pool.clone()));
        Self::with_probe(registry, pool, probe, config)
    }

    /// Create a manager with an explicit memory probe.
    pub fn with_probe(
        registry: Arc<ArtifactRegistry>,
        pool: DevicePool,
        probe: Arc<dyn MemoryProbe>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry,
                pool,
                probe,
                config,
                resident: RwLock::new(HashMap::new()),
                loading: Mutex::new(None),
                gate: tokio::sync::Mutex::new(()),
                next_claim: AtomicU64::new(0),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.inner.registry
    }

    pub fn pool(&self) -> &DevicePool {
        &self.inner.pool
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Whether a real accelerator backs the pool.
    pub fn is_accelerator(&self) -> bool {
        self.inner.pool.kind().is_accelerator()
    }

    /// Ensure `id` is the resident artifact, evicting whatever else is loaded.
    pub async fn ensure_loaded(
        &self,
        id: &str,
        force_reload: bool,
    ) -> Result<LoadReport, LifecycleError> {
        self.acquire(id, force_reload).await.map(|acquired| acquired.report)
    }

    /// `ensure_loaded` flattened into the response shape handed to callers.
    pub async fn load_outcome(&self, id: &str, force_reload: bool) -> LoadOutcome {
        match self.ensure_loaded(id, force_reload).await {
            Ok(report) => LoadOutcome {
                artifact: report.artifact,
                loaded: true,
                load_time_secs: report.load_time.as_secs_f64(),
                memory_used_bytes: report.memory.allocated_bytes,
                error: None,
                retryable: false,
            },
            Err(e) => LoadOutcome {
                artifact: id.to_string(),
                loaded: false,
                load_time_secs: 0.0,
                memory_used_bytes: self.snapshot().allocated_bytes,
                error: Some(e.to_string()),
                retryable: e.is_retryable(),
            },
        }
    }

    /// Load (or reuse) `id` and return a borrowed handle alongside the report.
    pub(crate) async fn acquire(
        &self,
        id: &str,
        force_reload: bool,
    ) -> Result<Acquired, LifecycleError> {
        if !self.inner.registry.contains(id) {
            tracing::error!(artifact = id, "unknown artifact requested");
            hub_metrics::record_load(id, LoadOutcomeLabel::UnknownArtifact, Duration::ZERO);
            return Err(LifecycleError::UnknownArtifact(id.to_string()));
        }

        if !force_reload {
            if let Some((handle, claim)) = self.claim(id) {
                tracing::debug!(artifact = id, "artifact already resident, skipping load");
                hub_metrics::record_load(id, LoadOutcomeLabel::Reused, Duration::ZERO);
                return Ok(Acquired {
                    report: self.reused_report(id),
                    handle,
                    claim,
                });
            }
        }

        let span = LifecycleSpan::new("ensure_loaded", id);
        let manager = self.clone();
        let owned_id = id.to_string();
        let task = tokio::spawn(
            async move { manager.load_gated(&owned_id, force_reload).await }
                .instrument(span.clone()),
        );
        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(LifecycleError::LoadFailed {
                artifact: id.to_string(),
                source: LoadError::Failed(format!("load task aborted: {}", e)),
            }),
        };
        span.record_result(&result);

        match &result {
            Ok(acquired) => {
                let label = if acquired.report.reused {
                    LoadOutcomeLabel::Reused
                } else {
                    span.record("load_ms", acquired.report.load_time.as_millis() as u64);
                    LoadOutcomeLabel::Loaded
                };
                hub_metrics::record_load(id, label, acquired.report.load_time);
            }
            Err(e) => hub_metrics::record_load(id, e.label(), Duration::ZERO),
        }
        result
    }

    async fn load_gated(&self, id: &str, force_reload: bool) -> Result<Acquired, LifecycleError> {
        let _gate = self.inner.gate.lock().await;
        let Some(descriptor) = self.inner.registry.get(id) else {
            return Err(LifecycleError::UnknownArtifact(id.to_string()));
        };

        // A transition queued ahead of us may have loaded the same artifact.
        if !force_reload {
            if let Some((handle, claim)) = self.claim(id) {
                return Ok(Acquired {
                    report: self.reused_report(id),
                    handle,
                    claim,
                });
            }
        }

        let _marker = LoadingMarker::set(&self.inner.loading, id);
        let start = Instant::now();
        tracing::info!(
            artifact = id,
            category = %descriptor.category(),
            resident = ?self.resident_ids(),
            memory = %self.snapshot().summary(),
            "loading artifact"
        );

        self.unload_all_locked(None);
        self.force_clear_locked();

        let before = self.snapshot();
        if let Err(e) = self.admit(descriptor, &before) {
            self.force_clear_locked();
            return Err(e);
        }

        let ctx = LoadContext::new(self.inner.pool.clone());
        match descriptor.loader().load(descriptor, &ctx).await {
            Ok(handle) => {
                let load_duration = start.elapsed();
                let claim = self.next_claim();
                self.inner.resident.write().insert(
                    id.to_string(),
                    ResidentArtifact {
                        id: id.to_string(),
                        category: descriptor.category(),
                        handle: handle.clone(),
                        loaded_at: Utc::now(),
                        load_duration,
                        holder: AtomicU64::new(claim),
                    },
                );
                let memory = self.snapshot();
                hub_metrics::record_resident_count(1);
                hub_metrics::record_device_allocated(memory.allocated_bytes);
                tracing::info!(
                    artifact = id,
                    load_secs = load_duration.as_secs_f64(),
                    device_bytes = handle.device_bytes(),
                    memory = %memory.summary(),
                    "artifact loaded"
                );
                Ok(Acquired {
                    report: LoadReport {
                        artifact: id.to_string(),
                        reused: false,
                        load_time: load_duration,
                        memory,
                    },
                    handle,
                    claim,
                })
            }
            Err(LoadError::ResourceExhausted { requested, available }) => {
                tracing::error!(
                    artifact = id,
                    requested,
                    available,
                    "device out of memory during load"
                );
                self.force_clear_locked();
                Err(LifecycleError::ResourceExhausted {
                    artifact: id.to_string(),
                    detail: format!(
                        "requested {} bytes with {} available; close other device users or pick a lighter artifact",
                        requested, available
                    ),
                })
            }
            Err(source) => {
                tracing::error!(artifact = id, error = %source, "artifact load failed");
                self.force_clear_locked();
                Err(LifecycleError::LoadFailed {
                    artifact: id.to_string(),
                    source,
                })
            }
        }
    }

    fn next_claim(&self) -> u64 {
        self.inner.next_claim.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Hand out the resident handle for `id` under a fresh claim. The newest
    /// claim is the only one that may unload it through `unload_claimed`.
    fn claim(&self, id: &str) -> Option<(Arc<dyn Artifact>, u64)> {
        let set = self.inner.resident.read();
        let resident = set.get(id)?;
        let claim = self.next_claim();
        resident.holder.store(claim, Ordering::Release);
        Some((resident.handle.clone(), claim))
    }

    fn admit(&self, descriptor: &ArtifactDescriptor, snapshot: &MemorySnapshot) -> Result<(), LifecycleError> {
        let id = descriptor.id();

        if !self.is_accelerator() || snapshot.unconstrained {
            if descriptor.footprint_bytes() > self.inner.config.budget_bytes {
                tracing::warn!(
                    artifact = id,
                    footprint_bytes = descriptor.footprint_bytes(),
                    budget_bytes = self.inner.config.budget_bytes,
                    "footprint exceeds soft memory budget, admitting on host path"
                );
            }
            return Ok(());
        }

        let required = self.inner.config.thresholds.for_category(descriptor.category());
        if snapshot.free_bytes < required {
            tracing::warn!(
                artifact = id,
                category = %descriptor.category(),
                free_bytes = snapshot.free_bytes,
                required_bytes = required,
                "not enough free device memory"
            );
            return Err(LifecycleError::InsufficientMemory {
                artifact: id.to_string(),
                free_bytes: snapshot.free_bytes,
                required_bytes: required,
            });
        }

        tracing::debug!(
            artifact = id,
            free_bytes = snapshot.free_bytes,
            required_bytes = required,
            "admission granted"
        );
        Ok(())
    }

    fn reused_report(&self, id: &str) -> LoadReport {
        LoadReport {
            artifact: id.to_string(),
            reused: true,
            load_time: Duration::ZERO,
            memory: self.snapshot(),
        }
    }

    /// Borrow the live handle for `id` if resident. Never loads.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Artifact>> {
        self.inner.resident.read().get(id).map(|r| r.handle.clone())
    }

    pub fn is_resident(&self, id: &str) -> bool {
        self.inner.resident.read().contains_key(id)
    }

    /// Identities currently resident (at most one).
    pub fn resident_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.resident.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn state(&self, id: &str) -> ArtifactState {
        if self.is_resident(id) {
            ArtifactState::Resident
        } else if self.inner.loading.lock().as_deref() == Some(id) {
            ArtifactState::Loading
        } else {
            ArtifactState::Absent
        }
    }

    /// Unload `id`. Returns whether anything was resident; unloading a
    /// non-resident identity is a no-op.
    pub async fn unload(&self, id: &str) -> bool {
        let _gate = self.inner.gate.lock().await;
        let removed = self.inner.resident.write().remove(id);
        self.finish_unload(id, removed)
    }

    /// Unload `id` only if `claim` is still its newest hand-out. A caller
    /// that reused the artifact afterwards keeps it resident.
    pub(crate) async fn unload_claimed(&self, id: &str, claim: u64) -> bool {
        let _gate = self.inner.gate.lock().await;
        let removed = {
            let mut set = self.inner.resident.write();
            match set.get(id).map(|r| r.holder.load(Ordering::Acquire)) {
                Some(holder) if holder == claim => set.remove(id),
                Some(_) => {
                    tracing::debug!(artifact = id, claim, "artifact claimed again, keeping it resident");
                    None
                }
                None => None,
            }
        };
        self.finish_unload(id, removed)
    }

    fn finish_unload(&self, id: &str, removed: Option<ResidentArtifact>) -> bool {
        match removed {
            Some(resident) => {
                self.release(resident);
                self.reclaim_locked();
                hub_metrics::record_resident_count(self.inner.resident.read().len());
                tracing::info!(artifact = id, memory = %self.snapshot().summary(), "artifact unloaded");
                true
            }
            None => {
                tracing::debug!(artifact = id, "unload requested for non-resident artifact");
                false
            }
        }
    }

    /// Unload every resident artifact except `except`.
    pub async fn unload_all(&self, except: Option<&str>) -> usize {
        let _gate = self.inner.gate.lock().await;
        let released = self.unload_all_locked(except);
        if released > 0 {
            self.reclaim_locked();
        }
        released
    }

    /// Evict everything and reset device memory. Never fails.
    pub async fn force_clear(&self) -> ClearReport {
        let _gate = self.inner.gate.lock().await;
        self.force_clear_locked()
    }

    /// Fresh memory reading.
    pub fn snapshot(&self) -> MemorySnapshot {
        memory::snapshot(self.inner.probe.as_ref())
    }

    pub fn status(&self) -> ManagerStatus {
        let registry = &self.inner.registry;
        let thresholds = &self.inner.config.thresholds;
        let artifacts = registry
            .ids()
            .into_iter()
            .filter_map(|id| registry.get(&id))
            .map(|d| {
                let state = self.state(d.id());
                let (loaded_at, load_time_secs) = match self.inner.resident.read().get(d.id()) {
                    Some(r) => (Some(r.loaded_at), Some(r.load_duration.as_secs_f64())),
                    None => (None, None),
                };
                ArtifactStatus {
                    id: d.id().to_string(),
                    category: d.category(),
                    source: d.source().to_string(),
                    state,
                    loaded: state == ArtifactState::Resident,
                    footprint_bytes: d.footprint_bytes(),
                    threshold_bytes: thresholds.for_category(d.category()),
                    loaded_at,
                    load_time_secs,
                }
            })
            .collect();

        ManagerStatus {
            device: self.inner.pool.kind(),
            device_name: self.inner.pool.name().to_string(),
            accelerator: self.is_accelerator(),
            resident: self.resident_ids(),
            loading: self.inner.loading.lock().clone(),
            memory: self.snapshot(),
            budget_bytes: self.inner.config.budget_bytes,
            artifacts,
        }
    }

    // -- Transitions below require the gate to be held by the caller. --------

    fn unload_all_locked(&self, except: Option<&str>) -> usize {
        let evicted: Vec<ResidentArtifact> = {
            let mut set = self.inner.resident.write();
            let ids: Vec<String> = set
                .keys()
                .filter(|id| Some(id.as_str()) != except)
                .cloned()
                .collect();
            ids.iter().filter_map(|id| set.remove(id)).collect()
        };
        let count = evicted.len();
        for resident in evicted {
            tracing::info!(artifact = resident.id(), "evicting resident artifact");
            self.release(resident);
        }
        if count > 0 {
            hub_metrics::record_resident_count(self.inner.resident.read().len());
        }
        count
    }

    fn force_clear_locked(&self) -> ClearReport {
        let drained: Vec<ResidentArtifact> = {
            let mut set = self.inner.resident.write();
            set.drain().map(|(_, r)| r).collect()
        };
        let released = drained.len();
        // Handles are dropped here, on this task, before the device reclaims.
        for resident in drained {
            self.release(resident);
        }
        let reclaimed_bytes = self.reclaim_locked();
        hub_metrics::record_force_clear(reclaimed_bytes);
        hub_metrics::record_resident_count(0);

        tracing::info!(
            released,
            reclaimed_bytes,
            memory = %self.snapshot().summary(),
            "device memory cleared"
        );
        ClearReport {
            released,
            reclaimed_bytes,
        }
    }

    fn reclaim_locked(&self) -> u64 {
        let allocator = self.inner.pool.allocator();
        let reclaimed = allocator.reclaim();
        allocator.reset_stats();
        hub_metrics::record_device_allocated(allocator.allocated_bytes());
        reclaimed
    }

    fn release(&self, resident: ResidentArtifact) {
        let borrowers = Arc::strong_count(&resident.handle) - 1;
        if borrowers > 0 {
            tracing::warn!(
                artifact = resident.id(),
                borrowers,
                "artifact released while still borrowed; device memory is freed when the last borrow drops"
            );
        }
        hub_metrics::record_unload(resident.id());
        drop(resident);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DeviceAllocator, DeviceKind, SimulatedDevice};
    use crate::models::loader::ArtifactLoader;
    use crate::models::registry::ArtifactSpec;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MIB: u64 = 1024 * 1024;

    struct Blob {
        id: String,
        _buffer: crate::memory::DeviceBuffer,
        bytes: u64,
    }

    impl Artifact for Blob {
        fn id(&self) -> &str {
            &self.id
        }
        fn device_bytes(&self) -> u64 {
            self.bytes
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactLoader for CountingLoader {
        async fn load(
            &self,
            descriptor: &ArtifactDescriptor,
            ctx: &LoadContext,
        ) -> Result<Arc<dyn Artifact>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let buffer = ctx.pool().allocate(descriptor.footprint_bytes())?;
            Ok(Arc::new(Blob {
                id: descriptor.id().to_string(),
                bytes: buffer.size(),
                _buffer: buffer,
            }))
        }
    }

    fn manager(capacity: u64) -> (LifecycleManager, Arc<CountingLoader>, Arc<SimulatedDevice>) {
        let loader = Arc::new(CountingLoader::default());
        let registry = ArtifactRegistry::builder()
            .with_loader_for_all(loader.clone())
            .with_artifact(ArtifactSpec::new("small", ArtifactCategory::FastImageSynthesis, 100 * MIB))
            .with_artifact(ArtifactSpec::new("large", ArtifactCategory::VideoSynthesis, 400 * MIB))
            .build()
            .unwrap();
        let device = Arc::new(SimulatedDevice::new(capacity));
        let pool = DevicePool::new(DeviceKind::Cuda, "cuda:0", device.clone());
        let config = ManagerConfig {
            thresholds: AdmissionThresholds::default()
                .with(ArtifactCategory::FastImageSynthesis, 200 * MIB)
                .with(ArtifactCategory::VideoSynthesis, 500 * MIB),
            budget_bytes: 1024 * MIB,
        };
        (
            LifecycleManager::new(Arc::new(registry), pool, config),
            loader,
            device,
        )
    }

    #[tokio::test]
    async fn test_load_makes_artifact_resident() {
        let (mgr, loader, device) = manager(1024 * MIB);
        let report = mgr.ensure_loaded("small", false).await.unwrap();
        assert!(!report.reused);
        assert_eq!(report.memory.allocated_bytes, 100 * MIB);
        assert_eq!(mgr.resident_ids(), vec!["small"]);
        assert_eq!(mgr.state("small"), ArtifactState::Resident);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(device.allocated_bytes(), 100 * MIB);
    }

    #[tokio::test]
    async fn test_force_reload_loads_again() {
        let (mgr, loader, device) = manager(1024 * MIB);
        mgr.ensure_loaded("small", false).await.unwrap();
        let report = mgr.ensure_loaded("small", true).await.unwrap();
        assert!(!report.reused);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(device.allocated_bytes(), 100 * MIB);
        assert_eq!(device.live_allocations(), 1);
    }

    #[tokio::test]
    async fn test_unknown_artifact_touches_nothing() {
        let (mgr, loader, _device) = manager(1024 * MIB);
        mgr.ensure_loaded("small", false).await.unwrap();
        let err = mgr.ensure_loaded("nope", false).await.unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownArtifact(ref id) if id == "nope"));
        assert!(!err.is_retryable());
        assert_eq!(mgr.resident_ids(), vec!["small"]);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_threshold_equal_to_free_is_admitted() {
        let (mgr, _loader, _device) = manager(500 * MIB);
        assert!(mgr.ensure_loaded("large", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_force_clear_reclaims_cache_and_empties_set() {
        let (mgr, _loader, device) = manager(1024 * MIB);
        mgr.ensure_loaded("large", false).await.unwrap();
        let report = mgr.force_clear().await;
        assert_eq!(report.released, 1);
        assert_eq!(report.reclaimed_bytes, 400 * MIB);
        assert!(mgr.resident_ids().is_empty());
        assert_eq!(device.reserved_bytes(), 0);
        assert_eq!(device.peak_bytes(), 0);

        let again = mgr.force_clear().await;
        assert_eq!(again, ClearReport::default());
    }

    #[tokio::test]
    async fn test_unload_all_keeps_exception() {
        let (mgr, _loader, _device) = manager(1024 * MIB);
        mgr.ensure_loaded("small", false).await.unwrap();
        assert_eq!(mgr.unload_all(Some("small")).await, 0);
        assert!(mgr.is_resident("small"));
        assert_eq!(mgr.unload_all(None).await, 1);
        assert!(!mgr.is_resident("small"));
    }

    #[tokio::test]
    async fn test_status_reports_every_artifact() {
        let (mgr, _loader, _device) = manager(1024 * MIB);
        mgr.ensure_loaded("small", false).await.unwrap();
        let status = mgr.status();
        assert_eq!(status.device, DeviceKind::Cuda);
        assert!(status.accelerator);
        assert_eq!(status.resident, vec!["small"]);
        assert!(status.loading.is_none());
        assert_eq!(status.artifacts.len(), 2);

        let small = status.artifact("small").unwrap();
        assert!(small.loaded);
        assert!(small.loaded_at.is_some());
        assert_eq!(small.threshold_bytes, 200 * MIB);
        let large = status.artifact("large").unwrap();
        assert_eq!(large.state, ArtifactState::Absent);
        assert_eq!(large.footprint_bytes, 400 * MIB);
    }

    #[tokio::test]
    async fn test_load_outcome_shape() {
        let (mgr, _loader, _device) = manager(300 * MIB);
        let ok = mgr.load_outcome("small", false).await;
        assert!(ok.loaded);
        assert_eq!(ok.memory_used_bytes, 100 * MIB);
        assert!(ok.error.is_none());

        let denied = mgr.load_outcome("large", false).await;
        assert!(!denied.loaded);
        assert!(denied.retryable);
        assert!(denied.error.unwrap().contains("Insufficient memory"));
        assert_eq!(denied.memory_used_bytes, 0);
    }

    #[tokio::test]
    async fn test_host_path_admits_without_probe() {
        let loader = Arc::new(CountingLoader::default());
        let registry = ArtifactRegistry::builder()
            .with_loader_for_all(loader.clone())
            .with_artifact(ArtifactSpec::new("big", ArtifactCategory::LanguageModel, 64 * MIB))
            .build()
            .unwrap();
        let device = Arc::new(SimulatedDevice::new(128 * MIB));
        let pool = DevicePool::new(DeviceKind::Cpu, "host", device);
        let config = ManagerConfig {
            budget_bytes: MIB,
            ..Default::default()
        };
        let mgr = LifecycleManager::new(Arc::new(registry), pool, config);

        assert!(!mgr.is_accelerator());
        assert!(mgr.snapshot().unconstrained);
        mgr.ensure_loaded("big", false).await.unwrap();
        assert!(mgr.is_resident("big"));
    }

    /// Counts increments of the force-clear counter; every other metric is a no-op.
    #[derive(Default)]
    struct ClearCounter {
        clears: Arc<std::sync::atomic::AtomicU64>,
    }

    impl metrics::Recorder for ClearCounter {
        fn describe_counter(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_gauge(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_histogram(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}

        fn register_counter(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            if key.name() == "hub_core_force_clears_total" {
                metrics::Counter::from_arc(self.clears.clone())
            } else {
                metrics::Counter::noop()
            }
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }

        fn register_histogram(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_plain_unloads_do_not_count_as_force_clears() {
        let recorder = ClearCounter::default();
        let clears = recorder.clears.clone();
        let (mgr, _loader, _device) = manager(1024 * MIB);
        let count = || clears.load(Ordering::SeqCst);

        metrics::with_local_recorder(&recorder, || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                // A load clears the device once before admission.
                mgr.ensure_loaded("small", false).await.unwrap();
                assert_eq!(count(), 1);

                assert!(mgr.unload("small").await);
                assert_eq!(count(), 1);

                mgr.ensure_loaded("small", false).await.unwrap();
                assert_eq!(mgr.unload_all(None).await, 1);
                assert_eq!(count(), 2);

                mgr.force_clear().await;
                assert_eq!(count(), 3);
            });
        });
    }
}
