// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Scoped artifact use with guaranteed unload.
//!
//! A lease loads an artifact, hands out a borrow for the duration of an
//! operation, and unloads it afterwards on every exit path: normal return,
//! error return, panic, or the lease simply being dropped.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::Instrument;
use uuid::Uuid;

use super::loader::Artifact;
use super::manager::{LifecycleError, LifecycleManager};
use crate::telemetry::LifecycleSpan;

/// Unloads the leased artifact unless disarmed by an explicit release.
///
/// Drop cannot await, so the unload is spawned onto the current runtime.
/// The unload carries this lease's claim, so a later lease that reused the
/// same artifact keeps it.
struct LeaseGuard {
    manager: LifecycleManager,
    id: String,
    lease_id: Uuid,
    claim: u64,
    armed: bool,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let manager = self.manager.clone();
        let id = std::mem::take(&mut self.id);
        let lease_id = self.lease_id;
        let claim = self.claim;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(artifact = %id, %lease_id, "lease dropped, scheduling unload");
                handle.spawn(async move {
                    manager.unload_claimed(&id, claim).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    artifact = %id,
                    %lease_id,
                    "lease dropped outside a runtime; artifact stays resident until the next transition"
                );
            }
        }
    }
}

/// A loaded artifact that is unloaded when the lease ends.
pub struct ArtifactLease {
    // Declared before `guard` so the borrow is gone before the unload runs.
    artifact: Arc<dyn Artifact>,
    guard: LeaseGuard,
}

impl ArtifactLease {
    pub fn id(&self) -> &str {
        &self.guard.id
    }

    pub fn lease_id(&self) -> Uuid {
        self.guard.lease_id
    }

    pub fn artifact(&self) -> &Arc<dyn Artifact> {
        &self.artifact
    }

    /// End the lease and wait for the unload. Returns false when another
    /// transition already evicted the artifact, or a newer lease took it over.
    pub async fn release(self) -> bool {
        let ArtifactLease { artifact, mut guard } = self;
        drop(artifact);
        guard.armed = false;
        let unloaded = guard.manager.unload_claimed(&guard.id, guard.claim).await;
        tracing::debug!(artifact = %guard.id, lease_id = %guard.lease_id, unloaded, "lease released");
        unloaded
    }

    /// End the lease and unload the artifact regardless of later claims.
    async fn end(self) -> bool {
        let ArtifactLease { artifact, mut guard } = self;
        drop(artifact);
        guard.armed = false;
        guard.manager.unload(&guard.id).await
    }
}

impl std::fmt::Debug for ArtifactLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactLease")
            .field("id", &self.guard.id)
            .field("lease_id", &self.guard.lease_id)
            .finish()
    }
}

impl LifecycleManager {
    /// Load `id` (evicting anything else) and lease it.
    pub async fn lease(&self, id: &str) -> Result<ArtifactLease, LifecycleError> {
        let acquired = self.acquire(id, false).await?;
        Ok(ArtifactLease {
            artifact: acquired.handle,
            guard: LeaseGuard {
                manager: self.clone(),
                id: id.to_string(),
                lease_id: Uuid::new_v4(),
                claim: acquired.claim,
                armed: true,
            },
        })
    }

    /// Run `operation` against a freshly leased artifact, then unload it.
    ///
    /// If the artifact cannot be loaded, `degraded` produces the result
    /// instead and `operation` is never invoked. The unload happens before
    /// this returns, including when `operation` panics; the panic is resumed
    /// after the unload completes.
    pub async fn with_leased_artifact<T, Op, Fut, Fallback>(
        &self,
        id: &str,
        operation: Op,
        degraded: Fallback,
    ) -> T
    where
        Op: FnOnce(Arc<dyn Artifact>) -> Fut,
        Fut: Future<Output = T>,
        Fallback: FnOnce(LifecycleError) -> T,
    {
        let lease = match self.lease(id).await {
            Ok(lease) => lease,
            Err(e) => {
                tracing::warn!(artifact = id, error = %e, "lease unavailable, using degraded path");
                return degraded(e);
            }
        };

        let span = LifecycleSpan::lease(&lease.lease_id().to_string(), id);
        let artifact = lease.artifact().clone();
        let outcome = AssertUnwindSafe(async move { operation(artifact).await })
            .catch_unwind()
            .instrument(span.clone())
            .await;

        lease.end().instrument(span.clone()).await;

        match outcome {
            Ok(value) => {
                span.record("status", "ok");
                value
            }
            Err(panic) => {
                span.record("status", "panicked");
                tracing::error!(artifact = id, "leased operation panicked; artifact unloaded");
                std::panic::resume_unwind(panic)
            }
        }
    }
}
