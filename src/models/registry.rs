// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Artifact registry: identity -> category, footprint, loader.
//!
//! Built once at startup and immutable afterwards. Loader dispatch is resolved
//! per category when the registry is built, so loading never branches on
//! string-valued types.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loader::ArtifactLoader;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// What kind of artifact a descriptor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    ImageSynthesis,
    VideoSynthesis,
    FastImageSynthesis,
    LanguageModel,
}

impl ArtifactCategory {
    pub const ALL: [ArtifactCategory; 4] = [
        ArtifactCategory::ImageSynthesis,
        ArtifactCategory::VideoSynthesis,
        ArtifactCategory::FastImageSynthesis,
        ArtifactCategory::LanguageModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::ImageSynthesis => "image_synthesis",
            ArtifactCategory::VideoSynthesis => "video_synthesis",
            ArtifactCategory::FastImageSynthesis => "fast_image_synthesis",
            ArtifactCategory::LanguageModel => "language_model",
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum free device memory required before loading each category.
///
/// These are tuned per category rather than derived from footprints:
/// driver overhead and fragmentation make footprint arithmetic unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionThresholds {
    pub image_synthesis: u64,
    pub video_synthesis: u64,
    pub fast_image_synthesis: u64,
    pub language_model: u64,
}

impl Default for AdmissionThresholds {
    fn default() -> Self {
        Self {
            image_synthesis: 5 * GIB / 2,   // 2.5 GiB
            video_synthesis: 3 * GIB,       // 3.0 GiB
            fast_image_synthesis: 2 * GIB,  // 2.0 GiB
            language_model: 3 * GIB,        // 3.0 GiB
        }
    }
}

impl AdmissionThresholds {
    pub fn for_category(&self, category: ArtifactCategory) -> u64 {
        match category {
            ArtifactCategory::ImageSynthesis => self.image_synthesis,
            ArtifactCategory::VideoSynthesis => self.video_synthesis,
            ArtifactCategory::FastImageSynthesis => self.fast_image_synthesis,
            ArtifactCategory::LanguageModel => self.language_model,
        }
    }

    pub fn with(mut self, category: ArtifactCategory, bytes: u64) -> Self {
        match category {
            ArtifactCategory::ImageSynthesis => self.image_synthesis = bytes,
            ArtifactCategory::VideoSynthesis => self.video_synthesis = bytes,
            ArtifactCategory::FastImageSynthesis => self.fast_image_synthesis = bytes,
            ArtifactCategory::LanguageModel => self.language_model = bytes,
        }
        self
    }

    /// The least headroom any category asks for.
    pub fn smallest(&self) -> u64 {
        ArtifactCategory::ALL
            .iter()
            .map(|c| self.for_category(*c))
            .min()
            .unwrap_or(0)
    }
}

/// Declaration of an artifact before its loader is resolved.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub id: String,
    pub category: ArtifactCategory,
    pub source: String,
    pub footprint_bytes: u64,
    pub weights: Option<PathBuf>,
}

impl ArtifactSpec {
    pub fn new(id: impl Into<String>, category: ArtifactCategory, footprint_bytes: u64) -> Self {
        let id = id.into();
        Self {
            source: id.clone(),
            id,
            category,
            footprint_bytes,
            weights: None,
        }
    }

    /// Upstream model identifier (e.g. a hub repository name).
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Weights file, relative to the loader's base path.
    pub fn weights(mut self, path: impl Into<PathBuf>) -> Self {
        self.weights = Some(path.into());
        self
    }

    /// The artifacts served by the hub out of the box.
    pub fn defaults() -> Vec<ArtifactSpec> {
        vec![
            ArtifactSpec::new("generative_art", ArtifactCategory::ImageSynthesis, 2500 * MIB)
                .source("prompthero/openjourney")
                .weights("models/generative_art/model.safetensors"),
            ArtifactSpec::new("generative_video", ArtifactCategory::VideoSynthesis, 4500 * MIB)
                .source("ByteDance/AnimateDiff-Lightning")
                .weights("models/generative_video/model.safetensors"),
            ArtifactSpec::new(
                "streaming_generative",
                ArtifactCategory::FastImageSynthesis,
                2000 * MIB,
            )
            .source("stabilityai/sdxl-turbo")
            .weights("models/streaming_generative/model.safetensors"),
            ArtifactSpec::new("blockchain", ArtifactCategory::LanguageModel, 3000 * MIB)
                .source("google/gemma-2-2b-it")
                .weights("models/blockchain/model.safetensors"),
        ]
    }
}

/// Immutable description of a registered artifact with its resolved loader.
#[derive(Clone)]
pub struct ArtifactDescriptor {
    id: String,
    category: ArtifactCategory,
    source: String,
    footprint_bytes: u64,
    weights: Option<PathBuf>,
    loader: Arc<dyn ArtifactLoader>,
}

impl ArtifactDescriptor {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> ArtifactCategory {
        self.category
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Estimated device footprint. Advisory; admission uses the probe.
    pub fn footprint_bytes(&self) -> u64 {
        self.footprint_bytes
    }

    pub fn weights(&self) -> Option<&Path> {
        self.weights.as_deref()
    }

    pub fn loader(&self) -> &Arc<dyn ArtifactLoader> {
        &self.loader
    }
}

impl fmt::Debug for ArtifactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactDescriptor")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("source", &self.source)
            .field("footprint_bytes", &self.footprint_bytes)
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Artifact id cannot be empty")]
    EmptyId,

    #[error("Duplicate artifact: {0}")]
    DuplicateArtifact(String),

    #[error("No loader registered for category {category} (artifact {artifact})")]
    MissingLoader {
        artifact: String,
        category: ArtifactCategory,
    },
}

/// Process-wide map of artifact identity to descriptor.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    artifacts: HashMap<String, ArtifactDescriptor>,
}

impl ArtifactRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, id: &str) -> Option<&ArtifactDescriptor> {
        self.artifacts.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.artifacts.contains_key(id)
    }

    /// Registered identities, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.artifacts.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Collects loader strategies and artifact specs, then resolves them.
#[derive(Default)]
pub struct RegistryBuilder {
    loaders: HashMap<ArtifactCategory, Arc<dyn ArtifactLoader>>,
    specs: Vec<ArtifactSpec>,
}

impl RegistryBuilder {
    /// Register the loader strategy for a category. Later calls replace earlier ones.
    pub fn with_loader(mut self, category: ArtifactCategory, loader: Arc<dyn ArtifactLoader>) -> Self {
        self.loaders.insert(category, loader);
        self
    }

    /// Register one loader for every category.
    pub fn with_loader_for_all(mut self, loader: Arc<dyn ArtifactLoader>) -> Self {
        for category in ArtifactCategory::ALL {
            self.loaders.insert(category, loader.clone());
        }
        self
    }

    pub fn with_artifact(mut self, spec: ArtifactSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn with_artifacts(mut self, specs: impl IntoIterator<Item = ArtifactSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn build(self) -> Result<ArtifactRegistry, RegistryError> {
        let mut artifacts = HashMap::with_capacity(self.specs.len());

        for spec in self.specs {
            if spec.id.is_empty() {
                return Err(RegistryError::EmptyId);
            }
            if artifacts.contains_key(&spec.id) {
                return Err(RegistryError::DuplicateArtifact(spec.id));
            }
            let loader = self
                .loaders
                .get(&spec.category)
                .cloned()
                .ok_or_else(|| RegistryError::MissingLoader {
                    artifact: spec.id.clone(),
                    category: spec.category,
                })?;

            let descriptor = ArtifactDescriptor {
                id: spec.id.clone(),
                category: spec.category,
                source: spec.source,
                footprint_bytes: spec.footprint_bytes,
                weights: spec.weights,
                loader,
            };
            artifacts.insert(spec.id, descriptor);
        }

        Ok(ArtifactRegistry { artifacts })
    }
}
