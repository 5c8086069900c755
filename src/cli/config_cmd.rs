// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables.

use tracing_subscriber::EnvFilter;

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::models::ArtifactSpec;

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&EnvConfig::default().effective_config());
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let warnings = validate(&config::load());
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Collect configuration warnings without printing them.
pub fn validate(env: &EnvConfig) -> Vec<String> {
    let cfg = env.effective_config();
    let mut warnings = Vec::new();

    if cfg.effective_device.is_accelerator() {
        let smallest = env.thresholds.smallest();
        if cfg.device_memory_bytes < smallest {
            warnings.push(format!(
                "HUB_CORE_DEVICE_MEMORY ({}) is below every admission threshold (smallest {}); no artifact can load",
                cfg.device_memory_bytes, smallest
            ));
        }
    }

    for (key, value) in [
        ("HUB_CORE_THRESHOLD_IMAGE", cfg.threshold_image_bytes),
        ("HUB_CORE_THRESHOLD_VIDEO", cfg.threshold_video_bytes),
        ("HUB_CORE_THRESHOLD_FAST_IMAGE", cfg.threshold_fast_image_bytes),
        ("HUB_CORE_THRESHOLD_LANGUAGE", cfg.threshold_language_bytes),
    ] {
        if value == 0 {
            warnings.push(format!("{} is 0; admission is never refused", key));
        }
    }

    let largest = ArtifactSpec::defaults()
        .iter()
        .map(|s| s.footprint_bytes)
        .max()
        .unwrap_or(0);
    if !cfg.effective_device.is_accelerator() && cfg.memory_budget_bytes < largest {
        warnings.push(format!(
            "HUB_CORE_MEMORY_BUDGET ({}) is below the largest artifact footprint ({})",
            cfg.memory_budget_bytes, largest
        ));
    }

    if EnvFilter::try_new(&cfg.log_level).is_err() {
        warnings.push(format!("HUB_CORE_LOG_LEVEL '{}' is not a valid filter", cfg.log_level));
    }

    if !["models", "weights"]
        .iter()
        .any(|dir| env.base_path.join(dir).is_dir())
    {
        warnings.push(format!(
            "HUB_CORE_BASE_PATH ({}) has no models/ or weights/ directory",
            cfg.base_path
        ));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("HUB_CORE_DEVICE={}", cfg.device.to_string().to_lowercase());
    println!("HUB_CORE_FORCE_CPU={}", cfg.force_cpu);
    println!("HUB_CORE_DEVICE_INDEX={}", cfg.device_index);
    println!("HUB_CORE_DEVICE_MEMORY={}", cfg.device_memory_bytes);
    println!("HUB_CORE_MEMORY_BUDGET={}", cfg.memory_budget_bytes);
    println!("HUB_CORE_THRESHOLD_IMAGE={}", cfg.threshold_image_bytes);
    println!("HUB_CORE_THRESHOLD_VIDEO={}", cfg.threshold_video_bytes);
    println!("HUB_CORE_THRESHOLD_FAST_IMAGE={}", cfg.threshold_fast_image_bytes);
    println!("HUB_CORE_THRESHOLD_LANGUAGE={}", cfg.threshold_language_bytes);
    println!("HUB_CORE_BASE_PATH={}", cfg.base_path);
    println!("HUB_CORE_LOG_FORMAT={}", cfg.log_format);
    println!("HUB_CORE_LOG_LEVEL={}", cfg.log_level);
    println!("HUB_CORE_LOG_FILE={}", cfg.log_file.as_deref().unwrap_or(""));
    println!("# effective device: {}", cfg.effective_device);
}
