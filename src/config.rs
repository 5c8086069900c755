//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `HUB_CORE_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `HUB_CORE_DEVICE` | cpu | Device backend (`cuda`, `metal`, `cpu`) |
//! | `HUB_CORE_FORCE_CPU` | false | Run on the host even if a device is configured |
//! | `HUB_CORE_DEVICE_INDEX` | 0 | Accelerator ordinal |
//! | `HUB_CORE_DEVICE_MEMORY` | 8589934592 | Device pool capacity (bytes) |
//! | `HUB_CORE_MEMORY_BUDGET` | 6815744000 | Soft memory ceiling on the host path (bytes) |
//! | `HUB_CORE_THRESHOLD_IMAGE` | 2684354560 | Free memory required for image synthesis (bytes) |
//! | `HUB_CORE_THRESHOLD_VIDEO` | 3221225472 | Free memory required for video synthesis (bytes) |
//! | `HUB_CORE_THRESHOLD_FAST_IMAGE` | 2147483648 | Free memory required for fast image synthesis (bytes) |
//! | `HUB_CORE_THRESHOLD_LANGUAGE` | 3221225472 | Free memory required for language models (bytes) |
//! | `HUB_CORE_BASE_PATH` | . | Root containing `models/` and `weights/` |
//! | `HUB_CORE_LOG_FORMAT` | json | Log format (`json`, `pretty`) |
//! | `HUB_CORE_LOG_LEVEL` | info | Log filter directive |
//! | `HUB_CORE_LOG_FILE` | (stderr) | Append logs to this file instead of stderr |

use std::path::PathBuf;

use serde::Serialize;

use crate::memory::{DeviceConfig, DeviceKind};
use crate::models::{AdmissionThresholds, ArtifactCategory};
use crate::telemetry::{LogConfig, LogFormat};

const MIB: u64 = 1024 * 1024;
const MIN_DEVICE_MEMORY: u64 = 64 * MIB;
const MIN_BUDGET: u64 = MIB;

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub device: DeviceKind,
    pub force_cpu: bool,
    pub effective_device: DeviceKind,
    pub device_index: usize,
    pub device_memory_bytes: u64,
    pub memory_budget_bytes: u64,
    pub threshold_image_bytes: u64,
    pub threshold_video_bytes: u64,
    pub threshold_fast_image_bytes: u64,
    pub threshold_language_bytes: u64,
    pub base_path: String,
    pub log_format: &'static str,
    pub log_level: String,
    pub log_file: Option<String>,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub base_path: PathBuf,
    pub device: DeviceConfig,
    pub memory_budget: u64,
    pub thresholds: AdmissionThresholds,
    pub log: LogConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            device: DeviceConfig::default(),
            memory_budget: 6500 * MIB,
            thresholds: AdmissionThresholds::default(),
            log: LogConfig::default(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`1/true/yes/on`, `0/false/no/off`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Load device configuration from environment.
fn load_device_config() -> DeviceConfig {
    let defaults = DeviceConfig::default();
    let kind = std::env::var("HUB_CORE_DEVICE")
        .ok()
        .and_then(|v| DeviceKind::parse(&v))
        .unwrap_or(defaults.kind);
    let capacity = parse_u64("HUB_CORE_DEVICE_MEMORY", defaults.capacity_bytes);
    DeviceConfig {
        kind,
        device_index: parse_usize("HUB_CORE_DEVICE_INDEX", defaults.device_index),
        capacity_bytes: capacity.max(MIN_DEVICE_MEMORY),
        force_cpu: parse_bool("HUB_CORE_FORCE_CPU", defaults.force_cpu),
    }
}

/// Load admission thresholds from environment.
fn load_thresholds() -> AdmissionThresholds {
    let d = AdmissionThresholds::default();
    [
        (ArtifactCategory::ImageSynthesis, "HUB_CORE_THRESHOLD_IMAGE"),
        (ArtifactCategory::VideoSynthesis, "HUB_CORE_THRESHOLD_VIDEO"),
        (ArtifactCategory::FastImageSynthesis, "HUB_CORE_THRESHOLD_FAST_IMAGE"),
        (ArtifactCategory::LanguageModel, "HUB_CORE_THRESHOLD_LANGUAGE"),
    ]
    .into_iter()
    .fold(d, |acc, (category, key)| {
        acc.with(category, parse_u64(key, d.for_category(category)))
    })
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let format = std::env::var("HUB_CORE_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or(defaults.format);
    let level = std::env::var("HUB_CORE_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.level);
    let output_path = std::env::var("HUB_CORE_LOG_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    LogConfig {
        format,
        level,
        output_path,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let defaults = EnvConfig::default();
    let base_path = std::env::var("HUB_CORE_BASE_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(defaults.base_path);
    let memory_budget = parse_u64("HUB_CORE_MEMORY_BUDGET", defaults.memory_budget).max(MIN_BUDGET);

    EnvConfig {
        base_path,
        device: load_device_config(),
        memory_budget,
        thresholds: load_thresholds(),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            device: self.device.kind,
            force_cpu: self.device.force_cpu,
            effective_device: self.device.effective_kind(),
            device_index: self.device.device_index,
            device_memory_bytes: self.device.capacity_bytes,
            memory_budget_bytes: self.memory_budget,
            threshold_image_bytes: self.thresholds.for_category(ArtifactCategory::ImageSynthesis),
            threshold_video_bytes: self.thresholds.for_category(ArtifactCategory::VideoSynthesis),
            threshold_fast_image_bytes: self
                .thresholds
                .for_category(ArtifactCategory::FastImageSynthesis),
            threshold_language_bytes: self.thresholds.for_category(ArtifactCategory::LanguageModel),
            base_path: self.base_path.display().to_string(),
            log_format: self.log.format.as_str(),
            log_level: self.log.level.clone(),
            log_file: self
                .log
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "HUB_CORE_DEVICE",
        "HUB_CORE_FORCE_CPU",
        "HUB_CORE_DEVICE_INDEX",
        "HUB_CORE_DEVICE_MEMORY",
        "HUB_CORE_MEMORY_BUDGET",
        "HUB_CORE_THRESHOLD_IMAGE",
        "HUB_CORE_THRESHOLD_VIDEO",
        "HUB_CORE_THRESHOLD_FAST_IMAGE",
        "HUB_CORE_THRESHOLD_LANGUAGE",
        "HUB_CORE_BASE_PATH",
        "HUB_CORE_LOG_FORMAT",
        "HUB_CORE_LOG_LEVEL",
        "HUB_CORE_LOG_FILE",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.base_path, PathBuf::from("."));
        assert_eq!(cfg.device.kind, DeviceKind::Cpu);
        assert!(!cfg.device.force_cpu);
        assert_eq!(cfg.device.device_index, 0);
        assert_eq!(cfg.device.capacity_bytes, 8 * 1024 * MIB);
        assert_eq!(cfg.memory_budget, 6500 * MIB);
        assert_eq!(
            cfg.thresholds.for_category(ArtifactCategory::ImageSynthesis),
            2560 * MIB
        );
        assert_eq!(
            cfg.thresholds.for_category(ArtifactCategory::FastImageSynthesis),
            2048 * MIB
        );
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HUB_CORE_DEVICE", "cuda");
        std::env::set_var("HUB_CORE_DEVICE_INDEX", "1");
        std::env::set_var("HUB_CORE_DEVICE_MEMORY", "5368709120"); // 5 GiB
        std::env::set_var("HUB_CORE_THRESHOLD_VIDEO", "1073741824");
        std::env::set_var("HUB_CORE_BASE_PATH", "/srv/hub");
        std::env::set_var("HUB_CORE_LOG_FORMAT", "pretty");
        std::env::set_var("HUB_CORE_LOG_LEVEL", "hub_core=debug");
        std::env::set_var("HUB_CORE_LOG_FILE", "/var/log/hub-core.log");
        let cfg = load();
        assert_eq!(cfg.device.kind, DeviceKind::Cuda);
        assert_eq!(cfg.device.effective_kind(), DeviceKind::Cuda);
        assert_eq!(cfg.device.device_index, 1);
        assert_eq!(cfg.device.capacity_bytes, 5 * 1024 * MIB);
        assert_eq!(
            cfg.thresholds.for_category(ArtifactCategory::VideoSynthesis),
            1024 * MIB
        );
        assert_eq!(cfg.base_path, PathBuf::from("/srv/hub"));
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.log.level, "hub_core=debug");
        assert_eq!(cfg.log.output_path, Some(PathBuf::from("/var/log/hub-core.log")));
        clear_env_vars();
    }

    #[test]
    fn test_force_cpu_wins_over_device() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HUB_CORE_DEVICE", "cuda");
        std::env::set_var("HUB_CORE_FORCE_CPU", "true");
        let cfg = load();
        assert_eq!(cfg.device.kind, DeviceKind::Cuda);
        assert_eq!(cfg.device.effective_kind(), DeviceKind::Cpu);
        assert_eq!(cfg.effective_config().effective_device, DeviceKind::Cpu);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HUB_CORE_DEVICE", "tpu");
        std::env::set_var("HUB_CORE_FORCE_CPU", "maybe");
        std::env::set_var("HUB_CORE_DEVICE_MEMORY", "lots");
        std::env::set_var("HUB_CORE_THRESHOLD_LANGUAGE", "-1");
        std::env::set_var("HUB_CORE_LOG_FORMAT", "xml");
        let cfg = load();
        assert_eq!(cfg.device.kind, DeviceKind::Cpu);
        assert!(!cfg.device.force_cpu);
        assert_eq!(cfg.device.capacity_bytes, 8 * 1024 * MIB);
        assert_eq!(
            cfg.thresholds.for_category(ArtifactCategory::LanguageModel),
            3 * 1024 * MIB
        );
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HUB_CORE_DEVICE_MEMORY", "0");
        std::env::set_var("HUB_CORE_MEMORY_BUDGET", "0");
        let cfg = load();
        assert!(cfg.device.capacity_bytes >= 64 * MIB, "capacity must have floor");
        assert!(cfg.memory_budget >= MIB, "budget must have floor");
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_serializes() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load().effective_config();
        assert_eq!(eff.log_format, "json");
        assert_eq!(eff.threshold_video_bytes, 3 * 1024 * MIB);
        let json = serde_json::to_value(&eff).unwrap();
        assert_eq!(json["device"], "cpu");
        assert_eq!(json["memory_budget_bytes"], 6500 * MIB);
    }
}
