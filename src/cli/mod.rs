// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! CLI module for Hub-CORE administrative commands.
//!
//! Commands run in-process against a [`crate::Hub`] built from the
//! environment. There is no server to connect to.
//!
//! ## Usage
//!
//! ```bash
//! hub-core status --json          # Device, memory and per-artifact state
//! hub-core load generative_art    # Load one artifact, evicting others
//! hub-core lease blockchain       # Load, report, and release
//! hub-core health                 # Exit 0 unless unhealthy
//! ```

pub mod config_cmd;
pub mod health;
pub mod models_cmd;

pub use health::run_health;
pub use models_cmd::{run_clear, run_lease, run_load, run_status, run_unload};
