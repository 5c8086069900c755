// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Artifact CLI subcommands: status, load, unload, clear, lease.
//!
//! Commands run against an in-process [`Hub`]; each invocation starts from an
//! empty device.

use crate::models::{ArtifactState, LoadOutcome, ManagerStatus};
use crate::Hub;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Run `status`, printing a table or JSON.
pub fn run_status(hub: &Hub, json_output: bool) -> i32 {
    let status = hub.manager().status();
    if json_output {
        return print_json(&status);
    }
    print_status(&status);
    0
}

/// Run `load <id>`. Returns 0 when the artifact is resident afterwards.
pub async fn run_load(hub: &Hub, id: &str, force: bool) -> i32 {
    let outcome = hub.manager().load_outcome(id, force).await;
    print_outcome(&outcome);
    if outcome.loaded {
        0
    } else {
        1
    }
}

/// Run `unload <id>`. Unloading a non-resident artifact is not an error.
pub async fn run_unload(hub: &Hub, id: &str) -> i32 {
    if !hub.manager().registry().contains(id) {
        eprintln!("Unknown artifact: {}", id);
        return 1;
    }
    if hub.manager().unload(id).await {
        println!("Unloaded {}.", id);
    } else {
        println!("{} was not resident.", id);
    }
    0
}

/// Run `clear`.
pub async fn run_clear(hub: &Hub) -> i32 {
    let report = hub.manager().force_clear().await;
    println!(
        "Released {} artifact(s), reclaimed {:.2}GB.",
        report.released,
        report.reclaimed_bytes as f64 / GIB
    );
    println!("{}", hub.manager().snapshot().summary());
    0
}

/// Run `lease <id>`: load, report the live handle, release.
pub async fn run_lease(hub: &Hub, id: &str) -> i32 {
    let manager = hub.manager();
    let code = manager
        .with_leased_artifact(
            id,
            |artifact| async move {
                println!(
                    "Leased {} ({:.2}GB on device).",
                    artifact.id(),
                    artifact.device_bytes() as f64 / GIB
                );
                println!("{}", manager.snapshot().summary());
                0
            },
            |err| {
                eprintln!("Lease failed: {}", err);
                if err.is_retryable() {
                    eprintln!("Free device memory and retry.");
                }
                1
            },
        )
        .await;
    if code == 0 {
        println!("Released {}; resident: {:?}", id, manager.resident_ids());
    }
    code
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            1
        }
    }
}

/// Format and print a [`ManagerStatus`] to stdout.
pub fn print_status(status: &ManagerStatus) {
    println!(
        "Device: {} ({}){}",
        status.device,
        status.device_name,
        if status.accelerator { "" } else { " - CPU mode" }
    );
    println!("{}", status.memory.summary());
    println!();

    println!(
        "{:<24} {:<22} {:<10} {:>12} {:>14}",
        "ARTIFACT", "CATEGORY", "STATE", "SIZE (GB)", "THRESHOLD (GB)"
    );
    println!("{}", "-".repeat(86));

    for a in &status.artifacts {
        let state = match a.state {
            ArtifactState::Absent => "absent",
            ArtifactState::Loading => "loading",
            ArtifactState::Resident => "resident",
        };
        println!(
            "{:<24} {:<22} {:<10} {:>12.2} {:>14.2}",
            truncate(&a.id, 23),
            a.category.as_str(),
            state,
            a.footprint_bytes as f64 / GIB,
            a.threshold_bytes as f64 / GIB,
        );
    }

    println!("{}", "-".repeat(86));
    match status.resident.first() {
        Some(id) => println!("Resident: {}", id),
        None => println!("Resident: none"),
    }
}

fn print_outcome(outcome: &LoadOutcome) {
    match &outcome.error {
        None => println!(
            "Loaded {} in {:.2}s ({:.2}GB allocated).",
            outcome.artifact,
            outcome.load_time_secs,
            outcome.memory_used_bytes as f64 / GIB
        ),
        Some(error) => {
            eprintln!("Failed to load {}: {}", outcome.artifact, error);
            if outcome.retryable {
                eprintln!("Free device memory and retry.");
            }
        }
    }
}

/// Cut `s` to at most `max` characters.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
