// Copyright 2024-2026 Hub-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Health CLI subcommand.

use crate::health::{HealthReport, HealthState};
use crate::Hub;

/// Run `health`. Exits 0 when healthy or degraded, 1 when unhealthy.
pub fn run_health(hub: &Hub, json_output: bool) -> i32 {
    let report = hub.health();
    if json_output {
        super::models_cmd::print_json(&report);
    } else {
        print_health(&report);
    }
    exit_code(report.state)
}

fn exit_code(state: HealthState) -> i32 {
    match state {
        HealthState::Healthy | HealthState::Degraded => 0,
        HealthState::Unhealthy => 1,
    }
}

fn print_health(report: &HealthReport) {
    println!("State:    {:?}", report.state);
    println!("Device:   {}", report.device);
    match report.resident.first() {
        Some(id) => println!("Resident: {}", id),
        None => println!("Resident: none"),
    }
    if report.free_bytes == u64::MAX {
        println!("Free:     unconstrained");
    } else {
        println!("Free:     {} bytes", report.free_bytes);
    }
    if let Some(note) = &report.note {
        println!("Note:     {}", note);
    }
    println!("Uptime:   {}s", report.uptime_secs);
}
