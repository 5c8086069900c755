//! Hub-CORE entry point.
//!
//! Administrative CLI over an in-process hub:
//! - Configuration loading from `HUB_CORE_*`
//! - Structured logging to stderr or `HUB_CORE_LOG_FILE`
//! - Artifact lifecycle commands
//!
//! ## CLI Subcommands
//!
//! - `hub-core status [--json]` - Device and artifact status
//! - `hub-core load <id> [--force]` - Load an artifact
//! - `hub-core unload <id>` - Unload an artifact
//! - `hub-core clear` - Evict everything and reclaim device memory
//! - `hub-core lease <id>` - Load, report, and release an artifact
//! - `hub-core health [--json]` - Health check (exit 0/1)
//! - `hub-core config show|defaults|validate` - Configuration

use std::process::ExitCode;

use hub_core::cli::{config_cmd, run_clear, run_health, run_lease, run_load, run_status, run_unload};
use hub_core::config as hub_config;
use hub_core::telemetry::init_logging;
use hub_core::{Hub, HubConfig};

const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let flag = |name: &str| args.iter().skip(2).any(|a| a == name);

    match command {
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("hub-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::from(EXIT_USAGE)
                }
            }
        }
        "status" | "load" | "unload" | "clear" | "lease" | "health" => {
            let hub = match start_hub() {
                Ok(hub) => hub,
                Err(code) => return code,
            };
            match command {
                "status" => exit(run_status(&hub, flag("--json"))),
                "health" => exit(run_health(&hub, flag("--json"))),
                "clear" => exit(run_clear(&hub).await),
                _ => {
                    let Some(id) = args.get(2).filter(|a| !a.starts_with("--")) else {
                        eprintln!("Missing artifact id for '{}'", command);
                        print_command_help(command);
                        return ExitCode::from(EXIT_USAGE);
                    };
                    match command {
                        "load" => exit(run_load(&hub, id, flag("--force")).await),
                        "unload" => exit(run_unload(&hub, id).await),
                        _ => exit(run_lease(&hub, id).await),
                    }
                }
            }
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn start_hub() -> Result<Hub, ExitCode> {
    let env = hub_config::load();
    if let Err(e) = init_logging(&env.log) {
        eprintln!("Logging disabled: {}", e);
    }
    Hub::new(HubConfig::from_env(&env)).map_err(|e| {
        eprintln!("Failed to build artifact registry: {}", e);
        ExitCode::FAILURE
    })
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "hub-core - accelerator artifact lifecycle manager v{}

USAGE:
    hub-core [COMMAND] [OPTIONS]

COMMANDS:
    status       Show device memory and per-artifact state
    load         Load an artifact, evicting any other
    unload       Unload an artifact
    clear        Evict everything and reclaim device memory
    lease        Load an artifact, report it, and release it
    health       Health check (exit 0 unless unhealthy)
    config       Manage configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    hub-core status --json
    hub-core load generative_art
    hub-core load blockchain --force
    hub-core lease streaming_generative
    hub-core config validate

ENVIRONMENT:
    HUB_CORE_DEVICE        Device backend: cuda, metal, cpu (default: cpu)
    HUB_CORE_FORCE_CPU     Run on the host regardless of HUB_CORE_DEVICE
    HUB_CORE_BASE_PATH     Directory containing models/ and weights/
    HUB_CORE_LOG_FORMAT    json or pretty (default: json)
    HUB_CORE_LOG_LEVEL     Log filter (default: info)
    HUB_CORE_LOG_FILE      Append logs to a file instead of stderr

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Usage error",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "status" => eprintln!(
            "hub-core status [--json]

Show the device, a fresh memory reading, and every registered artifact
with its category, state, footprint and admission threshold."
        ),
        "load" => eprintln!(
            "hub-core load <id> [--force]

Load <id>. Any other resident artifact is evicted and device memory is
cleared first. Loading is refused when free memory is below the artifact
category's threshold. --force reloads an already resident artifact."
        ),
        "unload" => eprintln!(
            "hub-core unload <id>

Unload <id> and reclaim device memory. A non-resident artifact is a no-op."
        ),
        "clear" => eprintln!(
            "hub-core clear

Evict every resident artifact, reclaim cached device memory and reset
allocator statistics."
        ),
        "lease" => eprintln!(
            "hub-core lease <id>

Load <id>, report the live handle, then unload it."
        ),
        "health" => eprintln!(
            "hub-core health [--json]

Report Healthy, Degraded (idle with less free memory than any category
needs) or Unhealthy (memory probe failed). Exit 1 only when Unhealthy."
        ),
        "config" => eprintln!(
            "hub-core config <show|defaults|validate>

show      Print effective configuration
defaults  Print default configuration
validate  Check configuration (exit 1 on warnings)"
        ),
        other => {
            eprintln!("No help for '{}'.", other);
            print_usage();
        }
    }
}
