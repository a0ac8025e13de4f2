//! eventbench: contention throughput benchmark.
//!
//! Prints one `"<n> events/sec"` line per report interval on standard output
//! until interrupted with Ctrl-C (or until `--duration` elapses). Logs go to
//! standard error, filtered by `RUST_LOG` (default `info`).

mod commands;

use std::process;

use eventbench_core::CancellationToken;
use eventbench_engine::run_target;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use commands::{build_cli, resolve_config};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();
    let config = match resolve_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!(target: "eventbench::run", error = %e, "invalid configuration");
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_token.cancel() {
            info!(target: "eventbench::run", "interrupt received, shutting down");
        }
    }) {
        error!(target: "eventbench::run", error = %e, "failed to install interrupt handler");
        process::exit(1);
    }

    match run_target(&config, &cancel, Box::new(std::io::stdout())) {
        Ok(summary) => {
            info!(
                target: "eventbench::run",
                strategy = %summary.strategy,
                successes = summary.successes,
                failures = summary.failures,
                "done"
            );
        }
        Err(e) => {
            error!(target: "eventbench::run", error = %e, "benchmark aborted");
            process::exit(1);
        }
    }
}
