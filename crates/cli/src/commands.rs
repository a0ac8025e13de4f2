//! Clap command definition and flag merging.

use clap::{value_parser, Arg, ArgMatches, Command};
use eventbench_core::Result;
use eventbench_engine::{BenchConfig, StrategyChoice};
use std::path::PathBuf;

/// Build the command line.
pub fn build_cli() -> Command {
    Command::new("eventbench")
        .about("Contention throughput benchmark for idempotent event-record writes")
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .help("Number of concurrent workers (default: 50)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("conns")
                .long("conns")
                .help("Maximum backend connections (default: 24)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("events")
                .short('n')
                .long("events")
                .help("Number of distinct event keys (default: 1000)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("target")
                .short('d')
                .long("target")
                .help("Backend target: memory, sqlite:<path>, a postgres connection string or mysql://..."),
        )
        .arg(
            Arg::new("strategy")
                .long("strategy")
                .help("Persistence strategy (default: auto)")
                .value_parser(["auto", "transactional", "upsert"]),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML config file; flags override its values")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .help("Stop after this many seconds instead of waiting for Ctrl-C")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("report-interval-ms")
                .long("report-interval-ms")
                .help("Throughput report period in milliseconds (default: 1000)")
                .value_parser(value_parser!(u64)),
        )
}

/// Resolve the effective configuration: defaults < config file < flags.
pub fn resolve_config(matches: &ArgMatches) -> Result<BenchConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };

    if let Some(v) = matches.get_one::<usize>("concurrency") {
        config.concurrency = *v;
    }
    if let Some(v) = matches.get_one::<usize>("conns") {
        config.connections = *v;
    }
    if let Some(v) = matches.get_one::<usize>("events") {
        config.event_count = *v;
    }
    if let Some(v) = matches.get_one::<String>("target") {
        config.backend_target = v.clone();
    }
    if let Some(v) = matches.get_one::<String>("strategy") {
        config.strategy = v.parse::<StrategyChoice>()?;
    }
    if let Some(v) = matches.get_one::<u64>("duration") {
        config.duration_secs = Some(*v);
    }
    if let Some(v) = matches.get_one::<u64>("report-interval-ms") {
        config.report_interval_ms = *v;
    }

    config.validate()?;
    Ok(config)
}
