//! EmberKV - The Engine Layer of an In-Memory Key-Value Server
//!
//! This is the main entry point. It builds the key space and the event
//! loop, installs the maintenance cron and runs the loop.

use anyhow::Context;
use emberkv::event::EventLoop;
use emberkv::keyspace::{CronConfig, Keyspace, ServerCron};
use emberkv::memory::MemoryTracker;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Number of databases
    dbnum: usize,
    /// Memory limit in bytes (None = unlimited)
    maxmemory: Option<usize>,
    /// Cron interval in milliseconds
    cron_ms: u64,
    /// Stop after this many cron ticks (None = run forever)
    cycles: Option<u64>,
    /// Log at debug level
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dbnum: emberkv::DEFAULT_DBNUM,
            maxmemory: None,
            cron_ms: emberkv::DEFAULT_CRON_MS,
            cycles: None,
            verbose: false,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--dbnum" | "-d" => {
                    config.dbnum = parse_value(&args, i, "--dbnum");
                    if config.dbnum == 0 {
                        eprintln!("Error: --dbnum must be at least 1");
                        std::process::exit(1);
                    }
                    i += 2;
                }
                "--maxmemory" | "-m" => {
                    config.maxmemory = Some(parse_value(&args, i, "--maxmemory"));
                    i += 2;
                }
                "--cron-ms" => {
                    config.cron_ms = parse_value(&args, i, "--cron-ms");
                    i += 2;
                }
                "--cycles" | "-c" => {
                    config.cycles = Some(parse_value(&args, i, "--cycles"));
                    i += 2;
                }
                "--verbose" => {
                    config.verbose = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("EmberKV version {}", emberkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }
}

/// Parses the value following the flag at `args[i]`, exiting on error
fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    };
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}: {}", flag, raw);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
EmberKV - The Engine Layer of an In-Memory Key-Value Server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -d, --dbnum <N>            Number of databases (default: 16)
    -m, --maxmemory <BYTES>    Memory limit in bytes (default: unlimited)
        --cron-ms <MS>         Interval of the maintenance cron (default: 1000)
    -c, --cycles <N>           Stop after N cron ticks (default: run forever)
        --verbose              Log at debug level
    -v, --version              Print version information
    -h, --help                 Print this help message

EXAMPLES:
    emberkv                          # 16 databases, cron every second
    emberkv --cron-ms 100 -c 50      # Fast cron, exit after 50 ticks
    emberkv --maxmemory 1048576      # Refuse allocations past 1 MiB
"#
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("EmberKV v{} starting", emberkv::VERSION);

    // One tracker for the key space and the loop
    let memory = match config.maxmemory {
        Some(limit) => MemoryTracker::with_limit(limit),
        None => MemoryTracker::new(),
    };

    let keyspace = Rc::new(RefCell::new(Keyspace::new(config.dbnum, memory.clone())));
    info!(dbnum = config.dbnum, "Key space initialized");

    let mut el = EventLoop::with_memory(memory.clone());

    let cron_config = CronConfig {
        interval_ms: config.cron_ms,
        max_loops: config.cycles,
        ..Default::default()
    };
    let cron = ServerCron::install(&mut el, Rc::clone(&keyspace), cron_config)
        .context("failed to install the server cron")?;

    el.run();

    let stats = keyspace.borrow().stats();
    info!(
        loops = cron.loops(),
        keys = stats.keys,
        used_memory = memory.used_memory(),
        peak_memory = memory.peak_memory(),
        "Event loop stopped, shutdown complete"
    );
    Ok(())
}
