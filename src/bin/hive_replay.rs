//! HiveWatch replay tool.
//!
//! Runs the alert service over an in-memory store, replays JSON-lines
//! readings from stdin and logs every notification it would have sent.
//!
//! ```text
//! hive-replay --config hivewatch.toml --seed seed.json --monitor H1 < readings.jsonl
//! ```

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hivewatch::monitor::LogChannel;
use hivewatch::store::InMemoryStore;
use hivewatch::{HiveConfig, HiveError, HiveMonitor, HiveResult};

#[derive(Debug, Parser)]
#[command(name = "hive-replay", about = "Replay hive readings through the alert pipeline")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, env = "HIVEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file with `hives` and `users` records to preload.
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Hive to give a dedicated subscription. Repeatable.
    #[arg(long = "monitor", value_name = "HIVE_ID")]
    monitor: Vec<String>,

    /// Inhibition to activate before replay, as `HIVE_ID:HOURS`. Repeatable.
    #[arg(long = "inhibit", value_name = "HIVE_ID:HOURS", value_parser = parse_inhibit)]
    inhibit: Vec<(String, i64)>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Seed {
    hives: BTreeMap<String, Value>,
    users: BTreeMap<String, Value>,
}

fn parse_inhibit(raw: &str) -> Result<(String, i64), String> {
    let (id, hours) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HIVE_ID:HOURS, got '{raw}'"))?;
    let hours = hours
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid hours in '{raw}': {e}"))?;
    Ok((id.trim().to_string(), hours))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run(args: &Args) -> HiveResult<()> {
    let config = match &args.config {
        Some(path) => HiveConfig::from_file(path)?,
        None => HiveConfig::default(),
    };

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &args.seed {
        load_seed(&store, &config, path)?;
    }

    let monitor = HiveMonitor::new(config, store.clone(), Arc::new(LogChannel))?;
    monitor.start();
    for id in &args.monitor {
        monitor.start_monitoring(id)?;
    }
    for (id, hours) in &args.inhibit {
        monitor.activate_inhibition(id, *hours)?;
    }

    let readings_path = monitor.config().store.readings_path.clone();
    let mut replayed = 0_u64;
    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line.map_err(|e| HiveError::config(format!("failed to read stdin: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping malformed reading");
                continue;
            }
        };
        match monitor.store().add(&readings_path, value) {
            Ok(_) => replayed += 1,
            Err(e) => warn!(line = index + 1, error = %e, "failed to store reading"),
        }
    }

    store.flush();
    info!(
        replayed,
        processed = monitor.pipeline().processed(),
        suppressed = monitor.pipeline().suppressed(),
        sent = monitor.pipeline().dispatcher().sent(),
        "replay finished"
    );
    monitor.shutdown();
    Ok(())
}

fn load_seed(store: &InMemoryStore, config: &HiveConfig, path: &Path) -> HiveResult<()> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| HiveError::config(format!("failed to read {}: {e}", path.display())))?;
    let seed: Seed = serde_json::from_str(&raw)
        .map_err(|e| HiveError::config(format!("invalid seed {}: {e}", path.display())))?;

    for (id, data) in seed.hives {
        store.seed(&config.store.hives_path, &id, data)?;
    }
    for (id, data) in seed.users {
        store.seed(&config.store.users_path, &id, data)?;
    }
    info!(path = %path.display(), "seed loaded");
    Ok(())
}
