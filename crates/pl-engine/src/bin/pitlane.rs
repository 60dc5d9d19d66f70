//! Pitlane command-line driver.
//!
//! Starts a session on in-memory stores, replays a JSON-lines telemetry file
//! through it and prints the final status.
//!
//! ```bash
//! pitlane --vehicle mx5 --track spa --telemetry laps.jsonl --export best.json
//! ```
//!
//! Each telemetry line is one submission:
//! `{"setup_id": 1, "lap_time": 92.4, "metric_map": {"traction": 7}}`.

use anyhow::{Context, Result};
use clap::Parser;
use pl_engine::{init_logging, ConfigLoader, Orchestrator, Stores};
use pl_optimizer::VehicleCatalog;
use pl_types::TelemetryEvent;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pitlane", version)]
#[command(about = "Replay lap telemetry through a vehicle setup optimization session")]
struct Args {
    /// Vehicle id from the catalog
    #[arg(long, env = "PITLANE_VEHICLE")]
    vehicle: String,

    /// Track id
    #[arg(long, env = "PITLANE_TRACK")]
    track: String,

    /// JSON-lines telemetry file
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Configuration file (defaults to ./pitlane.json plus PITLANE_* env)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra vehicle definitions, merged over the built-in catalog
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Write the best setup artifact here
    #[arg(long)]
    export: Option<PathBuf>,
}

fn load_catalog(path: Option<&PathBuf>) -> Result<VehicleCatalog> {
    let mut catalog = VehicleCatalog::builtin();
    if let Some(path) = path {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let extra = VehicleCatalog::from_json(&json)
            .with_context(|| format!("Invalid catalog {}", path.display()))?;
        catalog.extend(extra);
    }
    Ok(catalog)
}

fn replay(orchestrator: &Orchestrator, path: &PathBuf) -> Result<usize> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open telemetry {}", path.display()))?;
    let mut accepted = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read telemetry line")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: TelemetryEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping malformed telemetry");
                continue;
            }
        };
        match orchestrator.ingest(&event) {
            Ok(outcome) => {
                info!(
                    line = index + 1,
                    setup_id = outcome.setup_id,
                    score = outcome.score,
                    next_setup_id = ?outcome.next_setup_id,
                    "telemetry ingested"
                );
                accepted += 1;
            }
            Err(err) => warn!(line = index + 1, error = %err, "telemetry rejected"),
        }
    }
    Ok(accepted)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let catalog = load_catalog(args.catalog.as_ref())?;
    let orchestrator =
        Orchestrator::from_config(Stores::in_memory(), &config).with_catalog(catalog);

    let session_id = orchestrator
        .start(&args.vehicle, &args.track, config.optimization.clone())
        .context("Failed to start optimization session")?;

    if let Some(path) = &args.telemetry {
        let accepted = replay(&orchestrator, path)?;
        info!(session_id, accepted, "replay finished");
    }

    let status = orchestrator.status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    if let Some(path) = &args.export {
        match orchestrator.best_setups(&args.vehicle, &args.track, 1).first() {
            Some(best) => {
                let artifact = serde_json::to_string_pretty(&best.to_artifact())?;
                fs::write(path, artifact)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(setup_id = best.id, path = %path.display(), "best setup exported");
            }
            None => warn!("no scored setup to export"),
        }
    }

    orchestrator.stop().context("Failed to stop session")?;
    Ok(())
}
