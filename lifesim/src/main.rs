//! Village life simulation runner.
//!
//! Builds a world from the medieval preset (or a JSON config), simulates
//! the configured number of days and writes a chronicle.
//!
//! ```bash
//! cargo run -p lifesim -- --days 5 --seed 42 --offline
//! ```
//!
//! Ctrl-C stops after the last completed day; the chronicle is still written.

use clap::Parser;
use claude::Claude;
use lifesim_core::chronicle::{write_chronicle, ClaudeNarrator, Narrator};
use lifesim_core::oracle::{ClaudeOracle, RosterSource};
use lifesim_core::{SimConfig, SimError, Simulation};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lifesim", about = "Simulate a small medieval world day by day")]
struct Args {
    /// JSON config file; missing fields fall back to the medieval preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of days to simulate
    #[arg(long)]
    days: Option<u32>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Never call the API (no social decisions, local chronicle)
    #[arg(long)]
    offline: bool,

    /// Ask the model for a fresh set of locations and NPCs
    #[arg(long)]
    generate_roster: bool,

    /// Where to write the world snapshot after each day
    #[arg(long)]
    state: Option<PathBuf>,

    /// Where to write the chronicle
    #[arg(long)]
    chronicle: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    run(args).await.map_err(Into::into)
}

async fn run(args: Args) -> Result<(), SimError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path).await?,
        None => SimConfig::default(),
    };
    if let Some(days) = args.days {
        config.max_days = days;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if args.state.is_some() {
        config.state_path = args.state.clone();
    }
    if args.chronicle.is_some() {
        config.chronicle_path = args.chronicle.clone();
    }
    if args.generate_roster {
        config.oracle.generate_roster = true;
    }
    config.validate()?;

    let client = if args.offline {
        None
    } else {
        match Claude::from_env() {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "no API client, running offline");
                None
            }
        }
    };

    if config.oracle.generate_roster {
        match &client {
            Some(client) => {
                let oracle = ClaudeOracle::new(client.clone()).with_config(&config.oracle);
                let generated = oracle
                    .generate_roster(config.oracle.location_count, config.oracle.npc_count)
                    .await;
                if let Some(roster) = generated {
                    config = roster.apply_to(&config);
                } else {
                    tracing::warn!("using the configured roster");
                }
            }
            None => tracing::warn!("roster generation needs the API, using the configured roster"),
        }
    }

    let mut sim = Simulation::new(config.clone())?;
    if let Some(client) = &client {
        sim = sim.with_oracle(ClaudeOracle::new(client.clone()).with_config(&config.oracle));
    }

    tracing::info!(days = config.max_days, npcs = sim.world().npcs.len(), "starting simulation");

    let report = tokio::select! {
        report = sim.run() => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    match report {
        Some(report) => {
            if !report.persist_failures.is_empty() {
                tracing::warn!(
                    failures = report.persist_failures.len(),
                    "some snapshots could not be written"
                );
            }
        }
        None => {
            tracing::warn!(
                day = sim.world().current_day,
                "interrupted, stopping after the last completed day"
            );
            sim.snapshot().await?;
        }
    }

    if let Some(path) = &config.chronicle_path {
        let narrator = client.map(|client| ClaudeNarrator::new(client).with_config(&config.oracle));
        write_chronicle(
            sim.world(),
            narrator.as_ref().map(|n| n as &dyn Narrator),
            path,
        )
        .await?;
    }

    let status = sim.status();
    println!(
        "Day {}: {}/{} NPCs alive",
        status.day, status.alive_npcs, status.total_npcs
    );
    for (location, count) in &status.locations {
        println!("  {location}: {count}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "lifesim",
            "--days",
            "4",
            "--seed",
            "9",
            "--offline",
            "--generate-roster",
            "--state",
            "out/state.json",
        ]);
        assert_eq!(args.days, Some(4));
        assert_eq!(args.seed, Some(9));
        assert!(args.offline);
        assert!(args.generate_roster);
        assert_eq!(args.state, Some(PathBuf::from("out/state.json")));
        assert!(args.config.is_none());
        assert!(args.chronicle.is_none());
    }

    #[tokio::test]
    async fn test_offline_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        let chronicle = dir.path().join("chronicles.md");

        let args = Args {
            config: None,
            days: Some(2),
            seed: Some(5),
            offline: true,
            generate_roster: false,
            state: Some(state.clone()),
            chronicle: Some(chronicle.clone()),
        };
        run(args).await.unwrap();

        assert!(state.exists());
        let text = std::fs::read_to_string(&chronicle).unwrap();
        assert!(text.contains("**Days simulated**: 2"));
    }
}
