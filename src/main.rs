//! Shopcore command line
//!
//! Generates configuration, runs a local settlement simulation and prints
//! ledger history from a configured store.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use shopcore::{
    config::generate_sample_config, CauseKind, Collaborators, CollectingNotifier, ConfigLoader, Credits,
    DirectChange, EconomyMutator, Identity, InMemoryEconomy, IntervalRewardTracker, ItemInfo, LedgerAction,
    LedgerEntry, LedgerStore, ShopConfig, ShopEngine, ShopMetrics, ShopResult, StaticDirectory,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Shopcore ledger and reward settlement CLI
#[derive(Parser)]
#[command(name = "shopcore")]
#[command(about = "Credit ledger and deferred reward settlement engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration as TOML
    SampleConfig {
        /// Output path
        #[arg(default_value = "shopcore.toml")]
        path: String,
    },

    /// Run the engine against an in-memory economy with random rewards
    Simulate {
        /// Simulation length in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Number of simulated players
        #[arg(short, long, default_value = "8")]
        players: u64,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Ledger entries to print afterwards
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print recent ledger entries, newest first
    Recent {
        /// Only entries for this identity
        #[arg(short, long)]
        identity: Option<u64>,

        /// Maximum entries to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ShopResult<()> {
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> ShopResult<()> {
    match cli.command {
        Commands::SampleConfig { path } => {
            generate_sample_config(&path)?;
            println!("Wrote default configuration to {}", path);
            Ok(())
        }
        Commands::Simulate {
            seconds,
            players,
            seed,
            limit,
        } => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config, cli.verbose);
            run_simulation(config, seconds, players.max(1), seed, limit).await
        }
        Commands::Recent { identity, limit } => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config, cli.verbose);
            print_recent(config, identity.map(Identity), limit)
        }
    }
}

fn load_config(path: Option<&Path>) -> ShopResult<ShopConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_path(path);
    }
    loader.load()
}

fn init_logging(config: &ShopConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.monitoring.log_level.as_filter()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("shopcore={}", level))),
        )
        .init();
}

async fn run_simulation(
    config: ShopConfig,
    seconds: u64,
    players: u64,
    seed: Option<u64>,
    limit: usize,
) -> ShopResult<()> {
    let economy = Arc::new(InMemoryEconomy::new());
    let notifier = Arc::new(CollectingNotifier::new());
    let directory: StaticDirectory = (1..=players).map(|id| (Identity(id), format!("player{}", id))).collect();

    let collaborators = Collaborators::new(economy.clone(), notifier.clone(), Arc::new(directory));
    let engine = ShopEngine::new(config.clone(), collaborators)?;
    engine.start();

    let online: HashSet<Identity> = (1..=players).map(Identity).collect();

    // One simulated minute per second of wall time
    let playtime = Arc::new(IntervalRewardTracker::new(CauseKind::playtime(), Credits::from_whole(10), 2));
    {
        let playtime = playtime.clone();
        let aggregator = engine.aggregator().clone();
        let online = online.clone();
        engine.schedule_recurring("playtime", Duration::from_secs(1), move |ticket| {
            ticket.run(|| playtime.tick(&aggregator, &online));
        });
    }

    println!(
        "🚀 Simulating {} players for {}s, ledger {}",
        players,
        seconds,
        engine.ledger_mode()
    );

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let causes = [CauseKind::kill(), CauseKind::headshot(), CauseKind::assist()];
    let deadline = Instant::now() + Duration::from_secs(seconds);

    while Instant::now() < deadline {
        let player = Identity(rng.gen_range(1..=players));

        if rng.gen_bool(0.05) {
            let price = Credits::from_whole(rng.gen_range(1..=5));
            let purchase = DirectChange::new(player, LedgerAction::Purchase, price)
                .with_item(ItemInfo::new("smoke_trail").with_display_name("Smoke Trail"));
            if let Err(e) = engine.record_direct(purchase) {
                info!("Purchase for {} refused: {}", player, e);
            }
        } else {
            let cause = causes[rng.gen_range(0..causes.len())].clone();
            let amount = Credits::from_hundredths(rng.gen_range(50..=500));
            engine.queue_reward(player, cause, amount);
        }

        sleep(Duration::from_millis(20)).await;
    }

    let last = engine.flush_now();
    engine.unload();

    println!();
    println!(
        "Final flush settled {} identities, {} notices delivered",
        last.identities_settled,
        notifier.notices().len()
    );
    for id in 1..=players {
        let identity = Identity(id);
        println!("  player{:<4} balance {:>10}", id, economy.get_credits(identity).to_string());
    }

    println!();
    print_entries(&engine.get_recent(limit));

    if config.monitoring.enable_metrics {
        println!();
        print!("{}", engine.metrics().render());
    }

    Ok(())
}

fn print_recent(config: ShopConfig, identity: Option<Identity>, limit: usize) -> ShopResult<()> {
    let store = LedgerStore::open(&config.ledger, ShopMetrics::new())?;

    let entries = match identity {
        Some(identity) => store.get_recent_for_identity(identity, limit),
        None => store.get_recent(limit),
    };

    if entries.is_empty() {
        println!("No ledger entries in {}", store.mode());
        return Ok(());
    }

    print_entries(&entries);
    Ok(())
}

fn print_entries(entries: &[LedgerEntry]) {
    println!(
        "{:>6}  {:<19}  {:<20}  {:<16}  {:<8}  {:>10}  {:>10}  {}",
        "seq", "time", "identity", "name", "action", "amount", "balance", "item"
    );

    for entry in entries {
        let time = DateTime::<Utc>::from_timestamp(entry.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        let item = match (&entry.item_id, &entry.item_display_name) {
            (Some(id), Some(name)) => format!("{} ({})", name, id),
            (Some(id), None) => id.clone(),
            _ => String::new(),
        };

        println!(
            "{:>6}  {:<19}  {:<20}  {:<16}  {:<8}  {:>10}  {:>10}  {}",
            entry.sequence_id,
            time,
            entry.identity.to_string(),
            entry.display_name,
            entry.action.to_string(),
            entry.amount.to_string(),
            entry.balance_after.to_string(),
            item
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_broken_config(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[ledger\nbackend = ").unwrap();
        path
    }

    #[tokio::test]
    async fn test_sample_config_ignores_broken_existing_config() {
        let dir = TempDir::new().unwrap();
        let broken = write_broken_config(&dir);
        let out = dir.path().join("fresh.toml");

        let cli = Cli::try_parse_from([
            "shopcore",
            "--config",
            broken.to_str().unwrap(),
            "sample-config",
            out.to_str().unwrap(),
        ])
        .unwrap();

        run(cli).await.unwrap();
        let written = ConfigLoader::new().with_path(&out).load().unwrap();
        assert_eq!(written, ShopConfig::default());
    }

    #[tokio::test]
    async fn test_recent_requires_valid_config() {
        let dir = TempDir::new().unwrap();
        let broken = write_broken_config(&dir);

        let cli = Cli::try_parse_from(["shopcore", "--config", broken.to_str().unwrap(), "recent"]).unwrap();
        assert!(run(cli).await.is_err());
    }
}
