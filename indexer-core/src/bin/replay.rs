//! Replay a newline-delimited JSON event file through the indexer

use anyhow::{Context as _, Result};
use clap::Parser;
use indexer_core::{
    Address, Config, ContractReader, EntityStore, Indexer, IndexerStats, LogEvent, MemoryStore,
    SourceSet, StaticContractReader, Storage,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "indexer-replay")]
#[command(about = "Replay lending protocol events into the entity store")]
struct Cli {
    /// NDJSON event file, one log event per line
    #[arg(short, long)]
    events: PathBuf,

    /// Contract read fixtures (JSON keyed by address)
    #[arg(short, long)]
    fixtures: Option<PathBuf>,

    /// Configuration file path (defaults to INDEXER_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the comptroller address
    #[arg(long)]
    comptroller: Option<Address>,

    /// Override the staking-rewards factory address
    #[arg(long)]
    staking_factory: Option<Address>,

    /// Keep entities in memory instead of RocksDB
    #[arg(long)]
    memory: bool,

    /// Continue after an event is rejected
    #[arg(long)]
    keep_going: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::from_env()?,
    };
    if let Some(comptroller) = cli.comptroller {
        config.sources.comptroller = Some(comptroller);
    }
    if let Some(factory) = cli.staking_factory {
        config.sources.staking_rewards_factory = Some(factory);
    }

    let sources = SourceSet::with_static(
        config.comptroller()?,
        config.sources.staking_rewards_factory,
    );
    let reader = match &cli.fixtures {
        Some(path) => StaticContractReader::from_file(path)
            .with_context(|| format!("loading fixtures {}", path.display()))?,
        None => StaticContractReader::new(),
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        events = %cli.events.display(),
        memory = cli.memory,
        "Starting replay"
    );

    let stats = if cli.memory {
        let indexer = Indexer::new(MemoryStore::new(), reader, sources)?;
        let indexer = replay(indexer, &cli.events, cli.keep_going)?;
        let stats = indexer.stats();
        tracing::info!(entities = indexer.store().len(), "In-memory store discarded");
        stats
    } else {
        let storage = Storage::open(&config)?;
        let indexer = Indexer::new(storage, reader, sources)?;
        let indexer = replay(indexer, &cli.events, cli.keep_going)?;
        let stats = indexer.stats();
        let storage = indexer.into_store();
        let storage_stats = storage.get_stats()?;
        tracing::info!(
            markets = storage_stats.markets,
            accounts = storage_stats.accounts,
            positions = storage_stats.positions,
            event_records = storage_stats.event_records,
            "Storage summary"
        );
        storage.close()?;
        stats
    };

    report(&stats);
    if stats.failed > 0 && !cli.keep_going {
        anyhow::bail!("replay stopped at a rejected event");
    }
    Ok(())
}

fn replay<S, R>(
    mut indexer: Indexer<S, R>,
    path: &Path,
    keep_going: bool,
) -> Result<Indexer<S, R>>
where
    S: EntityStore,
    R: ContractReader,
{
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut skipped = 0u64;

    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event = LogEvent::from_json(&line)
            .with_context(|| format!("{}:{}: malformed event", path.display(), number + 1))?;

        if !indexer
            .sources()
            .accepts(&event.meta.address, event.event.source())
        {
            tracing::debug!(
                address = %event.meta.address,
                event = event.event.name(),
                "Skipping event from untracked source"
            );
            skipped += 1;
            continue;
        }

        if let Err(err) = indexer.process(&event) {
            if !keep_going {
                tracing::error!(line = number + 1, error = %err, "Stopping replay");
                break;
            }
        }
    }

    tracing::info!(skipped, "Replay finished");
    Ok(indexer)
}

fn report(stats: &IndexerStats) {
    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        entities_written = stats.entities_written,
        "Replay summary"
    );
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "indexer_core=info,indexer_replay=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
