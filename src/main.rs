use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use market_structure::cache::{list_input_files, load_inputs, save_json};
use market_structure::worker::snapshot_batch;
use market_structure::{AnalysisConfig, Engine, ScenarioStore, Snapshot, SnapshotInput};

#[derive(Parser, Debug)]
#[command(name = "market-structure")]
#[command(about = "Market-structure context from multi-timeframe OHLCV bars")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// JSON config overriding the defaults
    #[arg(short, long, global = true, env = "MARKET_STRUCTURE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze every input once and print the snapshots
    Analyze {
        /// Input file (.json / .json.zst) or a directory of them
        input: PathBuf,

        /// Write snapshots here instead of stdout (.zst compresses)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay each input bar by bar through the per-symbol workers
    Replay {
        /// Input file (.json / .json.zst) or a directory of them
        input: PathBuf,

        /// Primary bars required before the first snapshot
        #[arg(long, default_value = "30")]
        warmup: usize,

        /// Write every snapshot here (.zst compresses)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("market_structure=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    match args.command {
        Commands::Analyze { input, output } => run_analyze(&input, output.as_deref(), &config),
        Commands::Replay {
            input,
            warmup,
            output,
        } => run_replay(&input, warmup, output.as_deref(), config).await,
    }
}

fn read_inputs(path: &Path) -> Result<Vec<SnapshotInput>> {
    if !path.is_dir() {
        return load_inputs(path);
    }

    let mut inputs = Vec::new();
    for file in list_input_files(path)? {
        inputs.extend(load_inputs(&file)?);
    }
    Ok(inputs)
}

fn emit(snapshots: &[Snapshot], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            save_json(&snapshots, path)?;
            info!("Wrote {} snapshots to {}", snapshots.len(), path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(snapshots).context("Failed to encode snapshots")?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn run_analyze(input: &Path, output: Option<&Path>, config: &AnalysisConfig) -> Result<()> {
    let inputs = read_inputs(input)?;
    info!("Analyzing {} inputs", inputs.len());

    let mut store = ScenarioStore::new(config.stabilizer.clone());
    let snapshots = snapshot_batch(&inputs, config, &mut store);

    for snapshot in &snapshots {
        if let Some(scenario) = &snapshot.scenario {
            info!(
                "{}: trend {}, bias {}, phase {}, scenario {} ({:.2})",
                snapshot.meta.symbol,
                snapshot.structure.trend,
                snapshot.structure.bias,
                snapshot.liquidity.phase,
                scenario.stable.label,
                scenario.stable.confidence
            );
        }
    }

    emit(&snapshots, output)
}

async fn run_replay(input: &Path, warmup: usize, output: Option<&Path>, config: AnalysisConfig) -> Result<()> {
    let inputs = read_inputs(input)?;
    let mut engine = Engine::new(config);
    let mut rx = engine.subscribe();
    let mut snapshots = Vec::new();

    for full in &inputs {
        let Some(bars) = full.primary_bars() else {
            warn!("{}: no {} series, skipped", full.symbol, full.primary_timeframe);
            continue;
        };
        let steps: Vec<_> = bars.iter().skip(warmup.saturating_sub(1)).map(|b| b.timestamp).collect();
        info!("Replaying {} {} bars for {}", steps.len(), full.primary_timeframe, full.symbol);

        for as_of in steps {
            engine.submit(full.until(as_of)).await?;
            let snapshot = rx.recv().await.context("Snapshot stream closed")?;

            if let Some(scenario) = &snapshot.scenario {
                info!(
                    "{} {}: stable {} ({:.2}), raw {} ({:.2}), {}",
                    snapshot.meta.symbol,
                    as_of,
                    scenario.stable.label,
                    scenario.stable.confidence,
                    scenario.raw.label,
                    scenario.raw.confidence,
                    scenario.transition
                );
            }
            snapshots.push((*snapshot).clone());
        }
    }

    let states = engine.shutdown().await?;
    for (symbol, state) in &states {
        info!(
            "{}: final stable {} since {}",
            symbol, state.stable.label, state.stable_since
        );
    }

    match output {
        Some(path) => emit(&snapshots, Some(path)),
        None => emit(snapshots.last().map(std::slice::from_ref).unwrap_or_default(), None),
    }
}
