//! Collects model statistics from a corpus and benchmarks the model tiers on it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use rayon::prelude::*;

use opmodel::stats::{CollectOptions, StatsCollector};
use opmodel::{decode, encode, Instruction, Model, StatisticsBundle, Tier, MODEL_VERSION};

#[derive(Debug, Parser)]
#[command(name = "opmodel")]
#[command(about = "Tiered statistical models for instruction stream compression")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Count a corpus into a statistics bundle.
    Collect {
        /// JSON stream file, or a directory of them.
        #[arg(long)]
        corpus: PathBuf,
        /// Output path for the bundle JSON.
        #[arg(long)]
        output: PathBuf,
        /// Values seen fewer times are left to the fallback codings.
        #[arg(long, default_value_t = 1)]
        min_count: u64,
        /// Model version the bundle is collected for.
        #[arg(long, default_value_t = MODEL_VERSION)]
        bundle_version: u16,
    },
    /// Encode and decode a corpus with every tier, reporting sizes.
    Bench {
        /// JSON stream file, or a directory of them.
        #[arg(long)]
        corpus: PathBuf,
        /// Statistics bundle JSON.
        #[arg(long)]
        bundle: PathBuf,
        /// Only run this tier (`lite`, `mid` or `max`).
        #[arg(long)]
        tier: Option<Tier>,
        /// Model version to build, stamped into every coded stream.
        #[arg(long, default_value_t = MODEL_VERSION)]
        model_version: u16,
    },
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Collect { corpus, output, min_count, bundle_version } => {
            let streams = read_corpus(&corpus)?;
            let mut collector = StatsCollector::new();
            for stream in &streams {
                collector.add_stream(stream)?;
            }
            let instructions = collector.instruction_count();
            let bundle = collector.finish(CollectOptions { min_count, version: bundle_version });
            std::fs::write(&output, bundle.to_json()?)?;
            println!(
                "Collected {} streams, {} instructions into {}",
                streams.len(),
                instructions,
                output.display()
            );
        }
        Command::Bench { corpus, bundle, tier, model_version } => {
            let streams = read_corpus(&corpus)?;
            let bundle = StatisticsBundle::from_json(&std::fs::read_to_string(&bundle)?)?;
            let tiers: Vec<Tier> = tier.map_or_else(|| Tier::ALL.to_vec(), |tier| vec![tier]);

            let reports = tiers
                .par_iter()
                .map(|&tier| bench(tier, model_version, &bundle, &streams))
                .collect::<Result<Vec<_>, _>>()?;
            for report in reports {
                println!("{report}");
            }
        }
    }

    Ok(())
}

fn bench(
    tier: Tier,
    version: u16,
    bundle: &StatisticsBundle,
    streams: &[Vec<Instruction>],
) -> Result<String, BoxError> {
    let timer = Instant::now();
    let model = Model::with_version(tier, version, bundle)?;
    let build_time = timer.elapsed();

    let timer = Instant::now();
    let mut csize = 0;
    let mut instructions = 0;
    for stream in streams {
        let bytes = encode(&model, stream)?;
        if decode(&model, &bytes)? != *stream {
            return Err(format!("{tier} model did not round trip a stream").into());
        }
        csize += bytes.len();
        instructions += stream.len();
    }
    let time = timer.elapsed();

    Ok(format!(
        "[{tier:4}] csize: {} ({:.3} bits per instruction), build: {:?}, round trip: {:?}",
        csize,
        csize as f64 * 8.0 / instructions.max(1) as f64,
        build_time,
        time
    ))
}

/// A corpus is one JSON array of instructions per stream file
fn read_corpus(path: &Path) -> Result<Vec<Vec<Instruction>>, BoxError> {
    let mut paths: Vec<PathBuf> = if path.is_dir() {
        std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect()
    } else {
        vec![path.to_path_buf()]
    };
    paths.sort();

    let mut streams = Vec::with_capacity(paths.len());
    for path in paths {
        let json = std::fs::read_to_string(&path)?;
        let stream: Vec<Instruction> =
            serde_json::from_str(&json).map_err(|err| format!("{}: {}", path.display(), err))?;
        streams.push(stream);
    }
    if streams.is_empty() {
        return Err(format!("No stream JSON files found in {}", path.display()).into());
    }
    Ok(streams)
}
