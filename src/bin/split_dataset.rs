use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use edema_net::dataset::common_structs::read_metadata_file;
use edema_net::dataset::split::{split_dataset, SplitOptions};
use tracing::info;

/// Splits an annotated dataset into train and test parts by patient
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Metadata table (csv) with one row per annotation
    metadata: PathBuf,
    /// Where the split is written as json
    #[arg(short, long, default_value = "split.json")]
    output: PathBuf,
    /// Share of images assigned to the train split
    #[arg(long, default_value = "0.8")]
    train_share: f64,
    #[arg(long, default_value = "500")]
    n_split_trials: usize,
    /// Accept splits in which some class is missing from train or test
    #[arg(long)]
    allow_missing_classes: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let metadata = read_metadata_file(&args.metadata)
        .with_context(|| format!("reading {}", args.metadata.display()))?;
    let options = SplitOptions {
        train_share: args.train_share,
        n_split_trials: args.n_split_trials,
        ensure_all_classes_in_splits: !args.allow_missing_classes,
    };
    let split = split_dataset(&metadata, &options)?;

    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    serde_json::to_writer_pretty(file, &split)?;
    info!("Split written to {}", args.output.display());
    Ok(())
}
