use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use edema_net::dataset::data_loaders::{DatasetItem, EdemaDataset};
use edema_net::dataset::masks::ResizedSample;
use edema_net::DatasetOptions;
use image::DynamicImage;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

/// Resizes annotated X-rays to the training size and writes their finding masks
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Metadata table (csv) with one row per annotation
    metadata: PathBuf,
    /// Directory the image paths of the metadata are relative to
    img_dir: PathBuf,
    /// Output directory for images, masks and labels.json
    out_dir: PathBuf,
    #[arg(long, default_value = "1536")]
    width: u32,
    #[arg(long, default_value = "1536")]
    height: u32,
    /// Line width of findings annotated with lines
    #[arg(long, default_value = "15")]
    linelike_finding_width: u32,
}

#[derive(Serialize)]
struct Labels {
    img_filename: String,
    /// Presence of every finding
    findings: BTreeMap<&'static str, u8>,
    default_mask_value: u8,
}

/// Output name of an image: its relative path without extension, directories
/// joined with `_`, e.g. `p1/study2/view.jpg` gives `p1_study2_view`.
fn output_stem(img_path: &str) -> anyhow::Result<String> {
    let path = Path::new(img_path).with_extension("");
    let mut parts = vec![];
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => bail!("image path {} is not relative to the image directory", img_path),
        }
    }
    if parts.is_empty() {
        bail!("empty image path");
    }
    Ok(parts.join("_"))
}

/// Output names of every item, failing when two images would overwrite each other
fn output_stems(items: &[DatasetItem]) -> anyhow::Result<Vec<String>> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut stems = Vec::with_capacity(items.len());
    for item in items {
        let stem = output_stem(&item.img_path)?;
        if let Some(other) = seen.insert(stem.clone(), &item.img_path) {
            bail!(
                "{} and {} would both be written as {}",
                other,
                item.img_path,
                stem
            );
        }
        stems.push(stem);
    }
    Ok(stems)
}

fn save_sample(sample: &ResizedSample, stem: &str, out_dir: &Path) -> anyhow::Result<String> {
    let img_filename = format!("{}.png", stem);
    DynamicImage::ImageRgb32F(sample.image.clone())
        .to_rgb8()
        .save(out_dir.join("images").join(&img_filename))?;

    let mask_dir = out_dir.join("masks").join(stem);
    fs::create_dir_all(&mask_dir)?;
    for (name, mask) in sample.masks.names.iter().zip(&sample.masks.masks) {
        let mut visible = mask.clone();
        visible.pixels_mut().for_each(|p| p[0] *= 255);
        visible.save(mask_dir.join(format!("{}.png", name)))?;
    }
    Ok(img_filename)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let options = DatasetOptions {
        target_size: (args.width, args.height),
        linelike_finding_width: args.linelike_finding_width,
    };
    let dataset = EdemaDataset::from_metadata_file(&args.metadata, &args.img_dir, options)
        .with_context(|| format!("loading {}", args.metadata.display()))?;
    let stems = output_stems(dataset.items())?;
    fs::create_dir_all(args.out_dir.join("images"))?;

    info!("Preparing {} images", dataset.len());
    let labels: Vec<Labels> = (0..dataset.len())
        .into_par_iter()
        .filter_map(|idx| {
            let item = dataset.item(idx)?;
            let stem = &stems[idx];
            let prepared = dataset
                .get(idx)
                .map_err(anyhow::Error::from)
                .and_then(|sample| {
                    let img_filename = save_sample(&sample, stem, &args.out_dir)?;
                    Ok(Labels {
                        img_filename,
                        findings: sample
                            .masks
                            .names
                            .iter()
                            .copied()
                            .zip(sample.masks.findings.iter().copied())
                            .collect(),
                        default_mask_value: sample.masks.default_mask_value,
                    })
                });
            match prepared {
                Ok(labels) => Some(labels),
                Err(e) => {
                    warn!("Skipping {}: {:#}", item.img_path, e);
                    None
                }
            }
        })
        .collect();

    let labels_path = args.out_dir.join("labels.json");
    serde_json::to_writer(File::create(&labels_path)?, &labels)?;
    info!(
        "Prepared {} of {} images, labels in {}",
        labels.len(),
        dataset.len(),
        labels_path.display()
    );
    Ok(())
}
