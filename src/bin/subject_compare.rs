//! Per-subject peak responses: every sub-directory of `--root` is one subject.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use stim_kinematics::loader::find_recordings;
use stim_kinematics::report::{peak_responses, peak_statistics};
use stim_kinematics::{AnalysisConfig, Pipeline};

#[derive(Parser, Debug)]
struct Args {
    /// Directory containing one sub-directory of recordings per subject
    #[arg(long)]
    root: PathBuf,

    /// JSON analysis config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn run_subject(dir: &Path, pipeline: &Pipeline) -> anyhow::Result<serde_json::Value> {
    let paths = find_recordings(dir)?;
    if paths.is_empty() {
        anyhow::bail!("no recordings");
    }
    let acc = pipeline.run(&paths);
    let peaks = peak_responses(&acc.collections, pipeline.config());
    Ok(json!({
        "recordings": paths.len(),
        "failed_files": acc.summary.failed_files.len(),
        "turning_success_rate": acc.summary.turning_success_rate(),
        "elytra_success_rate": acc.summary.elytra_success_rate(),
        "peak_responses": peak_statistics(&peaks),
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let pipeline = Pipeline::new(config)?;

    let mut subjects: Vec<PathBuf> = fs::read_dir(&args.root)
        .with_context(|| format!("listing {}", args.root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    subjects.sort();

    let mut results = BTreeMap::new();
    for dir in &subjects {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        match run_subject(dir, &pipeline) {
            Ok(res) => {
                results.insert(name, res);
            }
            Err(e) => log::warn!("Failed subject {}: {}", dir.display(), e),
        }
    }

    let text = serde_json::to_string_pretty(&results)?;
    match args.output {
        Some(path) => {
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            log::info!("Wrote {} subjects to {}", results.len(), path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
