use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stim_kinematics::loader::find_recordings;
use stim_kinematics::{AnalysisConfig, Pipeline, ResultsExport};

#[derive(Parser, Debug)]
#[command(name = "stim_kinematics")]
#[command(about = "Stimulation-locked body angle and velocity analysis", long_about = None)]
struct Args {
    /// Directory of tracked recordings (*.csv, *.csv.gz)
    #[arg(long)]
    data_dir: PathBuf,

    /// JSON analysis config (defaults used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output JSON path
    #[arg(long, default_value = "stim_results.json")]
    output: PathBuf,

    /// Reject trials with no response in the response slice
    #[arg(long, default_value_t = false)]
    response_policies: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if args.response_policies {
        config.gate.apply_response_policies = true;
    }

    let paths = find_recordings(&args.data_dir)
        .with_context(|| format!("listing {}", args.data_dir.display()))?;
    if paths.is_empty() {
        anyhow::bail!("No recordings found in {}", args.data_dir.display());
    }
    log::info!("Found {} recordings in {}", paths.len(), args.data_dir.display());

    let pipeline = Pipeline::new(config)?;
    let acc = pipeline.run(&paths);

    let summary = &acc.summary;
    log::info!(
        "Turning: {} accepted, {} rejected; elytra: {} accepted, {} rejected",
        summary.turning_succ_no,
        summary.turning_fail_no,
        summary.elytra_succ_no,
        summary.elytra_fail_no
    );
    for (reason, count) in &summary.rejections {
        log::info!("  {reason}: {count}");
    }

    ResultsExport::new(&acc, pipeline.config())
        .write_json(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    Ok(())
}
