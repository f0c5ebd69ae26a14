use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use sarstack::{AsfSearchClient, Hyp3Client, PipelineConfig, PipelineDriver};

/// Prepare Sentinel-1 InSAR stacks for time-series inversion
#[derive(Debug, Parser)]
#[command(name = "sarstack", version)]
struct Args {
    /// Pipeline configuration (TOML); built-in Edgecumbe stacks when omitted
    #[arg(short, long, env = "SARSTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Only run the stack with this name
    #[arg(short, long)]
    stack: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let search = AsfSearchClient::new(&config.search_url)?;
    let batch = Hyp3Client::new(&config.hyp3_url, config.token())?;
    let driver = PipelineDriver::new(&config, &search, &batch);

    let report = driver.run(args.stack.as_deref());
    for line in report.summary_lines() {
        println!("{}", line);
    }

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!("{} of {} stacks failed", failed, report.outcomes.len());
    }
    Ok(())
}
