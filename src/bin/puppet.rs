use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use sockpuppet::agent::{CommandLauncher, PuppetRunner};
use sockpuppet::task::read_manifest;

/// Run one sock puppet from its task manifest
#[derive(Debug, Parser)]
#[command(name = "puppet", version)]
struct Cli {
    /// Path to the task manifest
    manifest: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sockpuppet::init_tracing()?;
    let cli = Cli::parse();

    let manifest = read_manifest(&cli.manifest)?;
    let runner = PuppetRunner::new(Arc::new(CommandLauncher::from_env()));

    // Only fails when not even an exception record could be written
    if let Err(e) = runner.run_and_persist(manifest).await {
        error!(error = %format!("{:#}", e), "failed to persist puppet record");
        return Err(e);
    }
    Ok(())
}
