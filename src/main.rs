use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use sockpuppet::config::LaunchConfig;
use sockpuppet::launch::{
    load_corpus, load_video_ids, partition_cohorts, ContainerRuntime, DockerCli,
    LaunchController, LaunchOptions, COHORT_BOUNDS,
};

/// Build the puppet image and launch one containerised sock puppet per cohort
#[derive(Debug, Parser)]
#[command(name = "sockpuppet", version)]
struct Cli {
    /// Build the container image
    #[arg(long)]
    build: bool,

    /// Launch the puppet containers
    #[arg(long)]
    run: bool,

    /// Only write manifests, do not start containers
    #[arg(long)]
    simulate: bool,

    /// Maximum number of concurrent containers (at least 1)
    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    max_containers: usize,

    /// Seconds to sleep when the container ceiling is reached
    #[arg(long, default_value_t = 60)]
    sleep_duration: u64,

    /// Training corpus CSV with `video_id` and `slant` columns
    #[arg(long, default_value = "data/training-videos.csv")]
    training_videos: PathBuf,

    /// Seed video CSV with a `video_id` column
    #[arg(long, default_value = "data/testing-videos.csv")]
    testing_videos: PathBuf,

    /// Optional JSON config file
    #[arg(long, default_value = "sockpuppet.json")]
    config: PathBuf,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Image build context
    #[arg(long, default_value = ".")]
    context: PathBuf,

    /// Override the image tag from the config
    #[arg(long)]
    image: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sockpuppet::init_tracing()?;
    let cli = Cli::parse();

    if !cli.build && !cli.run {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    let mut config = LaunchConfig::load(&cli.config)?;
    if let Some(image) = cli.image.clone() {
        config.image = image;
    }

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::default());

    if cli.build {
        build_image(runtime.as_ref(), &cli.context, &config.image).await?;
    }

    if cli.run {
        spawn_containers(&cli, config, runtime).await?;
    }

    Ok(())
}

async fn build_image(runtime: &dyn ContainerRuntime, context: &Path, tag: &str) -> anyhow::Result<()> {
    info!(tag, context = %context.display(), "starting image build");
    let mut log = runtime.build_image(context, tag).await?;
    while let Some(line) = log.next_line().await {
        info!(target: "build", "{}", line);
    }
    log.finish().await?;
    info!(tag, "build complete");
    Ok(())
}

async fn spawn_containers(
    cli: &Cli,
    config: LaunchConfig,
    runtime: Arc<dyn ContainerRuntime>,
) -> anyhow::Result<()> {
    let corpus = load_corpus(&cli.training_videos)?;
    let cohorts = partition_cohorts(&corpus, &COHORT_BOUNDS);
    let seeds = load_video_ids(&cli.testing_videos)?;
    for cohort in &cohorts {
        info!(cohort = %cohort.label, candidates = cohort.video_ids.len(), "cohort");
    }
    info!(seeds = seeds.len(), "seed pool loaded");

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let options = LaunchOptions {
        max_concurrent: cli.max_containers,
        poll_interval: Duration::from_secs(cli.sleep_duration),
        simulate: cli.simulate,
    };

    let controller = LaunchController::new(config, runtime).context("Failed to prepare launch")?;
    let summary = controller
        .spawn_all(&cohorts, &seeds, &options, &mut rng)
        .await?;

    println!("Total containers spawned: {}", summary.launched);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_container_ceiling_rejected() {
        let err = Cli::try_parse_from(["sockpuppet", "--run", "--max-containers", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_container_ceiling_parsed() {
        let cli = Cli::try_parse_from(["sockpuppet", "--run", "--max-containers", "1"]).unwrap();
        assert_eq!(cli.max_containers, 1);

        let cli = Cli::try_parse_from(["sockpuppet", "--build"]).unwrap();
        assert_eq!(cli.max_containers, 10);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
