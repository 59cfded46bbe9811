use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::info;

use super::admission::admit;
use super::cohort::{choose_seed, select_training_set, Cohort};
use super::runtime::{ContainerHandle, ContainerRuntime, ResourceLimits, RunSpec, VolumeMount};
use crate::config::LaunchConfig;
use crate::task::{ManifestStore, TaskManifest};

/// Knobs for one launch pass
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Concurrency ceiling checked before each launch
    pub max_concurrent: usize,
    /// Sleep between runtime polls while the ceiling is reached
    pub poll_interval: Duration,
    /// Write manifests only, start no containers
    pub simulate: bool,
}

/// What a launch pass produced
#[derive(Debug, Default)]
pub struct LaunchSummary {
    pub launched: usize,
    pub manifests: Vec<PathBuf>,
    pub containers: Vec<ContainerHandle>,
}

/// Turns cohorts into admitted puppet containers, one at a time
pub struct LaunchController {
    config: LaunchConfig,
    runtime: Arc<dyn ContainerRuntime>,
    manifests: ManifestStore,
    output_dir: PathBuf,
}

impl LaunchController {
    /// Create the controller, creating the output and manifest directories
    pub fn new(config: LaunchConfig, runtime: Arc<dyn ContainerRuntime>) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("Failed to create output dir: {}", config.output_dir.display())
        })?;
        let output_dir = absolute(&config.output_dir)?;
        let manifests = ManifestStore::new(absolute_after_create(&config.manifest_dir)?)?;

        Ok(Self {
            config,
            runtime,
            manifests,
            output_dir,
        })
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Build the manifest for one puppet
    pub fn synthesize_manifest(&self, cohort: &str, training: Vec<String>, test_seed: String) -> TaskManifest {
        TaskManifest {
            puppet_id: TaskManifest::puppet_id_for(cohort, &test_seed),
            duration: self.config.watch_duration,
            description: String::new(),
            output_dir: self.config.container_output_dir.clone(),
            training,
            training_n: self.config.training_videos,
            test_seed,
            steps: self.config.steps.clone(),
            intervention: None,
        }
    }

    /// Container configuration for a manifest
    pub fn run_spec(&self, manifest: &TaskManifest) -> RunSpec {
        let mut command = self.config.container_command.clone();
        command.push(self.config.container_manifest_path(&manifest.puppet_id));

        RunSpec {
            image: self.config.image.clone(),
            command,
            mounts: vec![
                VolumeMount {
                    host: self.output_dir.clone(),
                    container: self.config.container_output_dir.clone(),
                    read_only: false,
                },
                VolumeMount {
                    host: self.manifests.dir().to_path_buf(),
                    container: self.config.container_manifest_dir.clone(),
                    read_only: true,
                },
            ],
            limits: ResourceLimits {
                shm_size: Some(self.config.shm_size.clone()),
                memory: self.config.memory.clone(),
            },
            user: self.config.resolved_user(),
            auto_remove: true,
        }
    }

    /// Write the manifest and, unless simulating, start a detached container for it
    pub async fn launch(
        &self,
        manifest: &TaskManifest,
        simulate: bool,
    ) -> Result<(PathBuf, Option<ContainerHandle>)> {
        let path = self.manifests.write(manifest)?;

        if simulate {
            info!(puppet_id = %manifest.puppet_id, path = %path.display(), "manifest written (simulate)");
            return Ok((path, None));
        }

        info!(puppet_id = %manifest.puppet_id, "spawning container");
        let handle = self
            .runtime
            .run(&self.run_spec(manifest))
            .await
            .with_context(|| format!("Failed to start container for {}", manifest.puppet_id))?;
        Ok((path, Some(handle)))
    }

    /// Launch one puppet per cohort, in cohort order.
    ///
    /// A cohort without enough candidates or an empty seed pool aborts the
    /// pass; puppets already launched keep running.
    pub async fn spawn_all<G: Rng + ?Sized>(
        &self,
        cohorts: &[Cohort],
        seeds: &[String],
        options: &LaunchOptions,
        rng: &mut G,
    ) -> Result<LaunchSummary> {
        let mut summary = LaunchSummary::default();

        for cohort in cohorts {
            let training = select_training_set(cohort, self.config.training_videos, rng)?;
            let test_seed = choose_seed(seeds, rng)?;
            let manifest = self.synthesize_manifest(&cohort.label, training, test_seed);

            let admission = admit(self.runtime.as_ref(), options.max_concurrent, options.poll_interval).await;
            info!(
                cohort = %cohort.label,
                running = admission.observed_running,
                waits = admission.waits,
                "admitted"
            );

            let (path, handle) = self.launch(&manifest, options.simulate).await?;
            summary.manifests.push(path);
            summary.containers.extend(handle);
            summary.launched += 1;
        }

        info!(total = summary.launched, "total containers spawned");
        Ok(summary)
    }
}

fn absolute_after_create(path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    absolute(path)
}

/// Bind mounts need absolute host paths
fn absolute(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))
}
