use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::error::LaunchError;

/// Bind mount from the host into a container
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl VolumeMount {
    fn to_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.host.display(), self.container);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Resource limits applied to one container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceLimits {
    pub shm_size: Option<String>,
    pub memory: Option<String>,
}

/// Everything needed to start one puppet container
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<VolumeMount>,
    pub limits: ResourceLimits,
    pub user: Option<String>,
    /// Remove the container once it exits
    pub auto_remove: bool,
}

/// Handle to a detached container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHandle {
    pub id: String,
}

/// Build output streamed line by line
pub struct BuildLog {
    lines: mpsc::Receiver<String>,
    status: oneshot::Receiver<Result<(), LaunchError>>,
}

impl BuildLog {
    pub fn new(
        lines: mpsc::Receiver<String>,
        status: oneshot::Receiver<Result<(), LaunchError>>,
    ) -> Self {
        Self { lines, status }
    }

    /// Next log line, `None` once the build output is exhausted
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the build to finish
    pub async fn finish(self) -> Result<(), LaunchError> {
        self.status
            .await
            .map_err(|_| LaunchError::Runtime("build status lost".into()))?
    }
}

/// Container runtime used by the launch controller.
///
/// The runtime is the only source of truth for how many puppets are running;
/// it may be shared with other actors.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Count of currently running containers
    async fn list_running(&self) -> Result<usize, LaunchError>;

    /// Build an image from a context directory
    async fn build_image(&self, context: &Path, tag: &str) -> Result<BuildLog, LaunchError>;

    /// Start a detached container
    async fn run(&self, spec: &RunSpec) -> Result<ContainerHandle, LaunchError>;
}

/// Runtime backed by the `docker` command line
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for `docker run`
    pub fn run_args(spec: &RunSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--detach".to_string()];
        if spec.auto_remove {
            args.push("--rm".into());
        }
        if let Some(shm) = &spec.limits.shm_size {
            args.push(format!("--shm-size={}", shm));
        }
        if let Some(memory) = &spec.limits.memory {
            args.push(format!("--memory={}", memory));
        }
        if let Some(user) = &spec.user {
            args.push(format!("--user={}", user));
        }
        for mount in &spec.mounts {
            args.push("--volume".into());
            args.push(mount.to_arg());
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_running(&self) -> Result<usize, LaunchError> {
        let output = Command::new(&self.binary)
            .args(["ps", "--quiet"])
            .output()
            .await
            .map_err(|e| LaunchError::RuntimeQuery(format!("failed to execute {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(LaunchError::RuntimeQuery(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter(|l| !l.trim().is_empty()).count())
    }

    async fn build_image(&self, context: &Path, tag: &str) -> Result<BuildLog, LaunchError> {
        let (tx, rx) = mpsc::channel::<String>(100);
        let (status_tx, status_rx) = oneshot::channel();

        let mut child = Command::new(&self.binary)
            .args(["build", "--rm", "--tag", tag])
            .arg(context)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LaunchError::Runtime(format!("failed to start build: {}", e)))?;

        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }

        // BuildKit writes its progress to stderr
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        tokio::spawn(async move {
            let result = match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(LaunchError::Runtime(format!(
                    "build exited with {:?}",
                    status.code()
                ))),
                Err(e) => Err(LaunchError::Runtime(e.to_string())),
            };
            let _ = status_tx.send(result);
        });

        Ok(BuildLog::new(rx, status_rx))
    }

    async fn run(&self, spec: &RunSpec) -> Result<ContainerHandle, LaunchError> {
        let output = Command::new(&self.binary)
            .args(Self::run_args(spec))
            .output()
            .await
            .map_err(|e| LaunchError::Runtime(format!("failed to execute {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(LaunchError::Runtime(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(ContainerHandle {
            id: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }
}
