use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Launch controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Image tag to build and run
    pub image: String,
    /// Host directory mounted at `container_output_dir`
    pub output_dir: PathBuf,
    /// Host directory holding task manifests, mounted at `container_manifest_dir`
    pub manifest_dir: PathBuf,
    /// Output path as seen from inside the container
    pub container_output_dir: String,
    /// Manifest path as seen from inside the container
    pub container_manifest_dir: String,
    /// Runner entry point inside the container; the manifest path is appended
    pub container_command: Vec<String>,
    /// Training videos each puppet must watch (the manifest carries twice as many)
    pub training_videos: usize,
    /// Seconds to dwell on each training video
    pub watch_duration: u64,
    /// Comma-separated phases written into every manifest
    pub steps: String,
    /// Shared memory size for the browser
    pub shm_size: String,
    /// Optional memory limit, passed through to the runtime
    pub memory: Option<String>,
    /// `uid[:gid]` to run as. Defaults to the owner of `output_dir` on unix.
    pub user: Option<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            image: "sockpuppet/youtube-puppet".into(),
            output_dir: PathBuf::from("output"),
            manifest_dir: PathBuf::from("arguments"),
            container_output_dir: "/output".into(),
            container_manifest_dir: "/args".into(),
            container_command: vec!["puppet".into()],
            training_videos: 5,
            watch_duration: 30,
            steps: "train,test".into(),
            shm_size: "512m".into(),
            memory: None,
            user: None,
        }
    }
}

impl LaunchConfig {
    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// In-container path of a manifest
    pub fn container_manifest_path(&self, puppet_id: &str) -> String {
        format!(
            "{}/{}.json",
            self.container_manifest_dir.trim_end_matches('/'),
            puppet_id
        )
    }

    /// Resolve the user the container runs as
    pub fn resolved_user(&self) -> Option<String> {
        if let Some(user) = &self.user {
            return Some(user.clone());
        }
        owner_of(&self.output_dir)
    }
}

#[cfg(unix)]
fn owner_of(path: &Path) -> Option<String> {
    use std::os::unix::fs::MetadataExt;

    std::fs::metadata(path)
        .ok()
        .map(|meta| format!("{}:{}", meta.uid(), meta.gid()))
}

#[cfg(not(unix))]
fn owner_of(_path: &Path) -> Option<String> {
    None
}
