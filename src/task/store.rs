use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::{ExceptionRecord, RunRecord, TaskManifest, TerminalRecord};

/// Persists task manifests as `<dir>/<puppetId>.json`
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// Create the store, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create manifest dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a manifest on the host
    pub fn path(&self, puppet_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", puppet_id))
    }

    /// Write a manifest. Existing manifests are never overwritten.
    pub fn write(&self, manifest: &TaskManifest) -> Result<PathBuf> {
        let path = self.path(&manifest.puppet_id);
        if path.exists() {
            anyhow::bail!("Manifest already exists: {}", path.display());
        }
        write_json_atomic(&path, manifest)?;
        Ok(path)
    }

    /// Read a manifest by puppet id
    pub fn read(&self, puppet_id: &str) -> Result<TaskManifest> {
        read_manifest(&self.path(puppet_id))
    }

    /// Number of manifests in the store
    pub fn count(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.context("Failed to read manifest dir entry")?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Read a manifest from an explicit path
pub fn read_manifest(path: &Path) -> Result<TaskManifest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))
}

/// Persists terminal records under a puppet's output directory
pub struct RecordStore {
    output_dir: PathBuf,
}

impl RecordStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.output_dir.join(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// `<output>/profiles/<puppetId>`, created on demand
    pub fn profile_dir(&self, puppet_id: &str) -> Result<PathBuf> {
        let dir = self.subdir("profiles")?.join(puppet_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create profile dir: {}", dir.display()))?;
        Ok(dir)
    }

    pub fn run_record_path(&self, puppet_id: &str) -> PathBuf {
        self.output_dir.join("puppets").join(puppet_id)
    }

    pub fn exception_record_path(&self, puppet_id: &str) -> PathBuf {
        self.output_dir.join("exceptions").join(puppet_id)
    }

    pub fn write_run(&self, record: &RunRecord) -> Result<PathBuf> {
        let path = self.subdir("puppets")?.join(&record.puppet_id);
        write_json_atomic(&path, record)?;
        Ok(path)
    }

    pub fn write_exception(&self, puppet_id: &str, record: &ExceptionRecord) -> Result<PathBuf> {
        let path = self.subdir("exceptions")?.join(puppet_id);
        write_json_atomic(&path, record)?;
        Ok(path)
    }

    /// Persist the terminal record of a run.
    ///
    /// A run record that cannot be written is replaced by an exception record,
    /// so exactly one of the two exists afterwards.
    pub fn persist(&self, puppet_id: &str, record: &TerminalRecord) -> Result<PathBuf> {
        match record {
            TerminalRecord::Completed(run) => match self.write_run(run) {
                Ok(path) => Ok(path),
                Err(e) => {
                    tracing::error!(puppet_id, error = %e, "failed to write run record");
                    let fallback = ExceptionRecord::new(format!("{:#}", e));
                    self.write_exception(puppet_id, &fallback)
                }
            },
            TerminalRecord::Errored(exception) => self.write_exception(puppet_id, exception),
        }
    }
}

/// Write JSON to a temp file and rename it into place
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to move into place: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ActionLog;
    use chrono::Utc;
    use tempfile::tempdir;

    fn manifest(id: &str) -> TaskManifest {
        TaskManifest {
            puppet_id: id.into(),
            duration: 30,
            description: String::new(),
            output_dir: "/output".into(),
            training: vec!["a".into(), "b".into()],
            training_n: 1,
            test_seed: "s".into(),
            steps: "train,test".into(),
            intervention: None,
        }
    }

    #[test]
    fn test_manifest_write_then_read() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("arguments")).unwrap();

        let original = manifest("Left,s,deadbeef");
        let path = store.write(&original).unwrap();
        assert!(path.ends_with("Left,s,deadbeef.json"));

        let loaded = store.read("Left,s,deadbeef").unwrap();
        assert_eq!(loaded, original);

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::to_value(&original).unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_manifest_never_overwritten() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        store.write(&manifest("p1")).unwrap();
        assert!(store.write(&manifest("p1")).is_err());
    }

    #[test]
    fn test_persist_completed_writes_only_run_record() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let now = Utc::now();
        let record = TerminalRecord::Completed(RunRecord {
            puppet_id: "p1".into(),
            start_time: now,
            end_time: now,
            duration: 0.0,
            description: String::new(),
            actions: ActionLog::new(),
            manifest: manifest("p1"),
        });

        store.persist("p1", &record).unwrap();
        assert!(store.run_record_path("p1").exists());
        assert!(!store.exception_record_path("p1").exists());
    }

    #[test]
    fn test_persist_errored_writes_only_exception_record() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let record = TerminalRecord::Errored(ExceptionRecord::new("driver died"));

        store.persist("p2", &record).unwrap();
        assert!(!store.run_record_path("p2").exists());

        let content = fs::read_to_string(store.exception_record_path("p2")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["exception"], "driver died");
        assert_eq!(json["module"], "sock-puppet");
    }

    #[test]
    fn test_profile_dir_keyed_by_puppet() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let profile = store.profile_dir("p3").unwrap();
        assert!(profile.ends_with("profiles/p3"));
        assert!(profile.is_dir());
    }
}
