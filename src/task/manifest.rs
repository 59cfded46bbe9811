use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A phase a puppet can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Watch the training diet
    Train,
    /// Chase recommendations from the seed video
    Test,
    /// Watch intervention videos and observe homepage drift
    Intervention,
}

impl Phase {
    /// Name used in the manifest `steps` field
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
            Self::Intervention => "intervention",
        }
    }

    /// Parse one step name
    pub fn from_step(step: &str) -> Option<Self> {
        match step.trim() {
            "train" => Some(Self::Train),
            "test" => Some(Self::Test),
            "intervention" => Some(Self::Intervention),
            _ => None,
        }
    }
}

/// Task manifest handed from the controller to one puppet.
///
/// Field names are the on-disk JSON names; manifests are written once and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskManifest {
    /// `<cohort>,<seed>,<suffix>`; unique for the lifetime of the output directory
    pub puppet_id: String,
    /// Seconds to watch each training and intervention video
    pub duration: u64,
    /// Free text, filled in after the fact
    pub description: String,
    /// Output directory as seen by the runner
    pub output_dir: String,
    /// Training video ids, oversampled to twice `training_n`
    pub training: Vec<String>,
    /// Training videos that must actually be watched
    #[serde(rename = "trainingN")]
    pub training_n: usize,
    /// Video the testing phase starts from
    pub test_seed: String,
    /// Comma-separated phases in execution order
    pub steps: String,
    /// Optional intervention video ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervention: Option<Vec<String>>,
}

impl TaskManifest {
    /// Build a fresh puppet id for a cohort and seed
    pub fn puppet_id_for(cohort: &str, test_seed: &str) -> String {
        let uuid = Uuid::new_v4().to_string();
        let suffix = uuid.split('-').next().unwrap_or(uuid.as_str());
        format!("{},{},{}", cohort, test_seed, suffix)
    }

    /// Phases listed in `steps`, in order. Unknown names are returned separately.
    pub fn phases(&self) -> (Vec<Phase>, Vec<String>) {
        let mut phases = Vec::new();
        let mut unknown = Vec::new();
        for step in self.steps.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match Phase::from_step(step) {
                Some(phase) => phases.push(phase),
                None => unknown.push(step.to_string()),
            }
        }
        (phases, unknown)
    }

    /// Training ids with empty entries removed
    pub fn training_ids(&self) -> Vec<&str> {
        self.training
            .iter()
            .map(|id| id.as_str())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskManifest {
        TaskManifest {
            puppet_id: "Left,seed1,0a1b2c3d".into(),
            duration: 30,
            description: String::new(),
            output_dir: "/output".into(),
            training: vec!["a".into(), "".into(), "b".into()],
            training_n: 1,
            test_seed: "seed1".into(),
            steps: "train,test".into(),
            intervention: None,
        }
    }

    #[test]
    fn test_puppet_id_format() {
        let id = TaskManifest::puppet_id_for("CenterRight", "xyz");
        let parts: Vec<&str> = id.split(',').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CenterRight");
        assert_eq!(parts[1], "xyz");
        assert_eq!(parts[2].len(), 8);
        assert_ne!(id, TaskManifest::puppet_id_for("CenterRight", "xyz"));
    }

    #[test]
    fn test_json_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "puppetId",
            "duration",
            "description",
            "outputDir",
            "training",
            "trainingN",
            "testSeed",
            "steps",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert!(!obj.contains_key("intervention"));
    }

    #[test]
    fn test_json_preserves_every_field() {
        let mut manifest = sample();
        manifest.intervention = Some(vec!["i1".into(), "i2".into()]);
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let parsed: TaskManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(serde_json::to_string_pretty(&parsed).unwrap(), json);
    }

    #[test]
    fn test_phases_in_order_and_unknown_reported() {
        let mut manifest = sample();
        manifest.steps = "test, train,dance,intervention".into();
        let (phases, unknown) = manifest.phases();
        assert_eq!(phases, vec![Phase::Test, Phase::Train, Phase::Intervention]);
        assert_eq!(unknown, vec!["dance".to_string()]);
    }

    #[test]
    fn test_training_ids_drop_empty() {
        assert_eq!(sample().training_ids(), vec!["a", "b"]);
    }
}
