use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskManifest;

/// Module tag written into every exception record
pub const EXCEPTION_MODULE: &str = "sock-puppet";

/// Parameters attached to an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionParams {
    /// A single video id (watch)
    Video(String),
    /// An ordered list of video ids (homepage, recommendations)
    Videos(Vec<String>),
}

/// One observable step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub action: String,
    pub params: Option<ActionParams>,
}

/// Append-only, ordered action log shared by all phases of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog {
    entries: Vec<ActionEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, action: impl Into<String>, params: Option<ActionParams>) {
        let entry = ActionEntry {
            action: action.into(),
            params,
        };
        tracing::debug!(action = %entry.action, params = ?entry.params, "action");
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    /// Count entries with the given action name
    pub fn count(&self, action: &str) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }
}

/// Durable result of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub puppet_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Wall-clock seconds from session start to finalization
    pub duration: f64,
    pub description: String,
    pub actions: ActionLog,
    /// The manifest this run executed
    pub manifest: TaskManifest,
}

/// Written instead of a run record when a run fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub time: DateTime<Utc>,
    pub exception: String,
    pub module: String,
}

impl ExceptionRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            exception: message.into(),
            module: EXCEPTION_MODULE.into(),
        }
    }
}

/// The single terminal outcome of a run
#[derive(Debug, Clone)]
pub enum TerminalRecord {
    Completed(RunRecord),
    Errored(ExceptionRecord),
}

impl TerminalRecord {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_log_preserves_order() {
        let mut log = ActionLog::new();
        log.push("get_homepage", Some(ActionParams::Videos(vec!["a".into(), "b".into()])));
        log.push("training_start", None);
        log.push("watch", Some(ActionParams::Video("a".into())));

        let names: Vec<&str> = log.entries().iter().map(|e| e.action.as_str()).collect();
        assert_eq!(names, vec!["get_homepage", "training_start", "watch"]);
        assert_eq!(log.count("watch"), 1);
    }

    #[test]
    fn test_action_log_serializes_as_list() {
        let mut log = ActionLog::new();
        log.push("testing_start", None);
        log.push("watch", Some(ActionParams::Video("v1".into())));
        log.push("get_recommendations", Some(ActionParams::Videos(vec!["v2".into()])));

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "action": "testing_start", "params": null },
                { "action": "watch", "params": "v1" },
                { "action": "get_recommendations", "params": ["v2"] }
            ])
        );
    }

    #[test]
    fn test_exception_record_module_tag() {
        let record = ExceptionRecord::new("boom");
        assert_eq!(record.module, "sock-puppet");
        assert_eq!(record.exception, "boom");
    }
}
