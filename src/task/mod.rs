mod manifest;
mod record;
mod store;

pub use manifest::{Phase, TaskManifest};
pub use record::{
    ActionEntry, ActionLog, ActionParams, ExceptionRecord, RunRecord, TerminalRecord,
    EXCEPTION_MODULE,
};
pub use store::{read_manifest, ManifestStore, RecordStore};
