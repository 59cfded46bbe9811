mod admission;
mod cohort;
mod controller;
mod corpus;
mod runtime;

pub use admission::{admit, Admission};
pub use cohort::{
    choose_seed, partition_cohorts, select_training_set, Cohort, CohortBounds, COHORT_BOUNDS,
};
pub use controller::{LaunchController, LaunchOptions, LaunchSummary};
pub use corpus::{load_corpus, load_video_ids, parse_corpus, parse_video_ids, ScoredVideo};
pub use runtime::{
    BuildLog, ContainerHandle, ContainerRuntime, DockerCli, ResourceLimits, RunSpec, VolumeMount,
};
