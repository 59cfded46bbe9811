mod driver;
mod runner;

pub use driver::{
    AutomationDriver, CommandDriver, CommandLauncher, DriverLauncher, VideoRef, CLOSE_TIMEOUT,
    DRIVER_ENV,
};
pub use runner::{
    failure_policy, run_intervention, run_testing, run_training, FailurePolicy, PuppetRunner,
    RunContext, RunState, TrainingReport, WatchOutcome, TEST_HOPS,
};
