use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::driver::{AutomationDriver, DriverLauncher, VideoRef};
use crate::error::RunError;
use crate::task::{
    ActionLog, ActionParams, ExceptionRecord, Phase, RecordStore, RunRecord, TaskManifest,
    TerminalRecord,
};

/// Hops taken while chasing recommendations
pub const TEST_HOPS: usize = 20;

/// Lifecycle of a puppet run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Training,
    Testing,
    Intervening,
    Finalizing,
    Done,
    Errored,
}

impl RunState {
    fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Train => Self::Training,
            Phase::Test => Self::Testing,
            Phase::Intervention => Self::Intervening,
        }
    }
}

/// Result of one watch attempt
#[derive(Debug)]
pub enum WatchOutcome {
    Watched,
    /// The platform reported the video unavailable
    Skipped,
    Failed(RunError),
}

/// What a phase does with a watch that did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Move on to the next video
    Continue,
    /// Abandon the run
    Abort,
}

/// Per-phase policy for skipped and failed watches.
///
/// Testing and intervention do not tell unavailable videos apart from other
/// failures; both abort the run.
pub fn failure_policy(phase: Phase, outcome: &WatchOutcome) -> FailurePolicy {
    match (phase, outcome) {
        (_, WatchOutcome::Watched) => FailurePolicy::Continue,
        (Phase::Train, WatchOutcome::Skipped | WatchOutcome::Failed(_)) => FailurePolicy::Continue,
        (Phase::Test | Phase::Intervention, _) => FailurePolicy::Abort,
    }
}

/// Training phase counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingReport {
    pub watched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// State carried through every phase of one run
pub struct RunContext {
    pub manifest: TaskManifest,
    pub actions: ActionLog,
    pub start_time: DateTime<Utc>,
    state: RunState,
    driver: Box<dyn AutomationDriver>,
    closed: bool,
}

impl RunContext {
    pub fn new(manifest: TaskManifest, driver: Box<dyn AutomationDriver>) -> Self {
        Self {
            manifest,
            actions: ActionLog::new(),
            start_time: Utc::now(),
            state: RunState::Initializing,
            driver,
            closed: false,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        info!(puppet_id = %self.manifest.puppet_id, from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    fn watch_duration(&self) -> Duration {
        Duration::from_secs(self.manifest.duration)
    }

    async fn get_homepage(&mut self) -> Result<Vec<VideoRef>, RunError> {
        let videos = self.driver.homepage().await?;
        self.actions.push("get_homepage", Some(ids(&videos)));
        Ok(videos)
    }

    async fn get_recommendations(&mut self) -> Result<Vec<VideoRef>, RunError> {
        let videos = self.driver.recommendations().await?;
        self.actions.push("get_recommendations", Some(ids(&videos)));
        Ok(videos)
    }

    /// Attempt one watch; only successful watches are logged as actions
    async fn watch(&mut self, video: &VideoRef, duration: Duration) -> WatchOutcome {
        match self.driver.play(video, duration).await {
            Ok(()) => {
                self.actions
                    .push("watch", Some(ActionParams::Video(video.video_id.clone())));
                WatchOutcome::Watched
            }
            Err(RunError::VideoUnavailable(_)) => WatchOutcome::Skipped,
            Err(e) => WatchOutcome::Failed(e),
        }
    }

    async fn close(&mut self) -> Result<(), RunError> {
        self.closed = true;
        self.driver.close().await
    }
}

fn ids(videos: &[VideoRef]) -> ActionParams {
    ActionParams::Videos(videos.iter().map(|v| v.video_id.clone()).collect())
}

/// Watch training videos in manifest order until `trainingN` succeed.
///
/// Running out of videos first is not an error; the log simply holds fewer
/// watches.
pub async fn run_training(ctx: &mut RunContext) -> Result<TrainingReport, RunError> {
    ctx.get_homepage().await?;
    ctx.actions.push("training_start", None);

    let training: Vec<String> = ctx
        .manifest
        .training_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    let required = ctx.manifest.training_n;
    let duration = ctx.watch_duration();
    let mut report = TrainingReport::default();

    for video_id in training {
        if report.watched >= required {
            break;
        }
        let outcome = ctx.watch(&VideoRef::from_id(&video_id), duration).await;
        match &outcome {
            WatchOutcome::Watched => report.watched += 1,
            WatchOutcome::Skipped => {
                info!(video_id = %video_id, "training video unavailable, skipping");
                report.skipped += 1;
            }
            WatchOutcome::Failed(e) => {
                warn!(video_id = %video_id, error = %e, "training watch failed, continuing");
                report.failed += 1;
            }
        }
        if failure_policy(Phase::Train, &outcome) == FailurePolicy::Abort {
            return Err(into_error("training", &video_id, outcome));
        }
    }

    if report.watched < required {
        warn!(watched = report.watched, required, "training list exhausted early");
    }
    ctx.actions.push("training_end", None);
    Ok(report)
}

/// Chase the first recommendation for `TEST_HOPS` hops, starting at the seed
pub async fn run_testing(ctx: &mut RunContext) -> Result<(), RunError> {
    ctx.get_homepage().await?;
    ctx.actions.push("testing_start", None);

    let mut video = VideoRef::from_id(ctx.manifest.test_seed.clone());
    for hop in 0..TEST_HOPS {
        let outcome = ctx.watch(&video, Duration::ZERO).await;
        if failure_policy(Phase::Test, &outcome) == FailurePolicy::Abort {
            return Err(into_error("testing", &video.video_id, outcome));
        }
        let recommendations = ctx.get_recommendations().await?;
        video = recommendations.into_iter().next().ok_or_else(|| {
            RunError::phase(
                "testing",
                format!("no recommendations after {} (hop {})", video.video_id, hop + 1),
            )
        })?;
    }

    ctx.actions.push("testing_end", None);
    Ok(())
}

/// Watch each intervention video, re-reading the homepage after every watch
pub async fn run_intervention(ctx: &mut RunContext) -> Result<(), RunError> {
    let Some(videos) = ctx.manifest.intervention.clone() else {
        warn!("intervention step listed without intervention videos, skipping");
        return Ok(());
    };

    ctx.get_homepage().await?;
    ctx.actions.push("intervention_start", None);

    let duration = ctx.watch_duration();
    for video_id in videos {
        let outcome = ctx.watch(&VideoRef::from_id(&video_id), duration).await;
        if failure_policy(Phase::Intervention, &outcome) == FailurePolicy::Abort {
            return Err(into_error("intervention", &video_id, outcome));
        }
        ctx.get_homepage().await?;
    }

    ctx.actions.push("intervention_end", None);
    Ok(())
}

fn into_error(phase: &'static str, video_id: &str, outcome: WatchOutcome) -> RunError {
    match outcome {
        WatchOutcome::Skipped => RunError::phase(phase, format!("video unavailable: {}", video_id)),
        WatchOutcome::Failed(e) => RunError::phase(phase, format!("{}: {}", video_id, e)),
        WatchOutcome::Watched => RunError::phase(phase, "aborted after a successful watch"),
    }
}

/// Executes one manifest end to end
pub struct PuppetRunner {
    launcher: Arc<dyn DriverLauncher>,
}

impl PuppetRunner {
    pub fn new(launcher: Arc<dyn DriverLauncher>) -> Self {
        Self { launcher }
    }

    /// Run every listed phase and return the single terminal record. Never fails.
    pub async fn run(&self, manifest: TaskManifest, records: &RecordStore) -> TerminalRecord {
        let puppet_id = manifest.puppet_id.clone();
        info!(puppet_id = %puppet_id, steps = %manifest.steps, "initializing puppet");

        let mut ctx = match self.initialize(manifest, records).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(puppet_id = %puppet_id, error = %e, "session setup failed");
                return TerminalRecord::Errored(ExceptionRecord::new(e.to_string()));
            }
        };

        match execute(&mut ctx).await {
            Ok(()) => {
                ctx.transition(RunState::Done);
                TerminalRecord::Completed(finish(ctx))
            }
            Err(e) => {
                error!(puppet_id = %puppet_id, state = ?ctx.state, error = %e, "puppet run failed");
                ctx.transition(RunState::Errored);
                if !ctx.closed {
                    if let Err(close_err) = ctx.close().await {
                        warn!(error = %close_err, "failed to close session after error");
                    }
                }
                TerminalRecord::Errored(ExceptionRecord::new(e.to_string()))
            }
        }
    }

    /// Run the manifest and persist its terminal record under `outputDir`
    pub async fn run_and_persist(&self, manifest: TaskManifest) -> Result<(TerminalRecord, PathBuf)> {
        let records = RecordStore::new(&manifest.output_dir);
        let puppet_id = manifest.puppet_id.clone();
        let record = self.run(manifest, &records).await;
        let path = records.persist(&puppet_id, &record)?;
        info!(puppet_id = %puppet_id, path = %path.display(), completed = record.is_completed(), "record written");
        Ok((record, path))
    }

    async fn initialize(&self, manifest: TaskManifest, records: &RecordStore) -> Result<RunContext, RunError> {
        let profile_dir = records
            .profile_dir(&manifest.puppet_id)
            .map_err(|e| RunError::Session(format!("{:#}", e)))?;
        let driver = self.launcher.open(&profile_dir).await?;
        Ok(RunContext::new(manifest, driver))
    }
}

/// Phases in `steps` order, then close the session
async fn execute(ctx: &mut RunContext) -> Result<(), RunError> {
    let (phases, unknown) = ctx.manifest.phases();
    for step in unknown {
        warn!(step = %step, "ignoring unknown step");
    }

    for phase in phases {
        ctx.transition(RunState::for_phase(phase));
        info!(step = phase.step_name(), "phase start");
        match phase {
            Phase::Train => {
                let report = run_training(ctx).await?;
                info!(watched = report.watched, skipped = report.skipped, failed = report.failed, "training done");
            }
            Phase::Test => run_testing(ctx).await?,
            Phase::Intervention => run_intervention(ctx).await?,
        }
    }

    ctx.transition(RunState::Finalizing);
    ctx.close().await
}

fn finish(ctx: RunContext) -> RunRecord {
    let end_time = Utc::now();
    let elapsed = end_time - ctx.start_time;
    RunRecord {
        puppet_id: ctx.manifest.puppet_id.clone(),
        start_time: ctx.start_time,
        end_time,
        duration: elapsed.num_milliseconds() as f64 / 1000.0,
        description: ctx.manifest.description.clone(),
        actions: ctx.actions,
        manifest: ctx.manifest,
    }
}
