use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::warn;

use crate::error::RunError;

/// Env var naming the driver helper executable
pub const DRIVER_ENV: &str = "PUPPET_DRIVER";

/// How long a helper gets to acknowledge `close` and exit
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// A video as the automation driver sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub video_id: String,
    pub url: String,
}

impl VideoRef {
    /// Reference a video by id
    pub fn from_id(video_id: impl Into<String>) -> Self {
        let video_id = video_id.into();
        let url = format!("https://youtube.com/watch?v={}", video_id);
        Self { video_id, url }
    }
}

/// One automated browsing session.
///
/// Calls are strictly sequential; a session is a single serialized stream of
/// user-like actions.
#[async_trait]
pub trait AutomationDriver: Send {
    /// Videos currently on the homepage, in display order
    async fn homepage(&mut self) -> Result<Vec<VideoRef>, RunError>;

    /// Recommendations next to the current video, in display order
    async fn recommendations(&mut self) -> Result<Vec<VideoRef>, RunError>;

    /// Load a video and dwell on it. `RunError::VideoUnavailable` when the
    /// platform refuses to play it.
    async fn play(&mut self, video: &VideoRef, duration: Duration) -> Result<(), RunError>;

    async fn close(&mut self) -> Result<(), RunError>;
}

/// Opens driver sessions bound to a profile directory
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn open(&self, profile_dir: &Path) -> Result<Box<dyn AutomationDriver>, RunError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverRequest<'a> {
    Homepage,
    Recommendations,
    Play {
        video_id: &'a str,
        url: &'a str,
        duration: u64,
    },
    Close,
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    ok: bool,
    #[serde(default)]
    videos: Vec<VideoRef>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl DriverReply {
    fn into_result(self) -> Result<Vec<VideoRef>, RunError> {
        if self.ok {
            return Ok(self.videos);
        }
        let message = self.message.unwrap_or_default();
        match self.error.as_deref() {
            Some("unavailable") => Err(RunError::VideoUnavailable(message)),
            Some(kind) => Err(RunError::Driver(format!("{}: {}", kind, message))),
            None => Err(RunError::Driver(message)),
        }
    }
}

/// Launches an external driver helper per session
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    pub program: String,
    pub args: Vec<String>,
    pub close_timeout: Duration,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            close_timeout: CLOSE_TIMEOUT,
        }
    }

    /// Helper named by `PUPPET_DRIVER`, or `puppet-driver`
    pub fn from_env() -> Self {
        Self::new(std::env::var(DRIVER_ENV).unwrap_or_else(|_| "puppet-driver".into()))
    }
}

#[async_trait]
impl DriverLauncher for CommandLauncher {
    async fn open(&self, profile_dir: &Path) -> Result<Box<dyn AutomationDriver>, RunError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--profile-dir")
            .arg(profile_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::Session(format!("failed to start {}: {}", self.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RunError::Session("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunError::Session("driver stdout unavailable".into()))?;

        Ok(Box::new(CommandDriver {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            close_timeout: self.close_timeout,
        }))
    }
}

/// Talks newline-delimited JSON to a driver helper over stdin/stdout
pub struct CommandDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    close_timeout: Duration,
}

impl CommandDriver {
    async fn request(&mut self, request: &DriverRequest<'_>) -> Result<Vec<VideoRef>, RunError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let reply = self
            .stdout
            .next_line()
            .await?
            .ok_or_else(|| RunError::Driver("driver exited unexpectedly".into()))?;
        let reply: DriverReply = serde_json::from_str(&reply)?;
        reply.into_result()
    }
}

#[async_trait]
impl AutomationDriver for CommandDriver {
    async fn homepage(&mut self) -> Result<Vec<VideoRef>, RunError> {
        self.request(&DriverRequest::Homepage).await
    }

    async fn recommendations(&mut self) -> Result<Vec<VideoRef>, RunError> {
        self.request(&DriverRequest::Recommendations).await
    }

    async fn play(&mut self, video: &VideoRef, duration: Duration) -> Result<(), RunError> {
        self.request(&DriverRequest::Play {
            video_id: &video.video_id,
            url: &video.url,
            duration: duration.as_secs(),
        })
        .await
        .map(|_| ())
    }

    async fn close(&mut self) -> Result<(), RunError> {
        let limit = self.close_timeout;
        let result = match tokio::time::timeout(limit, self.request(&DriverRequest::Close)).await {
            Ok(reply) => reply.map(|_| ()),
            Err(_) => Err(RunError::Driver("driver did not acknowledge close".into())),
        };
        wait_or_kill(&mut self.child, limit).await?;
        result
    }
}

/// Wait for the helper to exit, killing it once `limit` has passed
async fn wait_or_kill(child: &mut Child, limit: Duration) -> Result<ExitStatus, RunError> {
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!(limit_ms = limit.as_millis() as u64, "driver did not exit, killing it");
            child.kill().await?;
            Ok(child.wait().await?)
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory driver with scripted availability
    #[derive(Default)]
    pub struct ScriptedDriver {
        pub homepage: Vec<String>,
        pub unavailable: HashSet<String>,
        pub broken: HashSet<String>,
        /// Recommendations come back empty after this many calls
        pub recommendations_limit: Option<usize>,
        pub fail_close: bool,
        pub plays: Arc<Mutex<Vec<(String, Duration)>>>,
        pub closed: Arc<AtomicBool>,
        recommendation_calls: usize,
    }

    impl ScriptedDriver {
        pub fn new() -> Self {
            Self {
                homepage: vec!["home1".into(), "home2".into()],
                ..Self::default()
            }
        }

        pub fn unavailable(mut self, ids: &[&str]) -> Self {
            self.unavailable.extend(ids.iter().map(|s| s.to_string()));
            self
        }

        pub fn broken(mut self, ids: &[&str]) -> Self {
            self.broken.extend(ids.iter().map(|s| s.to_string()));
            self
        }
    }

    #[async_trait]
    impl AutomationDriver for ScriptedDriver {
        async fn homepage(&mut self) -> Result<Vec<VideoRef>, RunError> {
            Ok(self.homepage.iter().map(VideoRef::from_id).collect())
        }

        async fn recommendations(&mut self) -> Result<Vec<VideoRef>, RunError> {
            self.recommendation_calls += 1;
            if self
                .recommendations_limit
                .is_some_and(|limit| self.recommendation_calls > limit)
            {
                return Ok(Vec::new());
            }
            Ok(vec![
                VideoRef::from_id(format!("rec{}", self.recommendation_calls)),
                VideoRef::from_id("sidebar"),
            ])
        }

        async fn play(&mut self, video: &VideoRef, duration: Duration) -> Result<(), RunError> {
            if self.unavailable.contains(&video.video_id) {
                return Err(RunError::VideoUnavailable(video.video_id.clone()));
            }
            if self.broken.contains(&video.video_id) {
                return Err(RunError::Driver(format!("player crashed on {}", video.video_id)));
            }
            self.plays
                .lock()
                .unwrap()
                .push((video.video_id.clone(), duration));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), RunError> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                return Err(RunError::Driver("browser already gone".into()));
            }
            Ok(())
        }
    }

    /// Hands out one prepared driver, or fails to open a session
    pub struct ScriptedLauncher {
        driver: Mutex<Option<ScriptedDriver>>,
    }

    impl ScriptedLauncher {
        pub fn new(driver: ScriptedDriver) -> Self {
            Self {
                driver: Mutex::new(Some(driver)),
            }
        }

        pub fn failing() -> Self {
            Self {
                driver: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl DriverLauncher for ScriptedLauncher {
        async fn open(&self, _profile_dir: &Path) -> Result<Box<dyn AutomationDriver>, RunError> {
            let driver = self.driver.lock().unwrap().take();
            match driver {
                Some(driver) => Ok(Box::new(driver)),
                None => Err(RunError::Session("browser failed to start".into())),
            }
        }
    }
}
