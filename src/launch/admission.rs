use std::time::Duration;

use tracing::{info, warn};

use super::runtime::ContainerRuntime;

/// Outcome of one admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Running count observed at the moment of admission
    pub observed_running: usize,
    /// Number of sleeps before admission
    pub waits: usize,
}

/// Block until the runtime reports fewer than `max_concurrent` running containers.
///
/// A failed query counts as "ceiling reached". The check and the subsequent
/// launch are not atomic, so the ceiling is a soft bound when other actors
/// share the runtime.
pub async fn admit<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    max_concurrent: usize,
    poll_interval: Duration,
) -> Admission {
    let mut waits = 0;
    loop {
        match runtime.list_running().await {
            Ok(running) if running < max_concurrent => {
                return Admission {
                    observed_running: running,
                    waits,
                };
            }
            Ok(running) => {
                info!(running, max_concurrent, "max containers reached, sleeping");
            }
            Err(e) => {
                warn!(error = %e, "runtime query failed, assuming ceiling reached");
            }
        }
        waits += 1;
        tokio::time::sleep(poll_interval).await;
    }
}
