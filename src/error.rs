use thiserror::Error;

/// Failures of the launch controller.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The corpus is malformed or lacks a required column. Aborts before any launch.
    #[error("data error: {0}")]
    Data(String),

    /// A cohort has fewer candidates than the training set needs.
    #[error("cohort '{cohort}' has {available} videos, {required} required")]
    InsufficientData {
        cohort: String,
        required: usize,
        available: usize,
    },

    /// The seed pool is empty.
    #[error("seed pool is empty")]
    EmptyPool,

    /// The runtime could not report its running count. Admission treats this as "full".
    #[error("runtime query failed: {0}")]
    RuntimeQuery(String),

    /// Any other container runtime failure (build or run).
    #[error("container runtime error: {0}")]
    Runtime(String),
}

/// Failures inside a puppet run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The automation session could not be established.
    #[error("session error: {0}")]
    Session(String),

    /// The platform reported the video as unavailable.
    #[error("video unavailable: {0}")]
    VideoUnavailable(String),

    /// A phase could not continue.
    #[error("{phase} phase failed: {message}")]
    Phase { phase: &'static str, message: String },

    /// The driver failed outside of a play request.
    #[error("driver error: {0}")]
    Driver(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RunError {
    pub fn phase(phase: &'static str, message: impl Into<String>) -> Self {
        Self::Phase {
            phase,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = LaunchError::InsufficientData {
            cohort: "Left".into(),
            required: 10,
            available: 3,
        };
        assert_eq!(err.to_string(), "cohort 'Left' has 3 videos, 10 required");
    }

    #[test]
    fn test_phase_error_message() {
        let err = RunError::phase("testing", "no recommendations");
        assert_eq!(err.to_string(), "testing phase failed: no recommendations");
    }
}
