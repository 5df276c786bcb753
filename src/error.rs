// ABOUTME: Custom error types for the replication status monitor
// ABOUTME: Distinguishes configuration, upstream, per-job and watcher failures

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Missing cluster root or invalid options. Never retried.
    Configuration(String),
    Connection(String),
    /// Caller error, e.g. building a status with neither task nor config.
    Validation(String),
    /// The active task listing stayed malformed for every attempt.
    UpstreamInconsistency { attempts: u32, detail: String },
    JobBuild { job_id: String, message: String },
    WatcherStartup(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MonitorError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            MonitorError::Connection(msg) => write!(f, "Connection error: {}", msg),
            MonitorError::Validation(msg) => write!(f, "Validation error: {}", msg),
            MonitorError::UpstreamInconsistency { attempts, detail } => write!(
                f,
                "Upstream inconsistency: active task listing still malformed after {} attempt(s): {}",
                attempts, detail
            ),
            MonitorError::JobBuild { job_id, message } => {
                write!(f, "Failed to build status for job {}: {}", job_id, message)
            }
            MonitorError::WatcherStartup(msg) => write!(f, "Watcher startup error: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {}

/// Returns the `MonitorError` carried by an `anyhow::Error`, if any.
pub fn kind_of(err: &anyhow::Error) -> Option<&MonitorError> {
    err.downcast_ref::<MonitorError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_job_id() {
        let err = MonitorError::JobBuild {
            job_id: "rep-a".to_string(),
            message: "database not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to build status for job rep-a: database not found"
        );
    }

    #[test]
    fn test_kind_survives_anyhow_context() {
        use anyhow::Context;

        let result: anyhow::Result<()> = Err(MonitorError::Configuration("no url".into()).into());
        let err = result.context("loading monitor").unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&MonitorError::Configuration("no url".into()))
        );
    }
}
