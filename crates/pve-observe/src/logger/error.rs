use thiserror::Error;

/// Failures while configuring or installing the process-wide subscriber.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}, expected text, json or journald")]
    UnknownFormat(String),
    #[error("{key}={value:?} is not a valid logging setting: {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid filter directive {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },
    #[error("journald output needs linux and the `journald` feature")]
    JournaldUnavailable,
    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
    #[error("subscriber install failed: {0}")]
    Install(String),
}
