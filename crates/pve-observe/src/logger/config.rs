use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat, log::filter};

const ENV_FORMAT: &str = "PVE_LOG_FORMAT";
const ENV_LEVEL: &str = "PVE_LOG_LEVEL";
const ENV_COLOR: &str = "PVE_LOG_COLOR";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `info,pve.core.poller=trace`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by `PVE_LOG_FORMAT`, `PVE_LOG_LEVEL` and `PVE_LOG_COLOR`.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();

        if let Some(value) = lookup(ENV_FORMAT) {
            cfg.format = value
                .parse::<LoggerFormat>()
                .map_err(|e| invalid_env(ENV_FORMAT, &value, e))?;
        }
        if let Some(value) = lookup(ENV_LEVEL).filter(|l| !l.trim().is_empty()) {
            filter::build(&value).map_err(|e| invalid_env(ENV_LEVEL, &value, e))?;
            cfg.level = value;
        }
        if let Some(value) = lookup(ENV_COLOR) {
            cfg.use_color = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "always" => true,
                "0" | "false" | "no" | "never" => false,
                _ => {
                    return Err(LoggerError::InvalidEnv {
                        key: ENV_COLOR,
                        reason: "expected a boolean".into(),
                        value,
                    });
                }
            };
        }
        // Structured sinks never carry escape codes.
        if cfg.format != LoggerFormat::Text {
            cfg.use_color = false;
        }
        Ok(cfg)
    }
}

fn invalid_env(key: &'static str, value: &str, err: LoggerError) -> LoggerError {
    LoggerError::InvalidEnv {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    }
}
