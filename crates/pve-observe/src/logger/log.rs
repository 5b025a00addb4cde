use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

#[cfg(all(target_os = "linux", feature = "journald"))]
const SYSLOG_IDENTIFIER: &str = "pve-client";

type Sink = Box<dyn Layer<Registry> + Send + Sync + 'static>;

pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = filter::build(&cfg.level)?;
    let sink = sink(cfg)?;

    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInstalled);
    }
    tracing_subscriber::registry()
        .with(sink.with_filter(filter))
        .try_init()
        .map_err(|e| LoggerError::Install(e.to_string()))?;

    tracing::debug!(
        target: "pve.observe",
        format = %cfg.format,
        filter = %cfg.level,
        "logger installed"
    );
    Ok(())
}

fn sink(cfg: &LoggerConfig) -> Result<Sink, LoggerError> {
    let sink: Sink = match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .with_target(cfg.with_targets)
            .with_current_span(false)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Journald => journald()?,
    };
    Ok(sink)
}

fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald() -> Result<Sink, LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::Install(format!("journald: {e}")))?
        .with_syslog_identifier(SYSLOG_IDENTIFIER.to_string());
    Ok(layer.boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald() -> Result<Sink, LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}

/// Filter construction shared by config loading and install.
pub(crate) mod filter {
    use tracing_subscriber::{EnvFilter, filter::Directive};

    use crate::logger::error::LoggerError;

    /// HTTP stack crates that are capped at `warn` unless the directive names them.
    const TRANSPORT_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

    pub(crate) fn build(directive: &str) -> Result<EnvFilter, LoggerError> {
        let invalid = |reason: String| LoggerError::InvalidFilter {
            directive: directive.to_string(),
            reason,
        };

        let mut filter = EnvFilter::try_new(directive).map_err(|e| invalid(e.to_string()))?;
        for target in TRANSPORT_TARGETS {
            if mentions(directive, target) {
                continue;
            }
            let quiet: Directive = format!("{target}=warn")
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| invalid(e.to_string()))?;
            filter = filter.add_directive(quiet);
        }
        Ok(filter)
    }

    fn mentions(directive: &str, target: &str) -> bool {
        directive
            .split(',')
            .filter_map(|part| part.split('=').next())
            .any(|t| t.trim() == target)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn accepts_pve_targets() {
            assert!(build("info").is_ok());
            assert!(build("warn,pve.core.request=debug").is_ok());
        }

        #[test]
        fn rejects_bad_level() {
            let err = build("info,pve=loud").unwrap_err();
            assert!(matches!(
                err,
                LoggerError::InvalidFilter { ref directive, .. } if directive == "info,pve=loud"
            ));
        }

        #[test]
        fn transport_noise_is_capped() {
            let rendered = build("debug").unwrap().to_string();
            assert!(rendered.contains("hyper=warn"));
            assert!(rendered.contains("reqwest=warn"));
        }

        #[test]
        fn explicit_transport_directive_wins() {
            let rendered = build("info,reqwest=debug").unwrap().to_string();
            assert!(rendered.contains("reqwest=debug"));
            assert!(!rendered.contains("reqwest=warn"));
            assert!(rendered.contains("hyper=warn"));
        }
    }
}
