//! Logging
//!
//! Installs the global `tracing` subscriber of the command line tool. The format is human-readable unless
//! `CRAG_MC_LOG_FORMAT=json`, the level is controlled by `RUST_LOG` and all events go to stderr so that snapshots
//! printed on stdout stay parseable. Records of crates using the `log` facade are forwarded as well.
//!

use std::env;
use std::sync::OnceLock;
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_FORMAT_ENV: &str = "CRAG_MC_LOG_FORMAT";

static INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("environment variable `{name}` contained invalid UTF-8: {source}")]
    InvalidUnicode {
        name: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("unsupported log format `{provided}`; expected `human` or `json`")]
    UnsupportedFormat { provided: String },
    #[error("failed to install tracing subscriber: {source}")]
    InstallFailed {
        #[source]
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::UnsupportedFormat {
                provided: other.to_owned(),
            }),
        }
    }
}

/// install the subscriber once; a subscriber installed elsewhere is kept
pub fn init_logging() -> Result<(), LoggingError> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }
    match install_subscriber() {
        Ok(()) => {}
        Err(LoggingError::InstallFailed { source }) => {
            eprintln!("tracing subscriber already installed: {source}");
        }
        Err(error) => return Err(error),
    }
    let _ = INITIALIZED.set(());
    Ok(())
}

fn log_format() -> Result<LogFormat, LoggingError> {
    match env::var(LOG_FORMAT_ENV) {
        Ok(raw) => raw.parse(),
        Err(env::VarError::NotPresent) => Ok(LogFormat::Human),
        Err(source @ env::VarError::NotUnicode(_)) => Err(LoggingError::InvalidUnicode {
            name: LOG_FORMAT_ENV,
            source,
        }),
    }
}

fn install_subscriber() -> Result<(), LoggingError> {
    let format = log_format()?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let fmt_layer = match format {
        LogFormat::Human => fmt_layer.boxed(),
        LogFormat::Json => fmt_layer.json().with_current_span(true).boxed(),
    };
    let subscriber = tracing_subscriber::registry().with(env_filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|source| LoggingError::InstallFailed { source })?;
    // another logger may own the `log` facade already
    let _ = LogTracer::init();
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("human", LogFormat::Human)]
    #[test_case("HUMAN", LogFormat::Human)]
    #[test_case(" json ", LogFormat::Json)]
    fn logging_parse_format(raw: &str, expected: LogFormat) {
        // cargo test logging_parse_format -- --nocapture
        assert_eq!(raw.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn logging_rejects_unknown_format() {
        // cargo test logging_rejects_unknown_format -- --nocapture
        match "xml".parse::<LogFormat>() {
            Err(LoggingError::UnsupportedFormat { provided }) => assert_eq!(provided, "xml"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn logging_init_idempotent() {
        // cargo test logging_init_idempotent -- --nocapture
        init_logging().unwrap();
        init_logging().unwrap();
    }

    #[test]
    fn logging_installs_log_bridge() {
        // cargo test logging_installs_log_bridge -- --nocapture
        init_logging().unwrap();
        assert!(tracing::dispatcher::has_been_set());
        assert_eq!(tracing_log::log::max_level(), tracing_log::log::LevelFilter::Trace);
        assert!(matches!(install_subscriber(), Err(LoggingError::InstallFailed { .. })));
    }
}
