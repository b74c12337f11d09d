//! Tracing initialisation.
//!
//! Logs go to stderr so `--output json` keeps stdout machine-readable.
//! `ICLONE_LOG` (an `EnvFilter` directive string such as
//! `instclone=debug`) overrides `--log-level` when set.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::CliError;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "ICLONE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Single-line human-readable records
    Compact,
    /// One JSON object per record
    Json,
}

fn env_filter(level: LogLevel) -> Result<EnvFilter, CliError> {
    if std::env::var_os(LOG_ENV).is_some() {
        return EnvFilter::try_from_env(LOG_ENV).map_err(|source| CliError::LogFilter { source });
    }
    Ok(EnvFilter::default().add_directive(LevelFilter::from(level).into()))
}

/// Install the global subscriber.
pub fn init_tracing(level: LogLevel, format: LogFormat) -> Result<(), CliError> {
    let filter = env_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match format {
        LogFormat::Compact => builder.compact().finish().try_init(),
        LogFormat::Json => builder.json().finish().try_init(),
    };
    result.map_err(|source| CliError::LogInit { source })
}
