use std::fmt;
use std::str::FromStr;

use crate::types::{CatalogError, Result};
use tracing_subscriber::EnvFilter;

/// Line layout of emitted events.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Timestamp, level, target, thread id and every field.
    #[default]
    Full,
    /// Single-line events with span context folded in.
    Compact,
}

impl FromStr for LogFormat {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown log format '{other}', expected full or compact"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Full => "full",
            LogFormat::Compact => "compact",
        })
    }
}

/// How [`init_logging`] sets up the global subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `metacat::migration=debug`.
    pub level: String,
    /// Event layout.
    pub format: LogFormat,
    /// Colour escapes; leave off when stderr is not a terminal.
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Full,
            ansi: false,
        }
    }
}

impl LogSettings {
    /// Settings with the given filter directive and defaults otherwise.
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.level)
            .map_err(|e| CatalogError::InvalidArgument(format!("Invalid log level: {e}")))
    }
}

/// Installs the global `fmt` subscriber writing to stderr. Stdout stays reserved for
/// command output.
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter()?)
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(settings.ansi)
        .with_writer(std::io::stderr);
    let installed = match settings.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|_| CatalogError::InvalidArgument("Logging already initialized".into()))
}
