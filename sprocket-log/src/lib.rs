//! Sprocket Logging
//!
//! Installs a `tracing` subscriber configured from the environment. Every
//! Sprocket crate logs through the `tracing` macros; this crate only decides
//! where those events go and how they look.
//!
//! # Usage
//!
//! ```no_run
//! use sprocket_log::{LogConfig, info};
//!
//! let _guard = LogConfig::from_env().init();
//! info!(port = 3000, "Listening");
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_LEVEL=trace|debug|info|warn|error|fatal|off` - Set log level
//! - `LOG_FORMAT=pretty|json|compact` - Set output format
//! - `SPROCKET_DEBUG=1` - Force debug logging regardless of `LOG_LEVEL`
//! - `RUST_LOG` - Full `EnvFilter` directive, overrides the level when set

use std::collections::HashMap;
use std::env;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::{debug, error, info, trace, warn};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of events that are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name. `fatal` is accepted as an alias of `error`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "fatal" => Some(Level::Error),
            "off" | "silent" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Single-line output
    Compact,
    /// One JSON object per line
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether to include the event target (module path)
    pub targets: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Custom `EnvFilter` directive, overrides `level` when set
    pub env_filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Pretty,
            targets: true,
            timestamps: true,
            env_filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(&env::vars().collect())
    }

    /// Build the configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let debug = vars
            .get("SPROCKET_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let level = if debug {
            Level::Debug
        } else {
            vars.get("LOG_LEVEL")
                .and_then(|s| Level::parse(s))
                .unwrap_or(Level::Info)
        };

        let format = vars
            .get("LOG_FORMAT")
            .and_then(|s| Format::parse(s))
            .unwrap_or(Format::Pretty);

        Self {
            level,
            format,
            env_filter: vars.get("RUST_LOG").cloned(),
            ..Self::default()
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.timestamps = enable;
        self
    }

    /// Set a custom filter, e.g. `"sprocket_core=debug,hyper=info"`.
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(directive) => {
                EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }

    /// Install the global subscriber writing to stderr.
    ///
    /// Returns the writer guard; logs are flushed when it is dropped. Returns
    /// `None` when a global subscriber was already installed.
    pub fn init(self) -> Option<WorkerGuard> {
        let (writer, guard) = tracing_appender::non_blocking(io::stderr());
        let filter = self.filter();
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match (self.format, self.timestamps) {
            (Format::Json, _) => registry
                .with(fmt::layer().json().with_writer(writer).with_target(self.targets))
                .try_init(),
            (Format::Pretty, true) => registry
                .with(fmt::layer().pretty().with_writer(writer).with_target(self.targets))
                .try_init(),
            (Format::Pretty, false) => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .without_time()
                        .with_writer(writer)
                        .with_target(self.targets),
                )
                .try_init(),
            (Format::Compact, true) => registry
                .with(fmt::layer().compact().with_writer(writer).with_target(self.targets))
                .try_init(),
            (Format::Compact, false) => registry
                .with(
                    fmt::layer()
                        .compact()
                        .without_time()
                        .with_writer(writer)
                        .with_target(self.targets),
                )
                .try_init(),
        };

        installed.ok().map(|_| guard)
    }
}
