//! Provides utilities to initialize logging and to hand a logger around during bootstrap.
use std::env;

use thiserror::Error;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable name for the service label, which is appended to the
/// whoami string.
pub const SVC_LABEL_ENVVAR: &str = "NOTSIMD_SVC_LABEL";

/// Log level used when nothing else is configured.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Error returned when a configured log level cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogLevelError {
    /// A level name is not one of the known levels.
    #[error("unknown log level `{0}`")]
    UnknownLevel(String),

    /// A `module:level` pair is missing one of its halves.
    #[error("malformed log level entry `{0}`")]
    MalformedEntry(String),
}

/// Configuration for the logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// The whoami string, which is used to identify the service in logs.
    whoami: String,

    /// Filter directive in [`EnvFilter`] syntax.
    filter: String,

    /// Whether to colorize the output.
    with_ansi: bool,
}

impl LoggerConfig {
    /// Creates a new instance with whoami set and the default level.
    pub fn new(whoami: String) -> Self {
        Self {
            whoami,
            filter: DEFAULT_LOG_LEVEL.to_string(),
            with_ansi: true,
        }
    }

    /// Creates a new instance with the whoami string set to the provided
    /// string.
    pub fn with_base_name(s: &str) -> Self {
        Self::new(get_whoami_string(s))
    }

    /// Sets the filter from a node-style log level (`*:warn,p2p:info`).
    pub fn set_log_level(&mut self, level: &str) -> Result<(), LogLevelError> {
        self.filter = translate_log_level(level)?;
        Ok(())
    }

    /// Enables or disables colored output.
    pub fn set_ansi(&mut self, with_ansi: bool) {
        self.with_ansi = with_ansi;
    }

    /// The whoami string.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }

    /// The filter directive that will be installed.
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("notsimd")
    }
}

/// Initializes the logging subsystem with the provided config.
///
/// `RUST_LOG` takes precedence over the configured filter. Returns `false` if a global subscriber
/// was already installed, in which case the existing one is kept.
pub fn init(config: &LoggerConfig) -> bool {
    let filt = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let log_file = env::var("LOG_FILE").is_ok_and(|v| v == "1");
    let log_line_num = env::var("LOG_LINE_NUM").is_ok_and(|v| v == "1");

    // Logs go to stderr, stdout only carries command output.
    let stderr_sub = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.with_ansi)
        .event_format(
            tracing_subscriber::fmt::format()
                .compact()
                .with_file(log_file)
                .with_line_number(log_line_num),
        )
        .with_filter(filt);

    let installed = tracing_subscriber::registry()
        .with(stderr_sub)
        .try_init()
        .is_ok();

    if installed {
        info!(whoami = %config.whoami, filter = %config.filter, "logging started");
    }

    installed
}

/// Gets the service label from the standard envvar, which should be included
/// in the whoami string.
pub fn get_service_label_from_env() -> Option<String> {
    env::var(SVC_LABEL_ENVVAR).ok()
}

/// Computes a standard whoami string.
pub fn get_whoami_string(base: &str) -> String {
    match get_service_label_from_env() {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}

/// Translates a node-style log level into an [`EnvFilter`] directive.
///
/// The node syntax is a comma separated list of `module:level` pairs where `*` names the default
/// level, e.g. `*:warn,server:info`. A bare level is accepted as the default level.
pub fn translate_log_level(level: &str) -> Result<String, LogLevelError> {
    let mut default = None;
    let mut directives = Vec::new();

    for entry in level.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once(':') {
            None => default = Some(normalize_level(entry)?),
            Some((module, lvl)) => {
                let module = module.trim();
                if module.is_empty() || lvl.trim().is_empty() {
                    return Err(LogLevelError::MalformedEntry(entry.to_string()));
                }
                let lvl = normalize_level(lvl.trim())?;
                if module == "*" {
                    default = Some(lvl);
                } else {
                    directives.push(format!("{module}={lvl}"));
                }
            }
        }
    }

    let mut out = vec![default.unwrap_or(DEFAULT_LOG_LEVEL).to_string()];
    out.extend(directives);
    Ok(out.join(","))
}

fn normalize_level(level: &str) -> Result<&'static str, LogLevelError> {
    let lower = level.to_ascii_lowercase();
    let lower = match lower.as_str() {
        "none" | "disabled" => "off",
        "warning" => "warn",
        other => other,
    };
    LEVELS
        .iter()
        .find(|l| **l == lower)
        .copied()
        .ok_or_else(|| LogLevelError::UnknownLevel(level.to_string()))
}

/// Handle to the node's logger.
///
/// `tracing` keeps the subscriber global, so the handle mostly carries identity: the whoami
/// string and a root span that bootstrap stages and components enter.
#[derive(Debug, Clone)]
pub struct Logger {
    whoami: String,
    span: Span,
}

impl Logger {
    /// A logger that records nothing, used before the configuration is known.
    pub fn nop() -> Self {
        Self {
            whoami: String::new(),
            span: Span::none(),
        }
    }

    /// Installs the global subscriber (if not installed yet) and returns a handle to it.
    pub fn install(config: &LoggerConfig) -> Self {
        if !init(config) {
            debug!(whoami = %config.whoami, "global subscriber already installed, reusing it");
        }
        Self {
            whoami: config.whoami.clone(),
            span: info_span!("node", whoami = %config.whoami),
        }
    }

    /// Returns a logger scoped to the given module.
    pub fn with_module(&self, module: &'static str) -> Self {
        if self.span.is_none() {
            return self.clone();
        }
        Self {
            whoami: self.whoami.clone(),
            span: info_span!(parent: &self.span, "module", module),
        }
    }

    /// The root span of this logger.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The whoami string this logger was installed with.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }

    /// Whether this is the no-op logger.
    pub fn is_nop(&self) -> bool {
        self.whoami.is_empty() && self.span.is_none()
    }
}
