//! Errors raised by the server crate.

use std::{io, path::PathBuf};

use notsim_common::logging::LogLevelError;
use notsim_core::CodecError;
use thiserror::Error;

use crate::component::Binding;

/// Errors while loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file exists but could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// The file.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A configuration file is not valid TOML.
    #[error("failed to parse config file {path}")]
    Parse {
        /// The file.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A configuration file could not be written.
    #[error("failed to write config file {path}")]
    Write {
        /// The file.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Default configuration could not be serialized.
    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),

    /// A value given through the environment or a flag does not fit the key's type.
    #[error("invalid value `{value}` for config key `{key}`: expected {expected}")]
    InvalidValue {
        /// The key.
        key: String,

        /// The raw value.
        value: String,

        /// The expected type.
        expected: &'static str,
    },

    /// The user's home directory could not be determined.
    #[error("cannot determine the user home directory")]
    HomeDirUnavailable,

    /// A loaded value was refused by the component reading it.
    #[error("invalid configuration value")]
    Rejected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised while classifying an invocation.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The arguments cannot be parsed.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// The configured log level is not understood.
    #[error("invalid log level")]
    InvalidLogLevel(#[from] LogLevelError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    ConfigLoadFailure(#[from] ConfigError),
}

/// Errors raised while building or executing the command tree.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Two commands with the same name were registered under the same parent.
    #[error("duplicate command `{name}` under `{parent}`")]
    DuplicateCommand {
        /// The parent command.
        parent: String,

        /// The duplicated name.
        name: String,
    },

    /// The arguments were rejected by the parser.
    #[error("{0}")]
    InvalidInvocation(String),

    /// The pre-execution hook did not leave the context the command asked for.
    #[error("command context of type {0} is not available")]
    MissingContext(&'static str),

    /// Writing the command output failed.
    #[error("i/o error")]
    Io(#[from] io::Error),

    /// A server operation failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A consensus operation failed.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// A transaction could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A configuration operation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Any other failure reported by a command body.
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    /// Wraps any displayable error as a command failure.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Errors raised by consensus engines and the consensus handle.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A configuration key the engine needs is absent.
    #[error("missing consensus config `{0}`")]
    MissingConfig(String),

    /// A configuration value is not usable.
    #[error("invalid consensus config `{key}`: {reason}")]
    InvalidConfig {
        /// The key.
        key: String,

        /// Why it was rejected.
        reason: String,
    },

    /// The engine was built in another state than the one requested.
    #[error("consensus component is {actual:?}, expected {expected:?}")]
    BindingMismatch {
        /// Requested state.
        expected: Binding,

        /// Actual state.
        actual: Binding,
    },

    /// The operation needs application bindings but the handle is pre-bound.
    #[error("consensus component `{0}` is not bound to an application")]
    NotFullyBound(String),

    /// The application rejected a transaction.
    #[error(transparent)]
    App(#[from] AppError),
}

/// Errors raised by server components at runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A component that needs application bindings was started without them.
    #[error("component `{0}` cannot start without application bindings")]
    NotBound(String),

    /// A component failed to start.
    #[error("component `{component}` failed to start: {reason}")]
    Start {
        /// The component.
        component: String,

        /// Why.
        reason: String,
    },

    /// A component failed to stop.
    #[error("component `{component}` failed to stop: {reason}")]
    Stop {
        /// The component.
        component: String,

        /// Why.
        reason: String,
    },

    /// Waiting for the shutdown signal failed.
    #[error("i/o error")]
    Io(#[from] io::Error),
}

/// Errors reported by the application collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// A message has no handler in any module.
    #[error("no module handles message {0}")]
    UnknownMsgRoute(String),

    /// A transaction is structurally invalid for the application.
    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    /// A query route has no handler.
    #[error("unknown query route {0}")]
    UnknownQueryRoute(String),

    /// Two modules registered the same query route.
    #[error("query route {0} registered twice")]
    DuplicateQueryRoute(String),

    /// Any other application failure.
    #[error("{0}")]
    Internal(String),
}
