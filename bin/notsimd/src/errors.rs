//! Failures of the bootstrap sequence.

use notsim_core::{CodecError, DecodeError};
use notsim_depinject::{BoxError, DepinjectError};
use notsim_server::{CommandError, ConfigError, ConsensusError, FactoryError};
use notsim_simapp::SimAppError;
use thiserror::Error;

/// Everything that can stop the node before the selected command runs.
#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    /// The arguments or the log level could not be understood.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// The configuration files could not be read or parsed.
    #[error("failed to load configuration")]
    ConfigLoadFailure(#[source] ConfigError),

    /// A binding has no way to be built.
    #[error("unresolved dependency")]
    UnresolvedDependency(#[source] DepinjectError),

    /// Providers require each other.
    #[error("cyclic dependency")]
    CyclicDependency(#[source] DepinjectError),

    /// The consensus engine could not be built.
    #[error("failed to construct the consensus engine")]
    ConsensusConstructionFailure(#[source] ConsensusError),

    /// The application or one of its bindings could not be built.
    #[error("failed to construct the application")]
    ApplicationConstructionFailure(#[source] SimAppError),

    /// Bytes were rejected by the transaction decoder.
    #[error("invalid transaction")]
    DecodeFailure(#[source] DecodeError),

    /// Decoding produced a transaction of another type.
    #[error("decoded a {found}, expected a {expected}")]
    TypeMismatch {
        /// The type the node runs with.
        expected: &'static str,

        /// The type the decoder produced.
        found: &'static str,
    },

    /// The command tree could not be assembled.
    #[error("failed to assemble the command tree")]
    CommandAssemblyFailure(#[source] CommandError),
}

impl From<FactoryError> for BootstrapError {
    fn from(err: FactoryError) -> Self {
        match err {
            FactoryError::InvalidInvocation(msg) => Self::InvalidInvocation(msg),
            FactoryError::InvalidLogLevel(err) => Self::InvalidInvocation(err.to_string()),
            FactoryError::ConfigLoadFailure(err) => Self::ConfigLoadFailure(err),
        }
    }
}

/// Whether a provider failed on a client setting it read from the configuration.
fn is_client_config_error(source: &BoxError) -> bool {
    matches!(source.downcast_ref::<SimAppError>(), Some(SimAppError::Client(_)))
}

impl From<DepinjectError> for BootstrapError {
    fn from(err: DepinjectError) -> Self {
        match err {
            err @ DepinjectError::UnresolvedDependency { .. } => Self::UnresolvedDependency(err),
            err @ DepinjectError::CyclicDependency { .. } => Self::CyclicDependency(err),
            DepinjectError::ProviderFailed { source, .. } if is_client_config_error(&source) => {
                Self::ConfigLoadFailure(ConfigError::Rejected(source))
            }
            other => Self::ApplicationConstructionFailure(SimAppError::Depinject(other)),
        }
    }
}

impl From<SimAppError> for BootstrapError {
    fn from(err: SimAppError) -> Self {
        match err {
            SimAppError::Depinject(err) => err.into(),
            other => Self::ApplicationConstructionFailure(other),
        }
    }
}

impl From<ConsensusError> for BootstrapError {
    fn from(err: ConsensusError) -> Self {
        Self::ConsensusConstructionFailure(err)
    }
}

impl From<CommandError> for BootstrapError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::InvalidInvocation(msg) => Self::InvalidInvocation(msg),
            other => Self::CommandAssemblyFailure(other),
        }
    }
}

impl From<CodecError> for BootstrapError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::DecodeFailure(err) => Self::DecodeFailure(err),
            CodecError::TypeMismatch { expected, found } => Self::TypeMismatch { expected, found },
        }
    }
}
