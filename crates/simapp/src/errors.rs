//! Errors of the simulation application.

use notsim_client::ClientError;
use notsim_depinject::DepinjectError;
use notsim_server::AppError;
use thiserror::Error;

/// Errors raised while building the application or its bindings.
#[derive(Debug, Error)]
pub enum SimAppError {
    /// `store.app_db_backend` names a backend that is not available.
    #[error("unsupported store backend `{0}`, only memdb is available")]
    UnsupportedBackend(String),

    /// A configuration value is not usable.
    #[error("invalid app config `{key}`: {reason}")]
    InvalidConfig {
        /// The key.
        key: String,

        /// Why it was rejected.
        reason: String,
    },

    /// The configuration does not say where the home directory is.
    #[error("the configuration has no home directory")]
    MissingHome,

    /// A module is listed in the app config but does not exist.
    #[error("unknown module `{0}`")]
    UnknownModule(String),

    /// A module is listed twice.
    #[error("module `{0}` listed twice")]
    DuplicateModule(String),

    /// Resolving the bindings failed.
    #[error(transparent)]
    Depinject(#[from] DepinjectError),

    /// Registering the application's routes failed.
    #[error(transparent)]
    App(#[from] AppError),

    /// Building the client context failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}
