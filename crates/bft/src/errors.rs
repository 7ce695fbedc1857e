//! Errors of the consensus engine.

use notsim_common::logging::LogLevelError;
use notsim_server::ConsensusError;
use thiserror::Error;

/// Errors raised while configuring the engine.
#[derive(Debug, Error)]
pub enum BftError {
    /// The engine log level is not understood.
    #[error("invalid log level: {0}")]
    InvalidLogLevel(#[from] LogLevelError),

    /// The commit timeout is zero.
    #[error("consensus.timeout_commit must be positive")]
    ZeroTimeout,

    /// An address is not of the form `[scheme://]host:port`.
    #[error("{key} is not a valid address: `{value}`")]
    InvalidAddress {
        /// The configuration key.
        key: &'static str,

        /// The rejected value.
        value: String,
    },

    /// The configuration did not serialize into a table.
    #[error("engine config serialized into a {0}, expected a table")]
    NotATable(&'static str),

    /// The configuration could not be serialized.
    #[error("could not serialize engine config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration section could not be deserialized.
    #[error("could not read engine config: {0}")]
    Deserialize(#[from] toml::de::Error),
}

impl From<BftError> for ConsensusError {
    fn from(err: BftError) -> Self {
        let key = match &err {
            BftError::InvalidLogLevel(_) => "bft.log_level".to_string(),
            BftError::ZeroTimeout => "bft.consensus.timeout_commit".to_string(),
            BftError::InvalidAddress { key, .. } => format!("bft.{key}"),
            _ => "bft".to_string(),
        };
        ConsensusError::InvalidConfig {
            key,
            reason: err.to_string(),
        }
    }
}
