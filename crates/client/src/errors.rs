//! Client errors.

use std::{io, path::PathBuf};

use notsim_core::{DecodeError, EncodeError};
use notsim_server::CommandError;
use thiserror::Error;

/// Errors raised by the client context and the commands built on it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Unknown output format.
    #[error("unknown output format `{0}`, expected text or json")]
    InvalidOutputFormat(String),

    /// Unknown keyring backend.
    #[error("unknown keyring backend `{0}`, expected os, file, test or memory")]
    InvalidKeyringBackend(String),

    /// Unknown broadcast mode.
    #[error("unknown broadcast mode `{0}`, expected sync or async")]
    InvalidBroadcastMode(String),

    /// Transactions need a chain id.
    #[error("chain id is required, set it with --chain-id or client.chain-id")]
    MissingChainId,

    /// Transactions need a signer.
    #[error("a signing key is required, set it with --from")]
    MissingFrom,

    /// The node address is empty or not a supported url.
    #[error("invalid node address `{0}`")]
    InvalidNode(String),

    /// The named key is not in the keyring.
    #[error("key `{0}` not found in keyring")]
    KeyNotFound(String),

    /// A key with that name exists already.
    #[error("key `{0}` already exists")]
    KeyExists(String),

    /// Reading or writing the keyring failed.
    #[error("keyring i/o error at {path}")]
    KeyringIo {
        /// The file or directory involved.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A key file is corrupt.
    #[error("malformed key file {path}: {reason}")]
    MalformedKey {
        /// The file.
        path: PathBuf,

        /// Why.
        reason: String,
    },

    /// The node rejected or failed a request.
    #[error("rpc call `{method}` failed: {reason}")]
    Rpc {
        /// Method called.
        method: String,

        /// Why.
        reason: String,
    },

    /// A command argument is malformed.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// The argument.
        name: String,

        /// Why.
        reason: String,
    },

    /// A transaction could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A transaction could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// JSON (de)serialization failed.
    #[error("json error")]
    Json(#[from] serde_json::Error),

    /// Writing output failed.
    #[error("i/o error")]
    Io(#[from] io::Error),
}

impl From<ClientError> for CommandError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Io(err) => CommandError::Io(err),
            other => CommandError::failed(other),
        }
    }
}
