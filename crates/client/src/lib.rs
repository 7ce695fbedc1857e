//! Client side of the node: everything a command needs to talk to a running node without
//! constructing the application.

pub mod autocli;
pub mod context;
pub mod errors;
pub mod flags;
pub mod keyring;
pub mod keys;
pub mod node;
pub mod output;
pub mod tx_config;

pub use autocli::{AppOptions, ModuleOptions, RpcCommandOptions, ServiceCommandDescriptor};
pub use context::{client_config_file, provide_client_context, BroadcastMode, ClientContext};
pub use errors::ClientError;
pub use keyring::{KeyRecord, Keyring, KeyringBackend};
pub use node::{node_service_options, JsonRpcNodeClient, NodeClient, NODE_SERVICE};
pub use output::OutputFormat;
pub use tx_config::TxConfig;
