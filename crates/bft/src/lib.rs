//! The default consensus engine of the node.
//!
//! The engine plugs into the server through [`notsim_server::ConsensusEngine`]: it can be built
//! from configuration options alone, which is enough to contribute its commands and its section of
//! `app.toml`, or bound to an application, which is what `start` and the app-facing commands need.

pub mod config;
pub mod engine;
pub mod errors;

pub use config::{overwrite_default_config, BftConfig, CfgOption, ConsensusConfig, RpcConfig};
pub use engine::{BftEngine, ServerOptions, ENGINE_NAME};
pub use errors::BftError;
