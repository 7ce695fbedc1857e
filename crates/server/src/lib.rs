//! Server side of the node bootstrap.
//!
//! This crate owns everything that is shared by the server and the client bootstrap paths: the
//! global configuration map, the command tree and its executor, the command factory that
//! classifies an invocation, and the capability traits behind which the consensus engine and the
//! application are plugged in.

pub mod app;
pub mod command;
pub mod component;
pub mod config;
pub mod errors;
pub mod factory;
pub mod server;

pub use app::{AppBindings, AppI, AppManager, ModuleSchema, QueryHandlers, SchemaDecoderResolver, Store};
pub use command::{ArgSpec, CommandNode, CommandSource, FlagSpec, Invocation, RootCommand};
pub use component::{Binding, ConsensusEngine, ConsensusHandle, FullyBoundConsensus, ServerComponent};
pub use config::{ConfigFile, ConfigWriter, GlobalConfig};
pub use errors::{AppError, CommandError, ConfigError, ConsensusError, FactoryError, ServerError};
pub use factory::{is_app_required, new_logger, CommandFactory, ParsedCommand};
pub use server::Server;
