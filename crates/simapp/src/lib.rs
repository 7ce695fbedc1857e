//! The simulation application the node runs, together with its static wiring and the node's
//! hand-written command tree.

pub mod app;
pub mod app_config;
pub mod cmd;
pub mod errors;
pub mod modules;
pub mod store;
pub mod tx;

pub use app::{app_key, new_sim_app, SimApp, SimAppOutputs, APP_NAME};
pub use app_config::{
    app_config, AppConfig, APP_CONFIG, AUTOCLI_OPTIONS, GLOBAL_CONFIG, LOGGER, MODULE_MANAGER,
    TX_CONFIG,
};
pub use cmd::{
    client_context_provider, init_root_cmd, root_command_persistent_pre_run, CommandDependencies,
    CLIENT_CONTEXT,
};
pub use errors::SimAppError;
pub use modules::ModuleManager;
pub use tx::{Msg, SimTx, TxBody};
