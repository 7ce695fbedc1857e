//! Static wiring of the application: which modules it runs and how its bindings are built.

use std::sync::Arc;

use notsim_client::{AppOptions, TxConfig};
use notsim_common::logging::Logger;
use notsim_depinject::{Container, Key, Provider};
use notsim_server::GlobalConfig;
use serde::{Deserialize, Serialize};

use crate::{errors::SimAppError, modules::ModuleManager, tx::SimTx};

/// Supplied by the caller: the logger of the invocation.
pub const LOGGER: Key<Logger> = Key::new("logger");

/// Supplied by the caller: the configuration of the invocation.
pub const GLOBAL_CONFIG: Key<Arc<GlobalConfig>> = Key::new("global_config");

/// The static application configuration.
pub const APP_CONFIG: Key<Arc<AppConfig>> = Key::new("app_config");

/// The module manager.
pub const MODULE_MANAGER: Key<Arc<ModuleManager>> = Key::new("module_manager");

/// Transaction codecs.
pub const TX_CONFIG: Key<TxConfig> = Key::new("tx_config");

/// Derived command descriptors.
pub const AUTOCLI_OPTIONS: Key<AppOptions> = Key::new("autocli_options");

/// Modules run by the application, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Module names.
    pub modules: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            modules: ["auth", "bank", "staking"].map(String::from).to_vec(),
        }
    }
}

/// The application's static bindings: its configuration, module manager, transaction codecs and
/// derived command descriptors.
pub fn app_config() -> Container {
    Container::new()
        .supply(APP_CONFIG, Arc::new(AppConfig::default()))
        .provide(Provider::new(
            "simapp::module_manager",
            MODULE_MANAGER,
            &[APP_CONFIG.name()],
            |scope| -> Result<_, SimAppError> {
                let config = scope.get(APP_CONFIG)?;
                Ok(Arc::new(ModuleManager::from_config(&config)?))
            },
        ))
        .provide(Provider::new(
            "simapp::tx_config",
            TX_CONFIG,
            &[],
            |_| -> Result<_, SimAppError> { Ok(TxConfig::for_type::<SimTx>()) },
        ))
        .provide(Provider::new(
            "simapp::autocli_options",
            AUTOCLI_OPTIONS,
            &[MODULE_MANAGER.name()],
            |scope| -> Result<_, SimAppError> {
                let manager = scope.get(MODULE_MANAGER)?;
                Ok(AppOptions {
                    modules: manager.autocli_modules(),
                    module_options: Default::default(),
                })
            },
        ))
}
