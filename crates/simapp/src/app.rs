//! The simulation application.

use std::{fmt, marker::PhantomData, sync::Arc};

use notsim_client::{AppOptions, ClientContext};
use notsim_common::logging::Logger;
use notsim_core::Tx;
use notsim_depinject::{Container, Key, Provider};
use notsim_server::{AppError, AppI, AppManager, GlobalConfig, QueryHandlers, SchemaDecoderResolver, Store};
use toml::{Table, Value};
use tracing::info;

use crate::{
    app_config::{app_config, AUTOCLI_OPTIONS, GLOBAL_CONFIG, LOGGER, MODULE_MANAGER},
    cmd::CLIENT_CONTEXT,
    errors::SimAppError,
    modules::ModuleManager,
    store::{DbBackend, MemStore, STORE_SECTION},
};

/// Name of the application.
pub const APP_NAME: &str = "simapp";

/// Section of `app.toml` holding the application settings.
pub const APP_SECTION: &str = "app";

/// Gas limit accepted when nothing is configured.
pub const DEFAULT_MAX_GAS: u64 = 10_000_000;

/// Data directory below the home directory.
pub const DATA_DIR: &str = "data";

/// Binding of the constructed application for transactions of type `T`.
pub const fn app_key<T: Tx>() -> Key<Arc<SimApp<T>>> {
    Key::new("simapp::app")
}

/// Defaults of the `[app]` section.
pub fn app_defaults() -> Table {
    let mut table = Table::new();
    table.insert("max_gas".to_string(), Value::Integer(DEFAULT_MAX_GAS as i64));
    table
}

/// Checks transactions against the module routes and the gas limit.
pub struct SimAppManager<T> {
    module_manager: Arc<ModuleManager>,
    max_gas: u64,
    _tx: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for SimAppManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimAppManager")
            .field("max_gas", &self.max_gas)
            .finish_non_exhaustive()
    }
}

impl<T: Tx> AppManager<T> for SimAppManager<T> {
    fn validate_tx(&self, tx: &T) -> Result<(), AppError> {
        let urls = tx.msg_type_urls();
        if urls.is_empty() {
            return Err(AppError::InvalidTx("transaction carries no message".to_string()));
        }
        for url in urls {
            if self.module_manager.route(url).is_none() {
                return Err(AppError::UnknownMsgRoute(url.to_string()));
            }
        }
        if tx.gas_limit() > self.max_gas {
            return Err(AppError::InvalidTx(format!(
                "gas limit {} exceeds the maximum of {}",
                tx.gas_limit(),
                self.max_gas
            )));
        }
        Ok(())
    }
}

/// The simulation application, generic over the node's transaction type.
pub struct SimApp<T: Tx> {
    store: Arc<MemStore>,
    module_manager: Arc<ModuleManager>,
    app_manager: Arc<SimAppManager<T>>,
    query_handlers: QueryHandlers,
}

impl<T: Tx> fmt::Debug for SimApp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimApp")
            .field("store", &self.store)
            .field("module_manager", &self.module_manager)
            .field("app_manager", &self.app_manager)
            .finish_non_exhaustive()
    }
}

impl<T: Tx> SimApp<T> {
    /// Builds the application from the configuration of the invocation.
    pub fn build(
        logger: &Logger,
        config: &GlobalConfig,
        module_manager: Arc<ModuleManager>,
    ) -> Result<Self, SimAppError> {
        let backend: DbBackend = config
            .get_str(&format!("{STORE_SECTION}.app_db_backend"))
            .unwrap_or(DbBackend::MemDb.as_str())
            .parse()?;
        let max_gas_key = format!("{APP_SECTION}.max_gas");
        let max_gas = match config.get(&max_gas_key) {
            None => DEFAULT_MAX_GAS,
            Some(_) => config
                .get_u64(&max_gas_key)
                .ok_or_else(|| SimAppError::InvalidConfig {
                    key: max_gas_key.clone(),
                    reason: "expected a non-negative integer".to_string(),
                })?,
        };
        let home = config.home().ok_or(SimAppError::MissingHome)?;

        let store = Arc::new(MemStore::open(backend, home.join(DATA_DIR)));
        let query_handlers = module_manager.query_handlers(&store)?;
        info!(
            parent: logger.span(),
            data_dir = %store.data_dir().display(),
            backend = backend.as_str(),
            modules = ?module_manager.module_names(),
            "built application"
        );

        Ok(Self {
            store,
            app_manager: Arc::new(SimAppManager {
                module_manager: module_manager.clone(),
                max_gas,
                _tx: PhantomData,
            }),
            module_manager,
            query_handlers,
        })
    }

    /// The module manager.
    pub fn module_manager(&self) -> &Arc<ModuleManager> {
        &self.module_manager
    }

    /// The concrete store, for seeding state.
    pub fn mem_store(&self) -> &Arc<MemStore> {
        &self.store
    }
}

impl<T: Tx> AppI<T> for SimApp<T> {
    fn name(&self) -> &str {
        APP_NAME
    }

    fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    fn app_manager(&self) -> Arc<dyn AppManager<T>> {
        self.app_manager.clone()
    }

    fn query_handlers(&self) -> QueryHandlers {
        self.query_handlers.clone()
    }

    fn schema_decoder_resolver(&self) -> Arc<dyn SchemaDecoderResolver> {
        self.module_manager.clone()
    }
}

/// Everything the server path gets out of the application profile.
#[derive(Debug)]
pub struct SimAppOutputs<T: Tx> {
    /// The application.
    pub app: Arc<SimApp<T>>,

    /// Derived command descriptors.
    pub autocli_options: AppOptions,

    /// The module manager the application runs.
    pub module_manager: Arc<ModuleManager>,

    /// The client context, wired to the application's codecs.
    pub client_context: ClientContext,
}

fn app_provider<T: Tx>() -> Provider {
    Provider::new(
        "simapp::app",
        app_key::<T>(),
        &[LOGGER.name(), GLOBAL_CONFIG.name(), MODULE_MANAGER.name()],
        |scope| -> Result<_, SimAppError> {
            let logger = scope.get(LOGGER)?;
            let config = scope.get(GLOBAL_CONFIG)?;
            let module_manager = scope.get(MODULE_MANAGER)?;
            Ok(Arc::new(SimApp::<T>::build(&logger, &config, module_manager)?))
        },
    )
}

/// Builds the application profile: the static app configuration, the caller's `config` and the
/// application itself, resolved in one pass.
///
/// `config` must supply [`LOGGER`] and [`GLOBAL_CONFIG`] and provide the client context.
pub fn new_sim_app<T: Tx>(config: Container) -> Result<SimAppOutputs<T>, SimAppError> {
    let container = app_config().merge(config).provide(app_provider::<T>());
    let resolved = container.resolve(&[
        app_key::<T>().name(),
        AUTOCLI_OPTIONS.name(),
        MODULE_MANAGER.name(),
        CLIENT_CONTEXT.name(),
    ])?;

    Ok(SimAppOutputs {
        app: resolved.get(app_key::<T>())?,
        autocli_options: resolved.get(AUTOCLI_OPTIONS)?,
        module_manager: resolved.get(MODULE_MANAGER)?,
        client_context: resolved.get(CLIENT_CONTEXT)?,
    })
}

#[cfg(test)]
mod tests {
    use notsim_depinject::DepinjectError;

    use super::*;
    use crate::{
        cmd::client_context_provider,
        tx::{Msg, SimTx, TxBody},
    };

    fn config(home: &std::path::Path, extra: &[(&str, Value)]) -> Arc<GlobalConfig> {
        let mut builder = GlobalConfig::builder()
            .with_defaults(&[notsim_client::client_config_file()])
            .set("home", home.display().to_string());
        for (key, value) in extra {
            builder = builder.set(key, value.clone());
        }
        builder.build()
    }

    fn caller(config: Arc<GlobalConfig>) -> Container {
        Container::new()
            .supply(LOGGER, Logger::nop())
            .supply(GLOBAL_CONFIG, config)
            .provide(client_context_provider())
    }

    fn tx(urls: &[&str], gas_limit: u64) -> SimTx {
        SimTx::new(TxBody {
            messages: urls.iter().map(|url| Msg::new(*url)).collect(),
            gas_limit,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_application_profile() {
        let home = tempfile::tempdir().unwrap();
        let out = new_sim_app::<SimTx>(caller(config(home.path(), &[]))).unwrap();

        assert_eq!(AppI::name(&*out.app), APP_NAME);
        assert_eq!(out.app.store().data_dir(), home.path().join(DATA_DIR));
        assert!(Arc::ptr_eq(&out.module_manager, out.app.module_manager()));
        assert_eq!(out.autocli_options.modules.len(), 3);
        assert!(out.client_context.tx_config().tx_type().ends_with("SimTx"));
        assert!(!out.app.query_handlers().is_empty());
    }

    #[test]
    fn test_validate_tx() {
        let home = tempfile::tempdir().unwrap();
        let config = config(home.path(), &[("app.max_gas", Value::Integer(1000))]);
        let mm = Arc::new(ModuleManager::from_config(&Default::default()).unwrap());
        let app = SimApp::<SimTx>::build(&Logger::nop(), &config, mm).unwrap();
        let manager = app.app_manager();

        manager
            .validate_tx(&tx(&["/bank.Msg/Send", "/staking.Msg/Delegate"], 1000))
            .unwrap();
        assert!(matches!(
            manager.validate_tx(&tx(&["/gov.Msg/Vote"], 10)),
            Err(AppError::UnknownMsgRoute(url)) if url == "/gov.Msg/Vote"
        ));
        assert!(matches!(
            manager.validate_tx(&tx(&["/bank.Msg/Send"], 1001)),
            Err(AppError::InvalidTx(_))
        ));
        assert!(matches!(
            manager.validate_tx(&tx(&[], 1)),
            Err(AppError::InvalidTx(_))
        ));
    }

    #[test]
    fn test_unsupported_backend_fails_construction() {
        let home = tempfile::tempdir().unwrap();
        let config = config(
            home.path(),
            &[("store.app_db_backend", Value::String("rocksdb".to_string()))],
        );
        let err = new_sim_app::<SimTx>(caller(config)).unwrap_err();
        match err {
            SimAppError::Depinject(DepinjectError::ProviderFailed { provider, .. }) => {
                assert_eq!(provider, "simapp::app");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_client_context_provider_is_unresolved() {
        let home = tempfile::tempdir().unwrap();
        let container = Container::new()
            .supply(LOGGER, Logger::nop())
            .supply(GLOBAL_CONFIG, config(home.path(), &[]));
        assert!(matches!(
            new_sim_app::<SimTx>(container),
            Err(SimAppError::Depinject(DepinjectError::UnresolvedDependency { .. }))
        ));
    }
}
