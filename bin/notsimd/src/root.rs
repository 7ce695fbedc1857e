//! Assembly of the `notsimd` root command.
//!
//! The command tree is built twice. The first, throwaway tree only exists so the factory can
//! classify the invocation and learn every configuration file. Once the configuration is loaded
//! the dependency graph is resolved for the path the invocation takes and the real tree is built
//! on top of it.

use std::{fmt, path::Path, sync::Arc, time::Duration};

use notsim_bft::{overwrite_default_config, BftConfig, BftEngine, CfgOption, ServerOptions};
use notsim_client::{node_service_options, AppOptions, ClientContext, TxConfig, NODE_SERVICE};
use notsim_common::logging::Logger;
use notsim_core::Tx;
use notsim_depinject::Container;
use notsim_server::{
    is_app_required, new_logger, AppBindings, CommandFactory, ConsensusEngine, ConsensusHandle,
    RootCommand,
};
use notsim_simapp::{
    app_config, client_context_provider, init_root_cmd, new_sim_app,
    root_command_persistent_pre_run, CommandDependencies, ModuleManager, SimApp, AUTOCLI_OPTIONS,
    CLIENT_CONTEXT, GLOBAL_CONFIG, LOGGER, MODULE_MANAGER, TX_CONFIG,
};
use tracing::{debug, info};

use crate::{decoder::GenericTxDecoder, errors::BootstrapError};

/// Name of the root command.
pub(crate) const NODE_NAME: &str = "notsimd";

/// Home directory below the user's home used when nothing else selects one.
pub(crate) const DEFAULT_HOME_DIR: &str = ".notsimd";

const ABOUT: &str = "notsimd node and client";

/// The engine defaults the node ships with.
pub(crate) fn init_bft_config() -> CfgOption {
    let mut config = BftConfig::default();
    config.log_level = "*:warn,server:info,p2p:info,state:info".to_string();
    config.consensus.timeout_commit = Duration::from_secs(5);
    config.rpc.pprof_listen_address = "localhost:6060".to_string();
    overwrite_default_config(config)
}

/// The assembled root command and what it was built from.
pub(crate) struct Bootstrapped<T: Tx> {
    pub(crate) root: RootCommand,
    pub(crate) consensus: ConsensusHandle<T>,
    pub(crate) app: Option<Arc<SimApp<T>>>,
}

impl<T: Tx> fmt::Debug for Bootstrapped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapped")
            .field("root", &self.root.name())
            .field("consensus", &self.consensus)
            .field("app", &self.app)
            .finish()
    }
}

/// Builds the root command for `args` with the default consensus engine.
pub(crate) fn new_root_cmd<T: Tx>(args: &[String]) -> Result<Bootstrapped<T>, BootstrapError> {
    bootstrap::<T, BftEngine<T>>(args, None, vec![init_bft_config()], ServerOptions::default())
}

/// Outputs of the dependency graph on either path.
struct Resolved<T: Tx> {
    consensus: ConsensusHandle<T>,
    app: Option<Arc<SimApp<T>>>,
    autocli_options: AppOptions,
    module_manager: Arc<ModuleManager>,
    client_context: ClientContext,
    tx_config: TxConfig,
}

/// Builds the root command for `args` with consensus engine `E`.
///
/// `default_home` is used when neither `--home` nor the environment selects a home directory.
/// Without it the home is [`DEFAULT_HOME_DIR`] below the user's home.
pub(crate) fn bootstrap<T: Tx, E: ConsensusEngine<T>>(
    args: &[String],
    default_home: Option<&Path>,
    cfg_options: Vec<E::CfgOption>,
    server_options: E::ServerOptions,
) -> Result<Bootstrapped<T>, BootstrapError> {
    let pre_bound = ConsensusHandle::pre_bound::<E>(cfg_options.clone())?;

    let mut scratch = RootCommand::new(NODE_NAME, ABOUT);
    let config_writer = init_root_cmd(
        &mut scratch,
        Logger::nop(),
        CommandDependencies::new(pre_bound.clone()),
    )?;

    let builder = CommandFactory::builder()
        .with_config_writer(config_writer)
        .with_logger_factory(new_logger);
    let factory = match default_home {
        Some(dir) => builder.with_default_home_dir(dir),
        None => builder.with_std_default_home_dir(DEFAULT_HOME_DIR),
    }
    .build()?;
    let parsed = factory.parse_command(&mut scratch, args)?;
    let logger = parsed.logger().clone();
    let config = parsed.config().clone();

    let depinject_config = Container::new()
        .supply(LOGGER, logger.clone())
        .supply(GLOBAL_CONFIG, config.clone())
        .provide(client_context_provider());

    let resolved = if is_app_required(&parsed) {
        let out = new_sim_app::<T>(depinject_config)?;
        let tx_config = out.client_context.tx_config().clone();
        let codec = Arc::new(GenericTxDecoder::<T>::new(tx_config.clone()));
        let bindings = AppBindings::from_app(&*out.app, codec);
        let consensus = ConsensusHandle::fully_bound::<E>(
            logger.clone(),
            bindings,
            cfg_options,
            config.clone(),
            server_options,
        )?;
        consensus.require_fully_bound()?;
        info!(parent: logger.span(), command = %parsed.path().join(" "), "bound consensus to application");

        Resolved {
            consensus,
            app: Some(out.app),
            autocli_options: out.autocli_options,
            module_manager: out.module_manager,
            client_context: out.client_context,
            tx_config,
        }
    } else {
        let bindings = app_config().merge(depinject_config).resolve(&[
            AUTOCLI_OPTIONS.name(),
            MODULE_MANAGER.name(),
            CLIENT_CONTEXT.name(),
        ])?;
        debug!(parent: logger.span(), command = %parsed.path().join(" "), "resolved client bindings");

        Resolved {
            consensus: pre_bound,
            app: None,
            autocli_options: bindings.get(AUTOCLI_OPTIONS)?,
            module_manager: bindings.get(MODULE_MANAGER)?,
            client_context: bindings.get(CLIENT_CONTEXT)?,
            tx_config: bindings.get(TX_CONFIG)?,
        }
    };

    let mut root = RootCommand::new(NODE_NAME, ABOUT);
    root.set_version(env!("CARGO_PKG_VERSION"));
    root.set_pre_run(root_command_persistent_pre_run(resolved.client_context));
    factory.enhance_root_command(&mut root);

    let mut deps = CommandDependencies::new(resolved.consensus.clone())
        .with_global_config(config)
        .with_tx_config(resolved.tx_config)
        .with_module_manager(resolved.module_manager);
    if let Some(app) = &resolved.app {
        deps = deps.with_sim_app(app.clone());
    }
    init_root_cmd(&mut root, logger, deps)?;

    let mut autocli_options = resolved.autocli_options;
    autocli_options
        .module_options
        .insert(NODE_SERVICE.to_string(), node_service_options());
    autocli_options.enhance_root_command(&mut root)?;

    Ok(Bootstrapped {
        root,
        consensus: resolved.consensus,
        app: resolved.app,
    })
}
