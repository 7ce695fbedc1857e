//! The node's command tree.
//!
//! [`init_root_cmd`] is called twice while bootstrapping: once against a throwaway root so the
//! command factory can see the tree and the configuration files, and once against the real root
//! with every dependency the invocation ended up needing.

use std::{fmt, sync::Arc};

use notsim_client::{
    flags::{query_command, tx_command},
    keys::keys_commands,
    provide_client_context, ClientContext, TxConfig,
};
use notsim_common::logging::Logger;
use notsim_core::Tx;
use notsim_depinject::{Key, Provider};
use notsim_server::{
    command::CommandContext, CommandError, ConfigWriter, ConsensusHandle, GlobalConfig, Invocation,
    RootCommand, Server,
};
use tracing::debug;

use crate::{
    app::{app_defaults, SimApp, APP_SECTION},
    app_config::{GLOBAL_CONFIG, TX_CONFIG},
    errors::SimAppError,
    modules::ModuleManager,
    store::{store_defaults, STORE_SECTION},
};

mod commands;

/// The client context.
pub const CLIENT_CONTEXT: Key<ClientContext> = Key::new("client_context");

/// Builds the client context from the configuration and the transaction codecs.
pub fn client_context_provider() -> Provider {
    Provider::new(
        "cmd::provide_client_context",
        CLIENT_CONTEXT,
        &[GLOBAL_CONFIG.name(), TX_CONFIG.name()],
        |scope| -> Result<_, SimAppError> {
            let config = scope.get(GLOBAL_CONFIG)?;
            let tx_config = scope.get(TX_CONFIG)?;
            Ok(provide_client_context(&config, tx_config)?)
        },
    )
}

/// What the command tree is built from. Only the consensus handle is always present.
pub struct CommandDependencies<T: Tx> {
    /// Configuration of the invocation.
    pub global_config: Option<Arc<GlobalConfig>>,

    /// Transaction codecs.
    pub tx_config: Option<TxConfig>,

    /// The module manager.
    pub module_manager: Option<Arc<ModuleManager>>,

    /// The application, on the server path only.
    pub sim_app: Option<Arc<SimApp<T>>>,

    /// The consensus component.
    pub consensus: ConsensusHandle<T>,
}

impl<T: Tx> fmt::Debug for CommandDependencies<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDependencies")
            .field("global_config", &self.global_config.is_some())
            .field("tx_config", &self.tx_config)
            .field("module_manager", &self.module_manager)
            .field("sim_app", &self.sim_app.is_some())
            .field("consensus", &self.consensus.binding())
            .finish()
    }
}

impl<T: Tx> CommandDependencies<T> {
    /// Dependencies holding only the consensus handle.
    pub fn new(consensus: ConsensusHandle<T>) -> Self {
        Self {
            global_config: None,
            tx_config: None,
            module_manager: None,
            sim_app: None,
            consensus,
        }
    }

    /// Sets the configuration.
    pub fn with_global_config(mut self, config: Arc<GlobalConfig>) -> Self {
        self.global_config = Some(config);
        self
    }

    /// Sets the transaction codecs.
    pub fn with_tx_config(mut self, tx_config: TxConfig) -> Self {
        self.tx_config = Some(tx_config);
        self
    }

    /// Sets the module manager.
    pub fn with_module_manager(mut self, module_manager: Arc<ModuleManager>) -> Self {
        self.module_manager = Some(module_manager);
        self
    }

    /// Sets the application.
    pub fn with_sim_app(mut self, app: Arc<SimApp<T>>) -> Self {
        self.sim_app = Some(app);
        self
    }
}

/// Attaches the hand-written commands and the server commands to `root`.
///
/// Returns the writer that knows every configuration file of the node.
pub fn init_root_cmd<T: Tx>(
    root: &mut RootCommand,
    logger: Logger,
    deps: CommandDependencies<T>,
) -> Result<Arc<dyn ConfigWriter>, CommandError> {
    let server = Arc::new(
        Server::new(logger.clone(), vec![deps.consensus.component()])
            .with_app_section(STORE_SECTION, store_defaults())
            .with_app_section(APP_SECTION, app_defaults())
            .with_config_file(notsim_client::client_config_file()),
    );
    let writer: Arc<dyn ConfigWriter> = server.clone();

    root.add_subcommand(commands::init_command(writer.clone(), deps.global_config.clone()))?;
    root.add_subcommand(commands::config_command(deps.global_config.clone())?)?;
    root.add_subcommand(commands::version_command(env!("CARGO_PKG_VERSION")))?;
    root.add_subcommand(keys_commands()?)?;
    root.add_subcommand(query_command())?;
    root.add_subcommand(tx_command())?;
    for command in server.commands() {
        root.add_subcommand(command)?;
    }

    debug!(
        parent: logger.span(),
        consensus = ?deps.consensus.binding(),
        with_app = deps.sim_app.is_some(),
        modules = ?deps.module_manager.as_ref().map(|mm| mm.module_names()),
        "initialized root command"
    );
    Ok(writer)
}

/// Hook giving every runnable command the client context, with the invocation's flags applied.
pub fn root_command_persistent_pre_run(
    client_context: ClientContext,
) -> impl Fn(&Invocation<'_>) -> Result<Option<CommandContext>, CommandError> + Send + Sync + 'static
{
    move |inv| {
        let ctx = client_context.for_invocation(inv)?;
        Ok(Some(Box::new(ctx) as CommandContext))
    }
}
