//! The engine as a server component.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use notsim_common::logging::Logger;
use notsim_core::{Tx, TxHash};
use notsim_server::{
    AppBindings, AppError, ArgSpec, Binding, CommandError, CommandNode, ConsensusEngine,
    ConsensusError, GlobalConfig, ServerComponent, ServerError,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{config_from_options, BftConfig, CfgOption};

/// Name of the engine, its command group and its `app.toml` section.
pub const ENGINE_NAME: &str = "bft";

/// Server level options handed to the engine when it is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Heights between state snapshots. Zero disables snapshots.
    pub snapshot_interval: u64,

    /// Snapshots to keep.
    pub keep_recent: u32,

    /// Largest accepted raw transaction.
    pub max_tx_bytes: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            snapshot_interval: 0,
            keep_recent: 2,
            max_tx_bytes: 1 << 20,
        }
    }
}

struct Bound<T: Tx> {
    logger: Logger,
    app: AppBindings<T>,
    server_options: ServerOptions,
    height: Arc<AtomicU64>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// The default consensus engine.
///
/// Block production is reduced to committing empty heights every `timeout_commit`; what matters
/// to the node is how the engine is configured, bound and driven.
pub struct BftEngine<T: Tx> {
    config: BftConfig,
    bound: Option<Bound<T>>,
}

impl<T: Tx> fmt::Debug for BftEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("BftEngine");
        s.field("config", &self.config);
        if let Some(bound) = &self.bound {
            s.field("app", &bound.app.app_name)
                .field("server_options", &bound.server_options)
                .field("height", &bound.height.load(Ordering::Relaxed));
        }
        s.finish_non_exhaustive()
    }
}

impl<T: Tx> BftEngine<T> {
    /// The effective configuration.
    pub fn config(&self) -> &BftConfig {
        &self.config
    }

    /// Last committed height, if the engine is bound.
    pub fn height(&self) -> Option<u64> {
        self.bound
            .as_ref()
            .map(|bound| bound.height.load(Ordering::SeqCst))
    }

    fn require_bound(&self) -> Result<&Bound<T>, ConsensusError> {
        self.bound
            .as_ref()
            .ok_or_else(|| ConsensusError::NotFullyBound(ENGINE_NAME.to_string()))
    }

    /// Decodes a raw transaction and has the application validate it.
    pub fn check_tx(&self, raw: &[u8]) -> Result<TxHash, CommandError> {
        let bound = self.require_bound()?;
        let max = bound.server_options.max_tx_bytes;
        if raw.len() as u64 > max {
            let err = AppError::InvalidTx(format!("{} bytes exceeds the {max} byte limit", raw.len()));
            return Err(ConsensusError::from(err).into());
        }

        let tx = bound.app.codec.decode(raw)?;
        bound
            .app
            .app_manager
            .validate_tx(&tx)
            .map_err(ConsensusError::from)?;

        let hash = tx.hash();
        debug!(parent: bound.logger.span(), %hash, "transaction passed validation");
        Ok(hash)
    }

    /// What the engine knows about the bound application.
    pub fn app_info(&self) -> Result<serde_json::Value, ConsensusError> {
        let bound = self.require_bound()?;
        let app = &bound.app;
        Ok(json!({
            "app_name": app.app_name,
            "latest_version": app.store.latest_version(),
            "data_dir": app.store.data_dir().display().to_string(),
            "query_routes": app.query_handlers.routes().collect::<Vec<_>>(),
            "schemas": app.schema_resolver.modules(),
            "snapshot_interval": bound.server_options.snapshot_interval,
            "keep_recent": bound.server_options.keep_recent,
        }))
    }
}

#[async_trait]
impl<T: Tx> ServerComponent<T> for BftEngine<T> {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn binding(&self) -> Binding {
        match self.bound {
            Some(_) => Binding::FullyBound,
            None => Binding::PreBound,
        }
    }

    fn default_config(&self) -> Option<toml::Table> {
        match self.config.to_table() {
            Ok(table) => Some(table),
            Err(err) => {
                warn!(%err, "engine config has no table form, not writing defaults");
                None
            }
        }
    }

    fn commands(self: Arc<Self>) -> Vec<CommandNode> {
        let engine = self.clone();
        let show_config = CommandNode::new("show-config", "Print the engine configuration")
            .handler(move |inv| {
                let text = toml::to_string_pretty(engine.config()).map_err(CommandError::failed)?;
                inv.println(text.trim_end())?;
                Ok(())
            });

        let engine = self.clone();
        let app_info = CommandNode::new("app-info", "Print what the engine knows about the application")
            .requiring_app()
            .handler(move |inv| {
                let info = engine.app_info()?;
                let text = serde_json::to_string_pretty(&info).map_err(CommandError::failed)?;
                inv.println(text)?;
                Ok(())
            });

        let engine = self;
        let check_tx = CommandNode::new("check-tx", "Decode and validate a hex encoded transaction")
            .requiring_app()
            .arg(ArgSpec::required("tx", "hex encoded transaction bytes"))
            .handler(move |inv| {
                let raw = hex::decode(inv.value("tx").unwrap_or_default()).map_err(|err| {
                    CommandError::InvalidInvocation(format!("transaction is not valid hex: {err}"))
                })?;
                let hash = engine.check_tx(&raw)?;
                inv.println(format!("valid transaction {hash}"))?;
                Ok(())
            });

        let mut group = CommandNode::new(ENGINE_NAME, "Consensus engine subcommands");
        for child in [show_config, app_info, check_tx] {
            group.merge_subcommand(child);
        }
        vec![group]
    }

    async fn start(&self) -> Result<(), ServerError> {
        let bound = self
            .bound
            .as_ref()
            .ok_or_else(|| ServerError::NotBound(ENGINE_NAME.to_string()))?;

        let mut ticker = bound.ticker.lock();
        if ticker.is_some() {
            return Err(ServerError::Start {
                component: ENGINE_NAME.to_string(),
                reason: "already running".to_string(),
            });
        }

        bound
            .height
            .store(bound.app.store.latest_version(), Ordering::SeqCst);
        let height = bound.height.clone();
        let span = bound.logger.span().clone();
        let timeout = self.config.consensus.timeout_commit;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(timeout);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let height = height.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(parent: &span, %height, "committed empty block");
            }
        }));

        info!(
            parent: bound.logger.span(),
            listen_address = %self.config.rpc.listen_address,
            pprof = %self.config.rpc.pprof_listen_address,
            "consensus engine started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        let Some(bound) = &self.bound else {
            return Ok(());
        };
        if let Some(handle) = bound.ticker.lock().take() {
            handle.abort();
            info!(
                parent: bound.logger.span(),
                height = bound.height.load(Ordering::SeqCst),
                "consensus engine stopped"
            );
        }
        Ok(())
    }
}

impl<T: Tx> ConsensusEngine<T> for BftEngine<T> {
    type CfgOption = CfgOption;
    type ServerOptions = ServerOptions;

    fn with_config_options(options: Vec<CfgOption>) -> Result<Self, ConsensusError> {
        let config = config_from_options(&options);
        config.validate()?;
        Ok(Self {
            config,
            bound: None,
        })
    }

    fn bind(
        logger: Logger,
        bindings: AppBindings<T>,
        options: Vec<CfgOption>,
        config: Arc<GlobalConfig>,
        server_options: ServerOptions,
    ) -> Result<Self, ConsensusError> {
        let config = config_from_options(&options).merged(&config.section(ENGINE_NAME))?;
        let logger = logger.with_module("bft");
        info!(
            parent: logger.span(),
            app = %bindings.app_name,
            timeout_commit_ms = config.consensus.timeout_commit.as_millis() as u64,
            "bound consensus engine to application"
        );

        Ok(Self {
            config,
            bound: Some(Bound {
                logger,
                app: bindings,
                server_options,
                height: Arc::new(AtomicU64::new(0)),
                ticker: Mutex::new(None),
            }),
        })
    }
}
