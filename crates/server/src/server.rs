//! The server: an ordered set of components plus the commands to run them.

use std::{fmt, sync::Arc};

use notsim_common::logging::Logger;
use notsim_core::Tx;
use toml::{Table, Value};
use tracing::{error, info};

use crate::{
    command::CommandNode,
    component::{Binding, ServerComponent},
    config::{ConfigFile, ConfigWriter, APP_CONFIG_FILE},
    errors::ServerError,
    factory::{LOG_LEVEL_KEY, LOG_NO_COLOR_KEY},
};

/// Owns the node's components and knows how to configure, start and stop them.
pub struct Server<T: Tx> {
    logger: Logger,
    components: Vec<Arc<dyn ServerComponent<T>>>,
    app_sections: Table,
    extra_files: Vec<ConfigFile>,
}

impl<T: Tx> fmt::Debug for Server<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("components", &self.components)
            .field("extra_files", &self.extra_files)
            .finish_non_exhaustive()
    }
}

impl<T: Tx> Server<T> {
    /// Creates a server over `components`, started in order and stopped in reverse.
    pub fn new(logger: Logger, components: Vec<Arc<dyn ServerComponent<T>>>) -> Self {
        Self {
            logger: logger.with_module("server"),
            components,
            app_sections: Table::new(),
            extra_files: Vec::new(),
        }
    }

    /// Adds a section to `app.toml` that no component owns.
    pub fn with_app_section(mut self, name: impl Into<String>, defaults: Table) -> Self {
        self.app_sections.insert(name.into(), Value::Table(defaults));
        self
    }

    /// Adds a configuration file next to `app.toml`.
    pub fn with_config_file(mut self, file: ConfigFile) -> Self {
        self.extra_files.push(file);
        self
    }

    /// Component names, in start order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// The commands of every component plus `start`.
    pub fn commands(self: &Arc<Self>) -> Vec<CommandNode> {
        let mut commands = vec![self.start_command()];
        for component in &self.components {
            commands.extend(component.clone().commands());
        }
        commands
    }

    fn start_command(self: &Arc<Self>) -> CommandNode {
        let server = self.clone();
        CommandNode::new("start", "Run the full node")
            .requiring_app()
            .handler(move |inv| {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(server.run_until_signal())?;
                inv.println("node stopped")?;
                Ok(())
            })
    }

    /// Starts every component, waits for ctrl-c, then stops them.
    pub async fn run_until_signal(&self) -> Result<(), ServerError> {
        self.start().await?;
        tokio::signal::ctrl_c().await?;
        info!(parent: self.logger.span(), "received shutdown signal");
        self.stop().await
    }

    /// Starts every component in order.
    ///
    /// Fails before starting anything if a component is not bound to an application.
    pub async fn start(&self) -> Result<(), ServerError> {
        if let Some(unbound) = self
            .components
            .iter()
            .find(|c| c.binding() != Binding::FullyBound)
        {
            return Err(ServerError::NotBound(unbound.name().to_string()));
        }

        for component in &self.components {
            info!(parent: self.logger.span(), component = component.name(), "starting component");
            component.start().await?;
        }
        Ok(())
    }

    /// Stops every component in reverse order, reporting the first failure.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut first_err = None;
        for component in self.components.iter().rev() {
            info!(parent: self.logger.span(), component = component.name(), "stopping component");
            if let Err(err) = component.stop().await {
                error!(parent: self.logger.span(), component = component.name(), %err, "failed to stop component");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn app_config(&self) -> Table {
        let mut table = Table::new();
        table.insert(LOG_LEVEL_KEY.to_string(), Value::String("info".to_string()));
        table.insert(LOG_NO_COLOR_KEY.to_string(), Value::Boolean(false));
        for component in &self.components {
            if let Some(defaults) = component.default_config() {
                table.insert(component.name().to_string(), Value::Table(defaults));
            }
        }
        for (name, section) in &self.app_sections {
            table.insert(name.clone(), section.clone());
        }
        table
    }
}

impl<T: Tx> ConfigWriter for Server<T> {
    fn config_files(&self) -> Vec<ConfigFile> {
        let mut files = vec![ConfigFile::new(APP_CONFIG_FILE, self.app_config())];
        files.extend(self.extra_files.iter().cloned());
        files
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use notsim_core::{CodecError, TxCodec};

    use super::*;
    use crate::{
        app::{AppBindings, AppManager, ModuleSchema, QueryHandlers, SchemaDecoderResolver, Store},
        component::{ConsensusEngine, ConsensusHandle},
        config::GlobalConfig,
        errors::{AppError, ConsensusError},
    };

    #[derive(Debug, Clone)]
    struct NopTx;

    impl Tx for NopTx {
        fn bytes(&self) -> &[u8] {
            &[]
        }

        fn msg_type_urls(&self) -> Vec<&str> {
            Vec::new()
        }

        fn gas_limit(&self) -> u64 {
            0
        }
    }

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        binding: Binding,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ServerComponent<NopTx> for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn binding(&self) -> Binding {
            self.binding
        }

        fn default_config(&self) -> Option<Table> {
            let mut table = Table::new();
            table.insert("enabled".to_string(), Value::Boolean(true));
            Some(table)
        }

        async fn start(&self) -> Result<(), ServerError> {
            self.log.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<(), ServerError> {
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        binding: Binding,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn ServerComponent<NopTx>> {
        Arc::new(Recorder {
            name,
            binding,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_start_in_order_stop_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = Server::new(
            Logger::nop(),
            vec![
                recorder("consensus", Binding::FullyBound, &log),
                recorder("rpc", Binding::FullyBound, &log),
            ],
        );

        server.start().await.unwrap();
        server.stop().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["start consensus", "start rpc", "stop rpc", "stop consensus"]
        );
    }

    #[tokio::test]
    async fn test_unbound_component_refuses_to_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = Server::new(
            Logger::nop(),
            vec![
                recorder("rpc", Binding::FullyBound, &log),
                recorder("consensus", Binding::PreBound, &log),
            ],
        );

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::NotBound(name) if name == "consensus"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_config_files_collect_component_sections() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut client = Table::new();
        client.insert("chain-id".to_string(), Value::String(String::new()));
        let server = Arc::new(
            Server::new(Logger::nop(), vec![recorder("rpc", Binding::PreBound, &log)])
                .with_app_section("store", Table::new())
                .with_config_file(ConfigFile::new("client.toml", client).with_namespace("client")),
        );

        let files = server.config_files();
        assert_eq!(files.len(), 2);
        let app = files[0].defaults();
        assert_eq!(app["rpc"]["enabled"].as_bool(), Some(true));
        assert!(app.contains_key("store"));
        assert_eq!(app[LOG_LEVEL_KEY].as_str(), Some("info"));
        assert_eq!(files[1].namespace(), Some("client"));

        let names: Vec<_> = server.commands().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["start"]);
        assert!(server.commands()[0].requires_app());
    }

    #[derive(Debug)]
    struct Engine {
        bound: bool,
    }

    #[async_trait]
    impl ServerComponent<NopTx> for Engine {
        fn name(&self) -> &str {
            "engine"
        }

        fn binding(&self) -> Binding {
            if self.bound {
                Binding::FullyBound
            } else {
                Binding::PreBound
            }
        }

        async fn start(&self) -> Result<(), ServerError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), ServerError> {
            Ok(())
        }
    }

    impl ConsensusEngine<NopTx> for Engine {
        type CfgOption = bool;
        type ServerOptions = ();

        fn with_config_options(options: Vec<bool>) -> Result<Self, ConsensusError> {
            // a `true` option simulates an engine that binds itself regardless
            Ok(Self {
                bound: options.contains(&true),
            })
        }

        fn bind(
            _logger: Logger,
            _bindings: AppBindings<NopTx>,
            _options: Vec<bool>,
            _config: Arc<GlobalConfig>,
            _server_options: (),
        ) -> Result<Self, ConsensusError> {
            Ok(Self { bound: true })
        }
    }

    #[derive(Debug)]
    struct Nothing;

    impl Store for Nothing {
        fn latest_version(&self) -> u64 {
            0
        }

        fn get(&self, _key: &[u8]) -> Option<Vec<u8>> {
            None
        }

        fn data_dir(&self) -> &std::path::Path {
            std::path::Path::new(".")
        }
    }

    impl AppManager<NopTx> for Nothing {
        fn validate_tx(&self, _tx: &NopTx) -> Result<(), AppError> {
            Ok(())
        }
    }

    impl SchemaDecoderResolver for Nothing {
        fn decoder_for(&self, _module: &str) -> Option<ModuleSchema> {
            None
        }

        fn modules(&self) -> Vec<String> {
            Vec::new()
        }
    }

    impl TxCodec<NopTx> for Nothing {
        fn decode(&self, _bytes: &[u8]) -> Result<NopTx, CodecError> {
            Ok(NopTx)
        }

        fn decode_json(&self, _bytes: &[u8]) -> Result<NopTx, CodecError> {
            Ok(NopTx)
        }
    }

    fn bindings() -> AppBindings<NopTx> {
        let nothing = Arc::new(Nothing);
        AppBindings {
            app_name: "test".to_string(),
            store: nothing.clone(),
            app_manager: nothing.clone(),
            query_handlers: QueryHandlers::default(),
            schema_resolver: nothing.clone(),
            codec: nothing,
        }
    }

    #[test]
    fn test_pre_bound_handle_is_not_fully_bound() {
        let handle = ConsensusHandle::<NopTx>::pre_bound::<Engine>(vec![]).unwrap();
        assert_eq!(handle.binding(), Binding::PreBound);
        assert!(matches!(
            handle.require_fully_bound(),
            Err(ConsensusError::NotFullyBound(_))
        ));
    }

    #[test]
    fn test_handle_rejects_wrong_state() {
        let err = ConsensusHandle::<NopTx>::pre_bound::<Engine>(vec![true]).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::BindingMismatch {
                expected: Binding::PreBound,
                actual: Binding::FullyBound,
            }
        ));
    }

    #[test]
    fn test_fully_bound_handle() {
        let handle = ConsensusHandle::<NopTx>::fully_bound::<Engine>(
            Logger::nop(),
            bindings(),
            vec![],
            GlobalConfig::builder().build(),
            (),
        )
        .unwrap();
        let bound = handle.require_fully_bound().unwrap();
        assert_eq!(bound.component().name(), "engine");
    }
}
