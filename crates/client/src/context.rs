//! The client context: everything a client command needs to reach and talk to a node.

use std::{fmt, path::PathBuf, str::FromStr, sync::Arc};

use notsim_server::{
    config::{ConfigFile, CLIENT_CONFIG_FILE},
    GlobalConfig, Invocation,
};
use toml::{Table, Value};
use tracing::debug;

use crate::{
    errors::ClientError,
    flags::{FLAG_BROADCAST_MODE, FLAG_CHAIN_ID, FLAG_FROM, FLAG_KEYRING_BACKEND, FLAG_NODE, FLAG_OUTPUT},
    keyring::{KeyRecord, Keyring, KeyringBackend},
    node::{JsonRpcNodeClient, NodeClient},
    output::OutputFormat,
    tx_config::TxConfig,
};

/// Namespace of the client keys in the global configuration.
pub const CLIENT_NAMESPACE: &str = "client";

/// Node address used when nothing is configured.
pub const DEFAULT_NODE: &str = "http://localhost:26657";

/// How transactions are handed to the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BroadcastMode {
    /// Wait for the transaction to pass validation.
    #[default]
    Sync,

    /// Return as soon as the node received the transaction.
    Async,
}

impl BroadcastMode {
    /// Mode name as used in configuration.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

impl FromStr for BroadcastMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            other => Err(ClientError::InvalidBroadcastMode(other.to_string())),
        }
    }
}

/// Defaults of `client.toml`.
pub fn client_config_file() -> ConfigFile {
    let mut defaults = Table::new();
    for (key, value) in [
        ("chain-id", ""),
        ("keyring-backend", KeyringBackend::Os.as_str()),
        ("keyring-default-keyname", ""),
        ("output", "text"),
        ("node", DEFAULT_NODE),
        ("broadcast-mode", BroadcastMode::Sync.as_str()),
    ] {
        defaults.insert(key.to_string(), Value::String(value.to_string()));
    }
    ConfigFile::new(CLIENT_CONFIG_FILE, defaults).with_namespace(CLIENT_NAMESPACE)
}

/// State shared by client commands.
#[derive(Clone)]
pub struct ClientContext {
    home: PathBuf,
    chain_id: String,
    from: Option<String>,
    keyring: Keyring,
    output: OutputFormat,
    node: String,
    broadcast_mode: BroadcastMode,
    tx_config: TxConfig,
    node_client: Option<Arc<dyn NodeClient>>,
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("home", &self.home)
            .field("chain_id", &self.chain_id)
            .field("from", &self.from)
            .field("keyring", &self.keyring.backend())
            .field("output", &self.output)
            .field("node", &self.node)
            .field("broadcast_mode", &self.broadcast_mode)
            .field("tx_config", &self.tx_config)
            .finish_non_exhaustive()
    }
}

fn client_key<'a>(config: &'a GlobalConfig, key: &str) -> Option<&'a str> {
    config.get_str(&format!("{CLIENT_NAMESPACE}.{key}"))
}

/// Builds the client context from the configuration.
pub fn provide_client_context(
    config: &GlobalConfig,
    tx_config: TxConfig,
) -> Result<ClientContext, ClientError> {
    let home = config.home().unwrap_or_else(|| PathBuf::from("."));
    let backend: KeyringBackend = client_key(config, "keyring-backend")
        .unwrap_or(KeyringBackend::Os.as_str())
        .parse()?;
    let output = client_key(config, "output").unwrap_or("text").parse()?;
    let broadcast_mode = client_key(config, "broadcast-mode")
        .unwrap_or(BroadcastMode::Sync.as_str())
        .parse()?;
    let from = client_key(config, "keyring-default-keyname")
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(ClientContext {
        keyring: Keyring::open(backend, &home),
        home,
        chain_id: client_key(config, "chain-id").unwrap_or_default().to_string(),
        from,
        output,
        node: client_key(config, "node").unwrap_or(DEFAULT_NODE).to_string(),
        broadcast_mode,
        tx_config,
        node_client: None,
    })
}

impl ClientContext {
    /// The home directory.
    pub fn home(&self) -> &PathBuf {
        &self.home
    }

    /// The chain id, empty if unknown.
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Name of the signing key.
    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// The keyring.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// The output format.
    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// The node address.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The broadcast mode.
    pub fn broadcast_mode(&self) -> BroadcastMode {
        self.broadcast_mode
    }

    /// Transaction codecs.
    pub fn tx_config(&self) -> &TxConfig {
        &self.tx_config
    }

    /// Uses `client` to reach the node instead of JSON-RPC over HTTP.
    pub fn with_node_client(mut self, client: Arc<dyn NodeClient>) -> Self {
        self.node_client = Some(client);
        self
    }

    /// A client for the configured node.
    pub fn node_client(&self) -> Result<Arc<dyn NodeClient>, ClientError> {
        match &self.node_client {
            Some(client) => Ok(client.clone()),
            None => Ok(Arc::new(JsonRpcNodeClient::new(&self.node)?)),
        }
    }

    /// Overlays the client flags given to this invocation.
    pub fn apply_flags(mut self, invocation: &Invocation<'_>) -> Result<Self, ClientError> {
        if let Some(output) = invocation.value(FLAG_OUTPUT) {
            self.output = output.parse()?;
        }
        if let Some(node) = invocation.value(FLAG_NODE) {
            self.node = node.to_string();
        }
        if let Some(chain_id) = invocation.value(FLAG_CHAIN_ID) {
            self.chain_id = chain_id.to_string();
        }
        if let Some(from) = invocation.value(FLAG_FROM) {
            self.from = Some(from.to_string());
        }
        if let Some(backend) = invocation.value(FLAG_KEYRING_BACKEND) {
            self.keyring = Keyring::open(backend.parse()?, &self.home);
        }
        if let Some(mode) = invocation.value(FLAG_BROADCAST_MODE) {
            self.broadcast_mode = mode.parse()?;
        }
        Ok(self)
    }

    /// Checks the fields every command relies on.
    pub fn validate(&self) -> Result<(), ClientError> {
        let scheme_ok = ["http://", "https://"]
            .iter()
            .any(|scheme| self.node.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()));
        if !scheme_ok {
            return Err(ClientError::InvalidNode(self.node.clone()));
        }
        Ok(())
    }

    /// Checks what signing a transaction needs and returns the signing key.
    pub fn signer(&self) -> Result<KeyRecord, ClientError> {
        if self.chain_id.is_empty() {
            return Err(ClientError::MissingChainId);
        }
        let from = self.from.as_deref().ok_or(ClientError::MissingFrom)?;
        self.keyring.get(from)
    }

    /// The context for one invocation: flags overlaid and validated.
    ///
    /// Commands under `tx` additionally need a chain id and a signing key.
    pub fn for_invocation(&self, invocation: &Invocation<'_>) -> Result<Self, ClientError> {
        let ctx = self.clone().apply_flags(invocation)?;
        ctx.validate()?;
        if invocation.path().get(1).is_some_and(|cmd| cmd == "tx") {
            let key = ctx.signer()?;
            debug!(from = %key.name, address = %key.address, "resolved signing key");
        }
        Ok(ctx)
    }
}
