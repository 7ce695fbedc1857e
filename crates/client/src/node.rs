//! Talking to a running node.

use std::fmt;

use jsonrpsee::{
    core::{client::ClientT, params::ObjectParams},
    http_client::{HttpClient, HttpClientBuilder},
};
use serde_json::{Map, Value};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::{
    autocli::{ModuleOptions, RpcCommandOptions, ServiceCommandDescriptor},
    errors::ClientError,
};

/// Name the node service commands are attached under.
pub const NODE_SERVICE: &str = "node";

/// Descriptor of the node introspection service: `query node config` and `query node status`.
pub fn node_service_options() -> ModuleOptions {
    ModuleOptions {
        query: Some(
            ServiceCommandDescriptor::new("node.Service")
                .short("Query the node")
                .rpc(RpcCommandOptions::new("Config").short("Query the current node configuration"))
                .rpc(RpcCommandOptions::new("Status").short("Query the current node status")),
        ),
        tx: None,
    }
}

/// A synchronous request/response channel to a node.
pub trait NodeClient: Send + Sync + fmt::Debug {
    /// Calls `method` with named parameters.
    fn call(&self, method: &str, params: Map<String, Value>) -> Result<Value, ClientError>;
}

/// [`NodeClient`] over JSON-RPC on HTTP.
///
/// Commands run synchronously, so the client owns a current-thread runtime to drive requests.
pub struct JsonRpcNodeClient {
    url: String,
    client: HttpClient,
    runtime: Runtime,
}

impl fmt::Debug for JsonRpcNodeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcNodeClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl JsonRpcNodeClient {
    /// Connects lazily to the node at `url`.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let client = {
            let _guard = runtime.enter();
            HttpClientBuilder::default()
                .build(url)
                .map_err(|err| ClientError::InvalidNode(format!("{url}: {err}")))?
        };
        Ok(Self {
            url: url.to_string(),
            client,
            runtime,
        })
    }

    /// The node address.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NodeClient for JsonRpcNodeClient {
    fn call(&self, method: &str, params: Map<String, Value>) -> Result<Value, ClientError> {
        let mut object = ObjectParams::new();
        for (name, value) in params {
            object.insert(&name, value)?;
        }

        debug!(url = %self.url, %method, "calling node");
        self.runtime
            .block_on(self.client.request::<Value, _>(method, object))
            .map_err(|err| ClientError::Rpc {
                method: method.to_string(),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_service_commands() {
        let options = node_service_options();
        let names: Vec<_> = options
            .query
            .unwrap()
            .rpc_command_options
            .iter()
            .map(|rpc| rpc.command_name())
            .collect();
        assert_eq!(names, ["config", "status"]);
        assert!(options.tx.is_none());
    }

    #[test]
    fn test_rejects_bad_url() {
        let err = JsonRpcNodeClient::new("not a url").unwrap_err();
        assert!(matches!(err, ClientError::InvalidNode(_)));
    }

    #[test]
    fn test_unreachable_node_is_rpc_error() {
        // port 9 (discard) on localhost is not serving json-rpc
        let client = JsonRpcNodeClient::new("http://127.0.0.1:9").unwrap();
        let err = client.call("node.Service.Status", Map::new()).unwrap_err();
        assert!(matches!(err, ClientError::Rpc { .. }));
    }
}
