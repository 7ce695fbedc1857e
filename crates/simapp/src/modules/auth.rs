//! Accounts.

use std::sync::Arc;

use notsim_client::{ModuleOptions, RpcCommandOptions, ServiceCommandDescriptor};
use notsim_server::{app::ObjectType, AppError, ModuleSchema, QueryHandlers, Store};
use serde_json::json;

use super::{query_params, query_route, required_param, respond, Module};
use crate::store::MemStore;

const NAME: &str = "auth";

/// Store key of the sequence of `address`.
pub fn account_key(address: &str) -> String {
    format!("{NAME}/accounts/{address}")
}

/// Account bookkeeping. Handles no messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthModule;

impl Module for AuthModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register_queries(
        &self,
        handlers: &mut QueryHandlers,
        store: Arc<MemStore>,
    ) -> Result<(), AppError> {
        handlers.register(query_route(NAME, "Account"), move |request| {
            let params = query_params(request)?;
            let address = required_param(&params, "address")?;
            let sequence = store
                .get(account_key(address).as_bytes())
                .ok_or_else(|| AppError::Internal(format!("account {address} not found")))?;
            let sequence = String::from_utf8_lossy(&sequence).into_owned();
            respond(json!({ "account": { "address": address, "sequence": sequence } }))
        })?;

        handlers.register(query_route(NAME, "Params"), |_| {
            respond(json!({ "params": { "max_memo_characters": 256, "tx_sig_limit": 7 } }))
        })
    }

    fn schema(&self) -> Option<ModuleSchema> {
        Some(ModuleSchema {
            module: NAME.to_string(),
            object_types: vec![ObjectType {
                name: "Account".to_string(),
                fields: vec!["address".to_string(), "sequence".to_string()],
            }],
        })
    }

    fn autocli_options(&self) -> ModuleOptions {
        ModuleOptions {
            query: Some(
                ServiceCommandDescriptor::new("auth.Query")
                    .short("Querying commands for the auth module")
                    .rpc(
                        RpcCommandOptions::new("Account")
                            .short("Query account by address")
                            .positional("address"),
                    )
                    .rpc(RpcCommandOptions::new("Params").short("Query the current auth parameters")),
            ),
            tx: None,
        }
    }
}
