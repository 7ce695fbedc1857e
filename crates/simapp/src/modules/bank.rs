//! Balances and transfers.

use std::sync::Arc;

use notsim_client::{ModuleOptions, RpcCommandOptions, ServiceCommandDescriptor};
use notsim_server::{app::ObjectType, AppError, ModuleSchema, QueryHandlers, Store};
use serde_json::json;

use super::{query_params, query_route, required_param, respond, Module, MsgSpec};
use crate::store::MemStore;

const NAME: &str = "bank";

/// Denom used when a query names none.
pub const DEFAULT_DENOM: &str = "stake";

const MSGS: &[MsgSpec] = &[MsgSpec {
    name: "Send",
    fields: &["to_address", "amount"],
}];

/// Store key of the balance of `address` in `denom`.
pub fn balance_key(address: &str, denom: &str) -> String {
    format!("{NAME}/balances/{address}/{denom}")
}

/// Store key of the total supply of `denom`.
pub fn supply_key(denom: &str) -> String {
    format!("{NAME}/supply/{denom}")
}

fn amount_at(store: &MemStore, key: &str) -> String {
    store
        .get(key.as_bytes())
        .map(|raw| String::from_utf8_lossy(&raw).into_owned())
        .unwrap_or_else(|| "0".to_string())
}

/// Token balances.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankModule;

impl Module for BankModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn msgs(&self) -> &'static [MsgSpec] {
        MSGS
    }

    fn register_queries(
        &self,
        handlers: &mut QueryHandlers,
        store: Arc<MemStore>,
    ) -> Result<(), AppError> {
        let balances = store.clone();
        handlers.register(query_route(NAME, "Balance"), move |request| {
            let params = query_params(request)?;
            let address = required_param(&params, "address")?;
            let denom = required_param(&params, "denom").unwrap_or(DEFAULT_DENOM);
            let amount = amount_at(&balances, &balance_key(address, denom));
            respond(json!({ "balance": { "denom": denom, "amount": amount } }))
        })?;

        handlers.register(query_route(NAME, "TotalSupply"), move |_| {
            let amount = amount_at(&store, &supply_key(DEFAULT_DENOM));
            respond(json!({ "supply": [{ "denom": DEFAULT_DENOM, "amount": amount }] }))
        })
    }

    fn schema(&self) -> Option<ModuleSchema> {
        let fields = |names: &[&str]| -> Vec<String> { names.iter().map(|n| n.to_string()).collect() };
        Some(ModuleSchema {
            module: NAME.to_string(),
            object_types: vec![
                ObjectType {
                    name: "Balance".to_string(),
                    fields: fields(&["address", "denom", "amount"]),
                },
                ObjectType {
                    name: "Supply".to_string(),
                    fields: fields(&["denom", "amount"]),
                },
            ],
        })
    }

    fn autocli_options(&self) -> ModuleOptions {
        ModuleOptions {
            query: Some(
                ServiceCommandDescriptor::new("bank.Query")
                    .short("Querying commands for the bank module")
                    .rpc(
                        RpcCommandOptions::new("Balance")
                            .short("Query an account balance by address and denom")
                            .positional("address")
                            .flag("denom", "the denom to query, defaults to stake"),
                    )
                    .rpc(RpcCommandOptions::new("TotalSupply").short("Query the total supply of coins")),
            ),
            tx: Some(
                ServiceCommandDescriptor::new("bank.Msg")
                    .short("Bank transaction subcommands")
                    .rpc(
                        RpcCommandOptions::new("Send")
                            .short("Send funds from one account to another")
                            .positional("to_address")
                            .positional("amount"),
                    ),
            ),
        }
    }
}
