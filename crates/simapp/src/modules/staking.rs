//! Validators and delegations.

use std::sync::Arc;

use notsim_client::{ModuleOptions, RpcCommandOptions, ServiceCommandDescriptor};
use notsim_server::{app::ObjectType, AppError, ModuleSchema, QueryHandlers, Store};
use serde_json::{json, Value};

use super::{query_params, query_route, required_param, respond, Module, MsgSpec};
use crate::store::MemStore;

const NAME: &str = "staking";

const MSGS: &[MsgSpec] = &[
    MsgSpec {
        name: "Delegate",
        fields: &["validator_address", "amount"],
    },
    MsgSpec {
        name: "Undelegate",
        fields: &["validator_address", "amount"],
    },
];

/// Store key of the JSON list of validator addresses.
pub const VALIDATORS_KEY: &str = "staking/validators";

/// Store key of the shares `delegator` holds with `validator`.
pub fn delegation_key(delegator: &str, validator: &str) -> String {
    format!("{NAME}/delegations/{delegator}/{validator}")
}

/// Delegated proof of stake bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct StakingModule;

impl Module for StakingModule {
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
        let validators = store.clone();
        handlers.register(query_route(NAME, "Validators"), move |_| {
            let list = match validators.get(VALIDATORS_KEY.as_bytes()) {
                Some(raw) => serde_json::from_slice(&raw)
                    .map_err(|err| AppError::Internal(format!("corrupt validator set: {err}")))?,
                None => Value::Array(Vec::new()),
            };
            respond(json!({ "validators": list }))
        })?;

        handlers.register(query_route(NAME, "Delegation"), move |request| {
            let params = query_params(request)?;
            let delegator = required_param(&params, "delegator_address")?;
            let validator = required_param(&params, "validator_address")?;
            let shares = store
                .get(delegation_key(delegator, validator).as_bytes())
                .ok_or_else(|| {
                    AppError::Internal(format!("no delegation from {delegator} to {validator}"))
                })?;
            respond(json!({
                "delegation": {
                    "delegator_address": delegator,
                    "validator_address": validator,
                    "shares": String::from_utf8_lossy(&shares),
                }
            }))
        })
    }

    fn schema(&self) -> Option<ModuleSchema> {
        Some(ModuleSchema {
            module: NAME.to_string(),
            object_types: vec![ObjectType {
                name: "Delegation".to_string(),
                fields: ["delegator_address", "validator_address", "shares"]
                    .map(String::from)
                    .to_vec(),
            }],
        })
    }

    fn autocli_options(&self) -> ModuleOptions {
        ModuleOptions {
            query: Some(
                ServiceCommandDescriptor::new("staking.Query")
                    .short("Querying commands for the staking module")
                    .rpc(RpcCommandOptions::new("Validators").short("Query all validators"))
                    .rpc(
                        RpcCommandOptions::new("Delegation")
                            .short("Query a delegation based on address and validator address")
                            .positional("delegator_address")
                            .positional("validator_address"),
                    ),
            ),
            tx: Some(
                ServiceCommandDescriptor::new("staking.Msg")
                    .short("Staking transaction subcommands")
                    .rpc(
                        RpcCommandOptions::new("Delegate")
                            .short("Delegate liquid tokens to a validator")
                            .positional("validator_address")
                            .positional("amount"),
                    )
                    .rpc(
                        RpcCommandOptions::new("Undelegate")
                            .use_name("unbond")
                            .short("Unbond shares from a validator")
                            .positional("validator_address")
                            .positional("amount"),
                    ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DbBackend;

    #[test]
    fn test_validators_default_to_empty() {
        let store = Arc::new(MemStore::open(DbBackend::MemDb, "/tmp/data"));
        let mut handlers = QueryHandlers::default();
        StakingModule.register_queries(&mut handlers, store.clone()).unwrap();

        let out = handlers.query("/staking.Query/Validators", b"").unwrap();
        assert_eq!(out, br#"{"validators":[]}"#);

        store.set(VALIDATORS_KEY, r#"["val1"]"#);
        store.commit();
        let out = handlers.query("/staking.Query/Validators", b"").unwrap();
        assert_eq!(out, br#"{"validators":["val1"]}"#);
    }

    #[test]
    fn test_undelegate_is_exposed_as_unbond() {
        let tx = StakingModule.autocli_options().tx.unwrap();
        let names: Vec<_> = tx.rpc_command_options.iter().map(|r| r.command_name()).collect();
        assert_eq!(names, ["delegate", "unbond"]);
    }
}
