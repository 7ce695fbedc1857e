//! Engine configuration, stored as the `[bft]` section of `app.toml`.

use std::{sync::Arc, time::Duration};

use notsim_common::logging::translate_log_level;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use toml::{Table, Value};

use crate::errors::BftError;

/// A modification applied on top of the default configuration.
pub type CfgOption = Arc<dyn Fn(&mut BftConfig) + Send + Sync>;

/// Replaces the whole default configuration with `config`.
pub fn overwrite_default_config(config: BftConfig) -> CfgOption {
    Arc::new(move |current: &mut BftConfig| *current = config.clone())
}

/// Applies `options` in order on top of the defaults.
pub fn config_from_options(options: &[CfgOption]) -> BftConfig {
    let mut config = BftConfig::default();
    for option in options {
        option(&mut config);
    }
    config
}

/// Configuration of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BftConfig {
    /// Engine log level in `module:level` syntax.
    pub log_level: String,

    /// Consensus timing.
    pub consensus: ConsensusConfig,

    /// Endpoints.
    pub rpc: RpcConfig,
}

/// Timing parameters of the consensus rounds.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// How long to wait after a commit before starting the next height.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout_commit: Duration,
}

/// Addresses the engine listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Address of the engine's RPC endpoint.
    pub listen_address: String,

    /// Address of the profiling endpoint. Empty disables it.
    pub pprof_listen_address: String,
}

impl Default for BftConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            consensus: ConsensusConfig {
                timeout_commit: Duration::from_secs(1),
            },
            rpc: RpcConfig {
                listen_address: "tcp://127.0.0.1:26657".to_string(),
                pprof_listen_address: String::new(),
            },
        }
    }
}

impl BftConfig {
    /// Checks every value is usable.
    pub fn validate(&self) -> Result<(), BftError> {
        translate_log_level(&self.log_level)?;

        if self.consensus.timeout_commit.is_zero() {
            return Err(BftError::ZeroTimeout);
        }

        check_address("rpc.listen_address", &self.rpc.listen_address, false)?;
        check_address(
            "rpc.pprof_listen_address",
            &self.rpc.pprof_listen_address,
            true,
        )?;
        Ok(())
    }

    /// The configuration as a TOML table.
    pub fn to_table(&self) -> Result<Table, BftError> {
        match Value::try_from(self)? {
            Value::Table(table) => Ok(table),
            other => Err(BftError::NotATable(other.type_str())),
        }
    }

    /// Overlays `overrides` on this configuration and validates the result.
    ///
    /// Keys absent from `overrides` keep their current value.
    pub fn merged(&self, overrides: &Table) -> Result<Self, BftError> {
        let mut table = self.to_table()?;
        merge_tables(&mut table, overrides);
        let config: Self = Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }
}

fn check_address(key: &'static str, value: &str, may_be_empty: bool) -> Result<(), BftError> {
    if value.is_empty() && may_be_empty {
        return Ok(());
    }

    let hostport = value.split_once("://").map_or(value, |(_, rest)| rest);
    let valid = hostport
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if valid {
        Ok(())
    } else {
        Err(BftError::InvalidAddress {
            key,
            value: value.to_string(),
        })
    }
}

fn merge_tables(base: &mut Table, overrides: &Table) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(Value::Table(inner)), Value::Table(over)) => merge_tables(inner, over),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
