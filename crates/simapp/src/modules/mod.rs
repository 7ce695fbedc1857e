//! The application's modules and the manager that routes to them.

use std::{collections::BTreeMap, fmt, sync::Arc};

use notsim_client::ModuleOptions;
use notsim_server::{AppError, ModuleSchema, QueryHandlers, SchemaDecoderResolver};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{app_config::AppConfig, errors::SimAppError, store::MemStore};

mod auth;
mod bank;
mod staking;

pub use auth::AuthModule;
pub use bank::BankModule;
pub use staking::StakingModule;

/// A message a module handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgSpec {
    /// Message name, the last segment of its route.
    pub name: &'static str,

    /// Fields the message must carry.
    pub fields: &'static [&'static str],
}

/// Route of message `msg` of `module`.
pub fn msg_route(module: &str, msg: &str) -> String {
    format!("/{module}.Msg/{msg}")
}

/// Route of query `query` of `module`.
pub fn query_route(module: &str, query: &str) -> String {
    format!("/{module}.Query/{query}")
}

/// One module of the application.
pub trait Module: Send + Sync + fmt::Debug {
    /// Module name.
    fn name(&self) -> &'static str;

    /// Messages handled by the module.
    fn msgs(&self) -> &'static [MsgSpec] {
        &[]
    }

    /// Registers the module's query routes.
    fn register_queries(
        &self,
        handlers: &mut QueryHandlers,
        store: Arc<MemStore>,
    ) -> Result<(), AppError>;

    /// State schema of the module.
    fn schema(&self) -> Option<ModuleSchema> {
        None
    }

    /// Descriptors of the module's derived commands.
    fn autocli_options(&self) -> ModuleOptions;
}

/// Every module the application knows, by name.
fn known_module(name: &str) -> Option<Arc<dyn Module>> {
    match name {
        "auth" => Some(Arc::new(AuthModule)),
        "bank" => Some(Arc::new(BankModule)),
        "staking" => Some(Arc::new(StakingModule)),
        _ => None,
    }
}

/// The ordered set of modules plus their message routes.
pub struct ModuleManager {
    modules: Vec<Arc<dyn Module>>,
    routes: BTreeMap<String, (usize, MsgSpec)>,
}

impl fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleManager")
            .field("modules", &self.module_names())
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleManager {
    /// Manages `modules`, in order.
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Result<Self, SimAppError> {
        let mut routes = BTreeMap::new();
        for (index, module) in modules.iter().enumerate() {
            if modules[..index].iter().any(|m| m.name() == module.name()) {
                return Err(SimAppError::DuplicateModule(module.name().to_string()));
            }
            for spec in module.msgs() {
                routes.insert(msg_route(module.name(), spec.name), (index, *spec));
            }
        }
        Ok(Self { modules, routes })
    }

    /// Builds the modules listed in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, SimAppError> {
        let modules = config
            .modules
            .iter()
            .map(|name| known_module(name).ok_or_else(|| SimAppError::UnknownModule(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let manager = Self::new(modules)?;
        debug!(modules = ?manager.module_names(), "built module manager");
        Ok(manager)
    }

    /// Module names, in order.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// The module handling `type_url` and the message it names.
    pub fn route(&self, type_url: &str) -> Option<(&'static str, MsgSpec)> {
        self.routes
            .get(type_url)
            .map(|(index, spec)| (self.modules[*index].name(), *spec))
    }

    /// Query routes of every module, backed by `store`.
    pub fn query_handlers(&self, store: &Arc<MemStore>) -> Result<QueryHandlers, AppError> {
        let mut handlers = QueryHandlers::default();
        for module in &self.modules {
            module.register_queries(&mut handlers, store.clone())?;
        }
        Ok(handlers)
    }

    /// Derived command descriptors, by module name.
    pub fn autocli_modules(&self) -> BTreeMap<String, ModuleOptions> {
        self.modules
            .iter()
            .map(|m| (m.name().to_string(), m.autocli_options()))
            .collect()
    }
}

impl SchemaDecoderResolver for ModuleManager {
    fn decoder_for(&self, module: &str) -> Option<ModuleSchema> {
        self.modules
            .iter()
            .find(|m| m.name() == module)
            .and_then(|m| m.schema())
    }

    fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .iter()
            .filter(|m| m.schema().is_some())
            .map(|m| m.name().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Parses a query request: a JSON object, or nothing.
pub(crate) fn query_params(request: &[u8]) -> Result<Map<String, Value>, AppError> {
    if request.is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_slice(request)
        .map_err(|err| AppError::Internal(format!("malformed query request: {err}")))
}

/// A string parameter that must be present.
pub(crate) fn required_param<'a>(
    params: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a str, AppError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Internal(format!("missing query parameter `{name}`")))
}

/// Serializes a query response.
pub(crate) fn respond(value: Value) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(&value).map_err(|err| AppError::Internal(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ModuleManager {
        ModuleManager::from_config(&AppConfig::default()).unwrap()
    }

    #[test]
    fn test_routes() {
        let mm = manager();
        assert_eq!(mm.module_names(), ["auth", "bank", "staking"]);
        let (module, spec) = mm.route("/bank.Msg/Send").unwrap();
        assert_eq!(module, "bank");
        assert_eq!(spec.fields, ["to_address", "amount"]);
        assert!(mm.route("/bank.Msg/Burn").is_none());
    }

    #[test]
    fn test_bad_module_lists() {
        let config = AppConfig {
            modules: vec!["bank".to_string(), "gov".to_string()],
        };
        assert!(matches!(
            ModuleManager::from_config(&config),
            Err(SimAppError::UnknownModule(name)) if name == "gov"
        ));

        let config = AppConfig {
            modules: vec!["bank".to_string(), "bank".to_string()],
        };
        assert!(matches!(
            ModuleManager::from_config(&config),
            Err(SimAppError::DuplicateModule(_))
        ));
    }

    #[test]
    fn test_schemas_and_autocli() {
        let mm = manager();
        assert_eq!(mm.modules(), ["auth", "bank", "staking"]);
        let bank = mm.decoder_for("bank").unwrap();
        assert_eq!(bank.object_types[0].name, "Balance");
        assert!(mm.decoder_for("gov").is_none());

        let autocli = mm.autocli_modules();
        assert!(autocli["auth"].tx.is_none());
        assert!(autocli["bank"].tx.is_some());
    }

    #[test]
    fn test_query_routes_are_registered() {
        let store = Arc::new(MemStore::open(
            crate::store::DbBackend::MemDb,
            "/tmp/data",
        ));
        let handlers = manager().query_handlers(&store).unwrap();
        let routes: Vec<_> = handlers.routes().collect();
        assert!(routes.contains(&"/auth.Query/Account"));
        assert!(routes.contains(&"/bank.Query/Balance"));
        assert!(routes.contains(&"/staking.Query/Validators"));
    }
}
