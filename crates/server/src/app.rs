//! What the node needs from the application.
//!
//! The consensus engine is bound to an application through [`AppBindings`], a bundle of narrow
//! capabilities extracted from an [`AppI`] implementation.

use std::{collections::BTreeMap, fmt, path::Path, sync::Arc};

use notsim_core::{Tx, TxCodec};
use serde::Serialize;

use crate::errors::AppError;

/// Read access to the application state store.
pub trait Store: Send + Sync + fmt::Debug {
    /// Latest committed version.
    fn latest_version(&self) -> u64;

    /// Value stored under `key` at the latest version.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Directory backing the store.
    fn data_dir(&self) -> &Path;
}

/// Transaction level entry points of the application.
pub trait AppManager<T: Tx>: Send + Sync + fmt::Debug {
    /// Checks a transaction without executing it.
    fn validate_tx(&self, tx: &T) -> Result<(), AppError>;
}

/// Handler answering one query route.
pub type QueryHandler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, AppError> + Send + Sync>;

/// Query routes served by the application.
#[derive(Clone, Default)]
pub struct QueryHandlers {
    routes: BTreeMap<String, QueryHandler>,
}

impl fmt::Debug for QueryHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.keys()).finish()
    }
}

impl QueryHandlers {
    /// Registers `handler` for `route`. Routes are unique.
    pub fn register(
        &mut self,
        route: impl Into<String>,
        handler: impl Fn(&[u8]) -> Result<Vec<u8>, AppError> + Send + Sync + 'static,
    ) -> Result<(), AppError> {
        let route = route.into();
        if self.routes.contains_key(&route) {
            return Err(AppError::DuplicateQueryRoute(route));
        }
        self.routes.insert(route, Arc::new(handler));
        Ok(())
    }

    /// Runs the handler of `route`.
    pub fn query(&self, route: &str, request: &[u8]) -> Result<Vec<u8>, AppError> {
        let handler = self
            .routes
            .get(route)
            .ok_or_else(|| AppError::UnknownQueryRoute(route.to_string()))?;
        handler(request)
    }

    /// Registered routes, sorted.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Description of one object type a module stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectType {
    /// Type name.
    pub name: String,

    /// Field names, in order.
    pub fields: Vec<String>,
}

/// State schema of one module, used by indexers to decode state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSchema {
    /// Module name.
    pub module: String,

    /// Types stored by the module.
    pub object_types: Vec<ObjectType>,
}

/// Resolves module names to their state schema.
pub trait SchemaDecoderResolver: Send + Sync + fmt::Debug {
    /// Schema of `module`, if the module exposes one.
    fn decoder_for(&self, module: &str) -> Option<ModuleSchema>;

    /// Modules exposing a schema, sorted.
    fn modules(&self) -> Vec<String>;
}

/// A fully constructed application.
pub trait AppI<T: Tx>: Send + Sync + fmt::Debug {
    /// Application name.
    fn name(&self) -> &str;

    /// The state store.
    fn store(&self) -> Arc<dyn Store>;

    /// Transaction entry points.
    fn app_manager(&self) -> Arc<dyn AppManager<T>>;

    /// Query routes.
    fn query_handlers(&self) -> QueryHandlers;

    /// Schema resolver.
    fn schema_decoder_resolver(&self) -> Arc<dyn SchemaDecoderResolver>;
}

/// Everything a consensus engine is handed when it is bound to an application.
pub struct AppBindings<T: Tx> {
    /// Application name.
    pub app_name: String,

    /// The state store.
    pub store: Arc<dyn Store>,

    /// Transaction entry points.
    pub app_manager: Arc<dyn AppManager<T>>,

    /// Query routes.
    pub query_handlers: QueryHandlers,

    /// Schema resolver.
    pub schema_resolver: Arc<dyn SchemaDecoderResolver>,

    /// Decoder for raw transactions.
    pub codec: Arc<dyn TxCodec<T>>,
}

impl<T: Tx> Clone for AppBindings<T> {
    fn clone(&self) -> Self {
        Self {
            app_name: self.app_name.clone(),
            store: self.store.clone(),
            app_manager: self.app_manager.clone(),
            query_handlers: self.query_handlers.clone(),
            schema_resolver: self.schema_resolver.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<T: Tx> fmt::Debug for AppBindings<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppBindings")
            .field("app_name", &self.app_name)
            .field("store", &self.store)
            .field("query_handlers", &self.query_handlers)
            .finish_non_exhaustive()
    }
}

impl<T: Tx> AppBindings<T> {
    /// Extracts the bindings of `app`.
    pub fn from_app(app: &dyn AppI<T>, codec: Arc<dyn TxCodec<T>>) -> Self {
        Self {
            app_name: app.name().to_string(),
            store: app.store(),
            app_manager: app.app_manager(),
            query_handlers: app.query_handlers(),
            schema_resolver: app.schema_decoder_resolver(),
            codec,
        }
    }
}
