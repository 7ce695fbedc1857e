//! Server components and the consensus handle.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use notsim_common::logging::Logger;
use notsim_core::Tx;

use crate::{
    app::AppBindings,
    command::CommandNode,
    config::GlobalConfig,
    errors::{ConsensusError, ServerError},
};

/// Whether a component has been handed an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Built from configuration options only. Good for listing commands and writing defaults.
    PreBound,

    /// Bound to a constructed application. Required to run.
    FullyBound,
}

/// A long-running part of the node that the server starts and stops.
#[async_trait]
pub trait ServerComponent<T: Tx>: Send + Sync + fmt::Debug {
    /// Component name, also the section of its defaults in `app.toml`.
    fn name(&self) -> &str;

    /// Whether the component has been handed an application.
    fn binding(&self) -> Binding {
        Binding::FullyBound
    }

    /// Default values of the component's configuration section.
    fn default_config(&self) -> Option<toml::Table> {
        None
    }

    /// Commands the component contributes to the command tree.
    fn commands(self: Arc<Self>) -> Vec<CommandNode> {
        Vec::new()
    }

    /// Starts the component.
    async fn start(&self) -> Result<(), ServerError>;

    /// Stops the component.
    async fn stop(&self) -> Result<(), ServerError>;
}

/// A consensus engine that can be built pre-bound or fully bound.
pub trait ConsensusEngine<T: Tx>: ServerComponent<T> + Sized + 'static {
    /// A modification of the engine's default configuration.
    type CfgOption: Clone + Send + Sync;

    /// Server level options that only matter once an application is bound.
    type ServerOptions;

    /// Builds an engine that knows its configuration but no application.
    fn with_config_options(options: Vec<Self::CfgOption>) -> Result<Self, ConsensusError>;

    /// Builds an engine bound to an application.
    fn bind(
        logger: Logger,
        bindings: AppBindings<T>,
        options: Vec<Self::CfgOption>,
        config: Arc<GlobalConfig>,
        server_options: Self::ServerOptions,
    ) -> Result<Self, ConsensusError>;
}

/// The consensus engine behind its component interface, in one of its two states.
pub struct ConsensusHandle<T: Tx> {
    component: Arc<dyn ServerComponent<T>>,
}

impl<T: Tx> Clone for ConsensusHandle<T> {
    fn clone(&self) -> Self {
        Self {
            component: self.component.clone(),
        }
    }
}

impl<T: Tx> fmt::Debug for ConsensusHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusHandle")
            .field("name", &self.component.name())
            .field("binding", &self.component.binding())
            .finish()
    }
}

impl<T: Tx> ConsensusHandle<T> {
    /// Builds a pre-bound engine from configuration options.
    pub fn pre_bound<E: ConsensusEngine<T>>(
        options: Vec<E::CfgOption>,
    ) -> Result<Self, ConsensusError> {
        let engine = E::with_config_options(options)?;
        Self::checked(Arc::new(engine), Binding::PreBound)
    }

    /// Builds an engine bound to an application.
    pub fn fully_bound<E: ConsensusEngine<T>>(
        logger: Logger,
        bindings: AppBindings<T>,
        options: Vec<E::CfgOption>,
        config: Arc<GlobalConfig>,
        server_options: E::ServerOptions,
    ) -> Result<Self, ConsensusError> {
        let engine = E::bind(logger, bindings, options, config, server_options)?;
        Self::checked(Arc::new(engine), Binding::FullyBound)
    }

    fn checked(
        component: Arc<dyn ServerComponent<T>>,
        expected: Binding,
    ) -> Result<Self, ConsensusError> {
        let actual = component.binding();
        if actual != expected {
            return Err(ConsensusError::BindingMismatch { expected, actual });
        }
        Ok(Self { component })
    }

    /// The state of the engine.
    pub fn binding(&self) -> Binding {
        self.component.binding()
    }

    /// The engine as a server component.
    pub fn component(&self) -> Arc<dyn ServerComponent<T>> {
        self.component.clone()
    }

    /// Proves the engine is bound to an application.
    pub fn require_fully_bound(&self) -> Result<FullyBoundConsensus<T>, ConsensusError> {
        match self.binding() {
            Binding::FullyBound => Ok(FullyBoundConsensus(self.component.clone())),
            Binding::PreBound => Err(ConsensusError::NotFullyBound(
                self.component.name().to_string(),
            )),
        }
    }
}

/// A consensus engine known to be bound to an application.
///
/// Only obtainable through [`ConsensusHandle::require_fully_bound`].
pub struct FullyBoundConsensus<T: Tx>(Arc<dyn ServerComponent<T>>);

impl<T: Tx> fmt::Debug for FullyBoundConsensus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FullyBoundConsensus")
            .field(&self.0.name())
            .finish()
    }
}

impl<T: Tx> FullyBoundConsensus<T> {
    /// The engine as a server component.
    pub fn component(&self) -> Arc<dyn ServerComponent<T>> {
        self.0.clone()
    }
}
