//! Dependency resolution for the node bootstrap.
//!
//! A [`Container`] accumulates supplied values and [`Provider`]s, each keyed by a named binding.
//! Providers declare the bindings they consume, which makes the dependency graph an explicit
//! structure that is planned (cycle and completeness checks) before anything is built. Resolution
//! only depends on the registered set, never on the order of registration.

mod container;
mod errors;
mod key;

pub use container::{BoxError, Container, Provider, Resolved, Scope};
pub use errors::DepinjectError;
pub use key::Key;
