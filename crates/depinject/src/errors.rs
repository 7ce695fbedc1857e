//! Errors raised while registering or resolving bindings.

use thiserror::Error;

use crate::container::BoxError;

/// Errors that can occur while resolving a [`Container`](crate::Container).
#[derive(Debug, Error)]
pub enum DepinjectError {
    /// No value was supplied and no provider is registered for a required binding.
    #[error("unresolved dependency `{binding}`{}", required_by_suffix(.required_by))]
    UnresolvedDependency {
        /// The missing binding.
        binding: String,

        /// The provider that needed it, if any.
        required_by: Option<String>,
    },

    /// Providers require each other.
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// The bindings on the cycle, the first one repeated at the end.
        cycle: Vec<String>,
    },

    /// The same binding was supplied twice.
    #[error("binding `{binding}` supplied more than once")]
    DuplicateSupply {
        /// The binding.
        binding: String,
    },

    /// Two providers with the same name were registered for the same binding.
    #[error("provider `{provider}` registered twice for binding `{binding}`")]
    DuplicateProvider {
        /// The binding.
        binding: String,

        /// The provider name.
        provider: String,
    },

    /// A binding is both supplied and provided.
    #[error("binding `{binding}` is supplied and also provided by `{provider}`")]
    SuppliedAndProvided {
        /// The binding.
        binding: String,

        /// The provider that also produces it.
        provider: String,
    },

    /// A provider read a binding it did not declare as an input.
    #[error("provider `{provider}` read undeclared input `{binding}`")]
    UndeclaredInput {
        /// The provider.
        provider: String,

        /// The binding it tried to read.
        binding: String,
    },

    /// A binding holds a value of another type than the one requested.
    #[error("binding `{binding}` does not hold a value of type {expected}")]
    WrongType {
        /// The binding.
        binding: String,

        /// The requested type.
        expected: &'static str,
    },

    /// A provider returned an error.
    #[error("provider `{provider}` failed to build `{binding}`")]
    ProviderFailed {
        /// The provider.
        provider: String,

        /// The binding it was building.
        binding: String,

        /// The error returned by the provider.
        #[source]
        source: BoxError,
    },
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(provider) => format!(" (required by `{provider}`)"),
        None => String::new(),
    }
}
