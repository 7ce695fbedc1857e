//! The container and its resolver.

use std::{
    any::{type_name, Any},
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use tracing::{debug, trace};

use crate::{errors::DepinjectError, key::Key};

/// Boxed error returned by providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Value = Arc<dyn Any + Send + Sync>;

type BuildFn = Arc<dyn Fn(&Scope<'_>) -> Result<Value, BoxError> + Send + Sync>;

/// A function that builds one binding from already resolved bindings.
#[derive(Clone)]
pub struct Provider {
    name: &'static str,
    output: &'static str,
    inputs: Vec<&'static str>,
    build: BuildFn,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("output", &self.output)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Creates a provider named `name` that builds `output` from `inputs`.
    ///
    /// The build function only sees the declared inputs through its [`Scope`].
    pub fn new<O, E, F>(
        name: &'static str,
        output: Key<O>,
        inputs: &[&'static str],
        build: F,
    ) -> Self
    where
        O: Any + Send + Sync,
        E: Into<BoxError>,
        F: Fn(&Scope<'_>) -> Result<O, E> + Send + Sync + 'static,
    {
        let mut inputs = inputs.to_vec();
        inputs.sort_unstable();
        inputs.dedup();

        Self {
            name,
            output: output.name(),
            inputs,
            build: Arc::new(move |scope| {
                build(scope)
                    .map(|value| Arc::new(value) as Value)
                    .map_err(Into::into)
            }),
        }
    }

    /// Name of the provider.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Binding this provider builds.
    pub const fn output(&self) -> &'static str {
        self.output
    }

    /// Bindings this provider consumes, sorted.
    pub fn inputs(&self) -> &[&'static str] {
        &self.inputs
    }
}

/// The view a provider gets of the resolved bindings: its declared inputs only.
#[derive(Debug)]
pub struct Scope<'a> {
    provider: &'static str,
    inputs: &'a [&'static str],
    resolved: &'a Resolved,
}

impl Scope<'_> {
    /// Returns a clone of the value of a declared input.
    pub fn get<V>(&self, key: Key<V>) -> Result<V, DepinjectError>
    where
        V: Any + Send + Sync + Clone,
    {
        if !self.inputs.contains(&key.name()) {
            return Err(DepinjectError::UndeclaredInput {
                provider: self.provider.to_string(),
                binding: key.name().to_string(),
            });
        }
        self.resolved.get(key)
    }
}

/// Values produced by a resolution, keyed by binding name.
#[derive(Default)]
pub struct Resolved {
    values: BTreeMap<&'static str, Value>,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("bindings", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Resolved {
    /// Returns a clone of the value bound to `key`.
    pub fn get<V>(&self, key: Key<V>) -> Result<V, DepinjectError>
    where
        V: Any + Send + Sync + Clone,
    {
        let value = self
            .values
            .get(key.name())
            .ok_or_else(|| DepinjectError::UnresolvedDependency {
                binding: key.name().to_string(),
                required_by: None,
            })?;

        value
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| DepinjectError::WrongType {
                binding: key.name().to_string(),
                expected: type_name::<V>(),
            })
    }

    /// Whether the binding was resolved.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names of all resolved bindings, sorted.
    pub fn bindings(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }
}

/// Accumulates supplied values and providers, then resolves requested bindings.
///
/// Registration is infallible and order-insensitive; conflicting registrations are reported by
/// [`Container::resolve`].
#[derive(Clone, Default)]
pub struct Container {
    supplied: BTreeMap<&'static str, Value>,
    providers: BTreeMap<&'static str, BTreeMap<&'static str, Provider>>,
    conflicts: Vec<(&'static str, Conflict)>,
}

#[derive(Debug, Clone)]
enum Conflict {
    Supply,
    Provider(&'static str),
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("supplied", &self.supplied.keys().collect::<Vec<_>>())
            .field("providers", &self.providers)
            .field("conflicts", &self.conflicts)
            .finish()
    }
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies a concrete value for a binding.
    pub fn supply<V>(mut self, key: Key<V>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        self.insert_supplied(key.name(), Arc::new(value));
        self
    }

    /// Registers a provider.
    pub fn provide(mut self, provider: Provider) -> Self {
        self.insert_provider(provider);
        self
    }

    /// Adds everything registered in `other` to this container.
    pub fn merge(mut self, other: Container) -> Self {
        for (name, value) in other.supplied {
            self.insert_supplied(name, value);
        }
        for provider in other.providers.into_values().flat_map(BTreeMap::into_values) {
            self.insert_provider(provider);
        }
        self.conflicts.extend(other.conflicts);
        self
    }

    fn insert_supplied(&mut self, name: &'static str, value: Value) {
        if self.supplied.insert(name, value).is_some() {
            self.conflicts.push((name, Conflict::Supply));
        }
    }

    fn insert_provider(&mut self, provider: Provider) {
        let (output, name) = (provider.output, provider.name);
        let by_name = self.providers.entry(output).or_default();
        if by_name.insert(name, provider).is_some() {
            self.conflicts.push((output, Conflict::Provider(name)));
        }
    }

    /// The provider that will build `binding`, if any.
    ///
    /// When several providers build the same binding the one whose name sorts first is used, so
    /// the choice never depends on registration order.
    pub fn provider_for(&self, binding: &str) -> Option<&Provider> {
        self.providers
            .get(binding)
            .and_then(|by_name| by_name.values().next())
    }

    /// Computes the order in which the bindings needed for `targets` would be built.
    ///
    /// The order is a deterministic topological order of the dependency graph. Fails on the first
    /// conflicting registration, missing binding or cycle.
    pub fn plan(&self, targets: &[&'static str]) -> Result<Vec<&'static str>, DepinjectError> {
        self.check_conflicts()?;

        let mut targets = targets.to_vec();
        targets.sort_unstable();
        targets.dedup();

        let mut planner = Planner {
            container: self,
            done: BTreeSet::new(),
            stack: Vec::new(),
            order: Vec::new(),
        };
        for target in targets {
            planner.visit(target, None)?;
        }

        Ok(planner.order)
    }

    /// Resolves `targets` and everything they transitively need.
    ///
    /// Nothing is built unless the whole plan is valid. A provider failure aborts the resolution.
    pub fn resolve(&self, targets: &[&'static str]) -> Result<Resolved, DepinjectError> {
        let order = self.plan(targets)?;
        debug!(?order, "resolving bindings");

        let mut resolved = Resolved::default();
        for binding in order {
            if let Some(value) = self.supplied.get(binding) {
                trace!(%binding, "using supplied value");
                resolved.values.insert(binding, Arc::clone(value));
                continue;
            }

            // Planning guarantees a provider exists for every non-supplied binding.
            let Some(provider) = self.provider_for(binding) else {
                return Err(DepinjectError::UnresolvedDependency {
                    binding: binding.to_string(),
                    required_by: None,
                });
            };

            trace!(%binding, provider = provider.name, "building binding");
            let scope = Scope {
                provider: provider.name,
                inputs: &provider.inputs,
                resolved: &resolved,
            };
            let value =
                (provider.build)(&scope).map_err(|source| DepinjectError::ProviderFailed {
                    provider: provider.name.to_string(),
                    binding: binding.to_string(),
                    source,
                })?;
            resolved.values.insert(binding, value);
        }

        Ok(resolved)
    }

    fn check_conflicts(&self) -> Result<(), DepinjectError> {
        if let Some((binding, conflict)) = self.conflicts.first() {
            return Err(match conflict {
                Conflict::Supply => DepinjectError::DuplicateSupply {
                    binding: binding.to_string(),
                },
                Conflict::Provider(provider) => DepinjectError::DuplicateProvider {
                    binding: binding.to_string(),
                    provider: provider.to_string(),
                },
            });
        }

        if let Some((binding, provider)) = self
            .supplied
            .keys()
            .find_map(|name| self.provider_for(name).map(|p| (*name, p.name)))
        {
            return Err(DepinjectError::SuppliedAndProvided {
                binding: binding.to_string(),
                provider: provider.to_string(),
            });
        }

        Ok(())
    }
}

struct Planner<'a> {
    container: &'a Container,
    done: BTreeSet<&'static str>,
    stack: Vec<&'static str>,
    order: Vec<&'static str>,
}

impl Planner<'_> {
    fn visit(
        &mut self,
        binding: &'static str,
        required_by: Option<&'static str>,
    ) -> Result<(), DepinjectError> {
        if self.done.contains(binding) {
            return Ok(());
        }

        if let Some(pos) = self.stack.iter().position(|b| *b == binding) {
            let mut cycle: Vec<String> = self.stack[pos..].iter().map(|b| b.to_string()).collect();
            cycle.push(binding.to_string());
            return Err(DepinjectError::CyclicDependency { cycle });
        }

        if !self.container.supplied.contains_key(binding) {
            let provider = self.container.provider_for(binding).ok_or_else(|| {
                DepinjectError::UnresolvedDependency {
                    binding: binding.to_string(),
                    required_by: required_by.map(str::to_string),
                }
            })?;

            self.stack.push(binding);
            for input in &provider.inputs {
                self.visit(input, Some(provider.name))?;
            }
            self.stack.pop();
        }

        self.done.insert(binding);
        self.order.push(binding);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const A: Key<u64> = Key::new("a");
    const B: Key<u64> = Key::new("b");
    const C: Key<u64> = Key::new("c");
    const NAME: Key<String> = Key::new("name");

    fn add_one(name: &'static str, out: Key<u64>, input: Key<u64>) -> Provider {
        Provider::new(name, out, &[input.name()], move |scope| {
            scope.get(input).map(|v| v + 1)
        })
    }

    #[test]
    fn test_resolves_provider_chain() {
        let container = Container::new()
            .provide(add_one("c_from_b", C, B))
            .provide(add_one("b_from_a", B, A))
            .supply(A, 1);

        let resolved = container.resolve(&[C.name()]).unwrap();
        assert_eq!(resolved.get(C).unwrap(), 3);
        assert_eq!(resolved.get(B).unwrap(), 2);
        assert_eq!(container.plan(&[C.name()]).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_binding_is_unresolved() {
        let container = Container::new().provide(add_one("b_from_a", B, A));
        let err = container.resolve(&[B.name()]).unwrap_err();
        match err {
            DepinjectError::UnresolvedDependency {
                binding,
                required_by,
            } => {
                assert_eq!(binding, "a");
                assert_eq!(required_by.as_deref(), Some("b_from_a"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_is_detected() {
        let container = Container::new()
            .provide(add_one("a_from_b", A, B))
            .provide(add_one("b_from_a", B, A));

        let err = container.resolve(&[A.name()]).unwrap_err();
        match err {
            DepinjectError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_cycle_is_detected() {
        let container = Container::new().provide(add_one("a_from_a", A, A));
        assert!(matches!(
            container.resolve(&[A.name()]),
            Err(DepinjectError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_nothing_is_built_when_plan_fails() {
        let built = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&built);
        let container = Container::new()
            .supply(A, 1)
            .provide(Provider::new("b", B, &[A.name()], move |scope| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                scope.get(A)
            }))
            .provide(add_one("c_from_missing", C, Key::<u64>::new("missing")));

        assert!(container.resolve(&[B.name(), C.name()]).is_err());
        assert!(!built.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_duplicate_supply_is_rejected() {
        let container = Container::new().supply(A, 1).supply(A, 2);
        assert!(matches!(
            container.resolve(&[A.name()]),
            Err(DepinjectError::DuplicateSupply { .. })
        ));
    }

    #[test]
    fn test_supplied_and_provided_is_rejected() {
        let container = Container::new()
            .supply(A, 1)
            .supply(B, 1)
            .provide(add_one("b_from_a", B, A));
        assert!(matches!(
            container.resolve(&[B.name()]),
            Err(DepinjectError::SuppliedAndProvided { .. })
        ));
    }

    #[test]
    fn test_undeclared_input_is_rejected() {
        let container = Container::new()
            .supply(A, 1)
            .supply(B, 2)
            .provide(Provider::new("sneaky", C, &[A.name()], |scope| {
                scope.get(B)
            }));

        let err = container.resolve(&[C.name()]).unwrap_err();
        let DepinjectError::ProviderFailed { source, .. } = err else {
            panic!("expected provider failure");
        };
        assert!(source.to_string().contains("undeclared input `b`"));
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let container = Container::new().supply(NAME, "node".to_string());
        let resolved = container.resolve(&[NAME.name()]).unwrap();
        assert!(matches!(
            resolved.get(Key::<u64>::new("name")),
            Err(DepinjectError::WrongType { .. })
        ));
    }

    #[test]
    fn test_provider_error_is_wrapped() {
        let container = Container::new().provide(Provider::new("broken", A, &[], |_| {
            Err::<u64, _>("no luck")
        }));
        let err = container.resolve(&[A.name()]).unwrap_err();
        assert_eq!(err.to_string(), "provider `broken` failed to build `a`");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "no luck");
    }

    #[test]
    fn test_merge_keeps_both_sides() {
        let left = Container::new().supply(A, 10);
        let right = Container::new().provide(add_one("b_from_a", B, A));
        let resolved = left.merge(right).resolve(&[B.name()]).unwrap();
        assert_eq!(resolved.get(B).unwrap(), 11);
    }

    fn constant(name: &'static str, value: u64) -> Provider {
        Provider::new(name, C, &[], move |_| Ok::<_, BoxError>(value))
    }

    proptest! {
        #[test]
        fn proptest_resolution_ignores_registration_order(
            values in proptest::collection::btree_map("[a-z]{1,8}", any::<u64>(), 1..6),
            seed in any::<u64>(),
        ) {
            let names: Vec<&'static str> = values
                .keys()
                .map(|name| &*Box::leak(name.clone().into_boxed_str()))
                .collect();
            let providers: Vec<Provider> = names
                .iter()
                .zip(values.values())
                .map(|(name, value)| constant(name, *value))
                .collect();

            let mut shuffled = providers.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let forward = providers
                .into_iter()
                .fold(Container::new(), Container::provide)
                .resolve(&[C.name()])
                .unwrap()
                .get(C)
                .unwrap();
            let backward = shuffled
                .into_iter()
                .fold(Container::new(), Container::provide)
                .resolve(&[C.name()])
                .unwrap()
                .get(C)
                .unwrap();

            prop_assert_eq!(forward, backward);
            prop_assert_eq!(forward, *values.values().next().unwrap());
        }
    }
}
