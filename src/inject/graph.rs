use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::table::Binding;
use super::{BindingError, BindingKey, BindingTable, Stage};

/// The realised object graph
///
/// Every key resolves to one instance for the lifetime of the graph: fixed
/// instances as given, provider results cached on first construction.
pub struct CompositionGraph {
    bindings: HashMap<BindingKey, Binding>,
    order: Vec<BindingKey>,
    singletons: RefCell<HashMap<BindingKey, Box<dyn Any>>>,
    constructing: RefCell<Vec<BindingKey>>,
}

/// Turn a binding table into a graph
pub fn compose(table: BindingTable, stage: Stage) -> Result<CompositionGraph, BindingError> {
    let entries = table.into_entries();
    let mut bindings = HashMap::with_capacity(entries.len());
    let mut order = Vec::with_capacity(entries.len());

    for (key, binding) in entries {
        if bindings.contains_key(&key) {
            return Err(BindingError::Duplicate {
                key: key.to_string(),
            });
        }
        order.push(key);
        bindings.insert(key, binding);
    }

    let graph = CompositionGraph {
        bindings,
        order,
        singletons: RefCell::new(HashMap::new()),
        constructing: RefCell::new(Vec::new()),
    };

    if stage == Stage::Production {
        for key in &graph.order {
            graph.instantiate(*key)?;
        }
    }

    debug!(bindings = graph.order.len(), ?stage, "composed object graph");
    Ok(graph)
}

impl CompositionGraph {
    /// Resolve the unnamed binding of `T`
    pub fn resolve<T: ?Sized + 'static>(&self) -> Result<Arc<T>, BindingError> {
        self.resolve_key(BindingKey::of::<T>(None))
    }

    /// Resolve the binding of `T` declared under `name`
    pub fn resolve_named<T: ?Sized + 'static>(&self, name: &'static str) -> Result<Arc<T>, BindingError> {
        self.resolve_key(BindingKey::of::<T>(Some(name)))
    }

    pub fn contains<T: ?Sized + 'static>(&self, name: Option<&'static str>) -> bool {
        self.bindings.contains_key(&BindingKey::of::<T>(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn resolve_key<T: ?Sized + 'static>(&self, key: BindingKey) -> Result<Arc<T>, BindingError> {
        self.instantiate(key)?;

        let resolved = match self.bindings.get(&key) {
            Some(Binding::Instance(instance)) => instance.downcast_ref::<Arc<T>>().cloned(),
            Some(Binding::Provider(_)) => self
                .singletons
                .borrow()
                .get(&key)
                .and_then(|instance| instance.downcast_ref::<Arc<T>>())
                .cloned(),
            None => None,
        };

        resolved.ok_or_else(|| BindingError::TypeMismatch {
            key: key.to_string(),
        })
    }

    /// Make sure the instance behind `key` exists
    fn instantiate(&self, key: BindingKey) -> Result<(), BindingError> {
        let provider = match self.bindings.get(&key) {
            Some(Binding::Instance(_)) => return Ok(()),
            Some(Binding::Provider(provider)) => provider,
            None => {
                return Err(BindingError::Unbound {
                    key: key.to_string(),
                    required_by: self.constructing.borrow().last().map(ToString::to_string),
                });
            }
        };

        if self.singletons.borrow().contains_key(&key) {
            return Ok(());
        }

        {
            let mut constructing = self.constructing.borrow_mut();
            if let Some(start) = constructing.iter().position(|pending| *pending == key) {
                let mut path: Vec<String> = constructing[start..].iter().map(ToString::to_string).collect();
                path.push(key.to_string());
                return Err(BindingError::Cycle {
                    path: path.join(" -> "),
                });
            }
            constructing.push(key);
        }

        // Providers resolve their own dependencies, so no borrow is held here
        let result = provider(self);
        self.constructing.borrow_mut().pop();

        let instance = result?;
        debug!(%key, "constructed binding");
        self.singletons.borrow_mut().insert(key, instance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::{MAIN, Module};
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct Polite {
        inner: Arc<dyn Greeter>,
    }

    impl Greeter for Polite {
        fn greet(&self) -> String {
            format!("{}, please", self.inner.greet())
        }
    }

    struct Ping;
    struct Pong;

    #[test]
    fn provider_receives_its_dependencies() {
        let mut table = BindingTable::new();
        table.bind::<dyn Greeter>().named(MAIN).to_instance(Arc::new(English));
        table.bind::<Polite>().to_provider(|graph| {
            Ok(Arc::new(Polite {
                inner: graph.resolve_named::<dyn Greeter>(MAIN)?,
            }))
        });

        let graph = compose(table, Stage::Production).unwrap();
        assert_eq!(graph.resolve::<Polite>().unwrap().greet(), "hello, please");
    }

    #[test]
    fn named_binding_is_not_found_without_its_name() {
        let mut table = BindingTable::new();
        table.bind::<dyn Greeter>().named(MAIN).to_instance(Arc::new(English));
        let graph = compose(table, Stage::Development).unwrap();

        let err = graph.resolve::<dyn Greeter>().err().unwrap();
        assert!(matches!(err, BindingError::Unbound { .. }));
        assert!(graph.resolve_named::<dyn Greeter>(MAIN).is_ok());
        assert!(graph.resolve_named::<dyn Greeter>("other").is_err());
    }

    #[test]
    fn same_type_under_two_names_coexists() {
        let mut table = BindingTable::new();
        table.bind::<dyn Greeter>().named(MAIN).to_instance(Arc::new(English));
        table.bind::<dyn Greeter>().to_provider(|graph| {
            Ok(Arc::new(Polite {
                inner: graph.resolve_named::<dyn Greeter>(MAIN)?,
            }))
        });

        let graph = compose(table, Stage::Production).unwrap();
        assert_eq!(graph.resolve::<dyn Greeter>().unwrap().greet(), "hello, please");
        assert_eq!(graph.resolve_named::<dyn Greeter>(MAIN).unwrap().greet(), "hello");
    }

    #[test]
    fn duplicate_key_fails_composition() {
        let mut table = BindingTable::new();
        table.bind::<dyn Greeter>().named(MAIN).to_instance(Arc::new(English));
        table.bind::<dyn Greeter>().named(MAIN).to_instance(Arc::new(English));

        let err = compose(table, Stage::Development).err().unwrap();
        assert!(matches!(err, BindingError::Duplicate { .. }));
    }

    #[test]
    fn production_stage_reports_missing_dependencies_up_front() {
        let mut table = BindingTable::new();
        table.bind::<Polite>().to_provider(|graph| {
            Ok(Arc::new(Polite {
                inner: graph.resolve::<dyn Greeter>()?,
            }))
        });

        match compose(table, Stage::Production) {
            Err(BindingError::Unbound { key, required_by }) => {
                assert!(key.contains("Greeter"));
                assert!(required_by.unwrap().contains("Polite"));
            }
            other => panic!("expected an unbound error, got {:?}", other.err()),
        }
    }

    #[test]
    fn development_stage_defers_errors_to_resolution() {
        let mut table = BindingTable::new();
        table.bind::<Polite>().to_provider(|graph| {
            Ok(Arc::new(Polite {
                inner: graph.resolve::<dyn Greeter>()?,
            }))
        });

        let graph = compose(table, Stage::Development).unwrap();
        assert!(graph.resolve::<Polite>().is_err());
    }

    #[test]
    fn cycles_are_reported() {
        let mut table = BindingTable::new();
        table.bind::<Ping>().to_provider(|graph| {
            graph.resolve::<Pong>()?;
            Ok(Arc::new(Ping))
        });
        table.bind::<Pong>().to_provider(|graph| {
            graph.resolve::<Ping>()?;
            Ok(Arc::new(Pong))
        });

        match compose(table, Stage::Production) {
            Err(BindingError::Cycle { path }) => {
                assert!(path.contains("Ping"));
                assert!(path.contains("Pong"));
            }
            other => panic!("expected a cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn providers_run_once_per_graph() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut table = BindingTable::new();
        table.bind::<dyn Greeter>().to_provider(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(English))
        });

        let graph = compose(table, Stage::Production).unwrap();
        let first = graph.resolve::<dyn Greeter>().unwrap();
        let second = graph.resolve::<dyn Greeter>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn construction_failures_name_the_binding() {
        let mut table = BindingTable::new();
        table
            .bind::<dyn Greeter>()
            .to_provider(|_| Err(BindingError::construction::<dyn Greeter>(anyhow::anyhow!("no locale"))));

        let err = compose(table, Stage::Production).err().unwrap();
        assert!(matches!(err, BindingError::Construction { .. }));
        assert!(format!("{:#}", anyhow::Error::new(err)).contains("no locale"));
    }

    #[test]
    fn modules_install_their_declarations() {
        struct GreeterModule;

        impl Module for GreeterModule {
            fn configure(&self, bindings: &mut BindingTable) {
                bindings.bind::<dyn Greeter>().to_instance(Arc::new(English));
            }
        }

        let mut table = BindingTable::new();
        table.install(&GreeterModule);
        assert!(table.contains::<dyn Greeter>(None));
        assert!(!table.contains::<dyn Greeter>(Some(MAIN)));
    }
}
