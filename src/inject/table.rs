use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{BindingError, BindingKey, CompositionGraph};

pub(super) type Provider = Box<dyn Fn(&CompositionGraph) -> Result<Box<dyn Any>, BindingError>>;

/// What a key is bound to. Both variants store an `Arc<T>` behind `dyn Any`.
pub(super) enum Binding {
    Instance(Box<dyn Any>),
    Provider(Provider),
}

/// A group of binding declarations
pub trait Module {
    fn configure(&self, bindings: &mut BindingTable);
}

/// Declarations collected before composition, in declaration order
///
/// Duplicates are kept here and rejected by `compose`, so declaring never fails.
#[derive(Default)]
pub struct BindingTable {
    entries: Vec<(BindingKey, Binding)>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a declaration for service type `T`
    pub fn bind<T: ?Sized + 'static>(&mut self) -> BindingBuilder<'_, T> {
        BindingBuilder {
            table: self,
            name: None,
            _service: PhantomData,
        }
    }

    /// Apply all declarations of `module`
    pub fn install(&mut self, module: &dyn Module) {
        module.configure(self);
    }

    pub fn contains<T: ?Sized + 'static>(&self, name: Option<&'static str>) -> bool {
        let key = BindingKey::of::<T>(name);
        self.entries.iter().any(|(existing, _)| *existing == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(super) fn into_entries(self) -> Vec<(BindingKey, Binding)> {
        self.entries
    }

    fn push(&mut self, key: BindingKey, binding: Binding) {
        self.entries.push((key, binding));
    }
}

/// Declaration in progress; finished by `to_instance` or `to_provider`
#[must_use = "a binding is only recorded by to_instance or to_provider"]
pub struct BindingBuilder<'a, T: ?Sized> {
    table: &'a mut BindingTable,
    name: Option<&'static str>,
    _service: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + 'static> BindingBuilder<'_, T> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Bind to an already constructed instance
    pub fn to_instance(self, instance: Arc<T>) {
        let key = BindingKey::of::<T>(self.name);
        self.table.push(key, Binding::Instance(Box::new(instance)));
    }

    /// Bind to a provider; it runs at most once per graph
    pub fn to_provider<F>(self, provider: F)
    where
        F: Fn(&CompositionGraph) -> Result<Arc<T>, BindingError> + 'static,
    {
        let key = BindingKey::of::<T>(self.name);
        self.table.push(
            key,
            Binding::Provider(Box::new(move |graph| {
                provider(graph).map(|instance| Box::new(instance) as Box<dyn Any>)
            })),
        );
    }
}
