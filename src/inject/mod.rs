//! Composition root: typed bindings from service types to instances
//!
//! Bindings are keyed by the service type and an optional name. The name lets two
//! instances of the same service type coexist, e.g. the main session's IO channel
//! next to one owned by a nested session. A request matches only the exact key:
//! asking for an unnamed `dyn IoChannel` never falls back to the `"main"` one.

mod graph;
mod table;

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

pub use graph::{CompositionGraph, compose};
pub use table::{BindingBuilder, BindingTable, Module};

/// Name of the bindings that belong to the main interactive session
pub const MAIN: &str = "main";

/// When bindings are instantiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Instantiate on first resolution
    Development,
    /// Instantiate every binding inside `compose`, so wiring errors surface there
    Production,
}

/// Identity of one binding: service type plus optional name
#[derive(Clone, Copy)]
pub struct BindingKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<&'static str>,
}

impl BindingKey {
    pub fn of<T: ?Sized + 'static>(name: Option<&'static str>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name,
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }
}

impl PartialEq for BindingKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for BindingKey {}

impl Hash for BindingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} named \"{}\"", self.type_name, name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

impl fmt::Debug for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingKey({self})")
    }
}

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("{key} is bound more than once")]
    Duplicate { key: String },

    #[error("no binding for {key}{}", required_suffix(.required_by))]
    Unbound {
        key: String,
        required_by: Option<String>,
    },

    #[error("dependency cycle: {path}")]
    Cycle { path: String },

    #[error("failed to construct {key}")]
    Construction {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("binding for {key} holds a value of another type")]
    TypeMismatch { key: String },
}

impl BindingError {
    /// Wrap a constructor failure for the unnamed binding of `T`
    pub fn construction<T: ?Sized + 'static>(source: impl Into<anyhow::Error>) -> Self {
        BindingError::Construction {
            key: BindingKey::of::<T>(None).to_string(),
            source: source.into(),
        }
    }
}

fn required_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(dependent) => format!(" (required by {dependent})"),
        None => String::new(),
    }
}
