use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use super::{BuiltinCommands, Command, CommandRegistry};
use crate::environment::ExecutionEnvironment;
use crate::inject::{BindingTable, Module};
use crate::py_bindings::PythonPlugins;

/// Installs every available command into the shell's command table
pub trait CommandRegistrar {
    fn register_commands(&self) -> anyhow::Result<()>;
}

/// Somewhere commands come from: the built-ins, a plugin runtime, ...
pub trait CommandSource {
    fn name(&self) -> &str;
    fn commands(&self) -> anyhow::Result<Vec<Arc<dyn Command>>>;
}

/// Registers the commands of each source in order; stops at the first failure
pub struct SourceRegistrar {
    registry: Arc<CommandRegistry>,
    sources: Vec<Box<dyn CommandSource>>,
}

impl SourceRegistrar {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl CommandSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl CommandRegistrar for SourceRegistrar {
    fn register_commands(&self) -> anyhow::Result<()> {
        for source in &self.sources {
            let commands = source
                .commands()
                .with_context(|| format!("command source `{}` failed", source.name()))?;

            let count = commands.len();
            for command in commands {
                self.registry
                    .register(command)
                    .with_context(|| format!("while registering commands from `{}`", source.name()))?;
            }
            info!(source = source.name(), count, "registered commands");
        }
        Ok(())
    }
}

/// Binds the registrar used by the harbor binary: the built-ins first, then
/// the plugins of the installed environment
pub struct CommandsModule;

impl Module for CommandsModule {
    fn configure(&self, bindings: &mut BindingTable) {
        bindings.bind::<dyn CommandRegistrar>().to_provider(|graph| {
            let registry = graph.resolve::<CommandRegistry>()?;
            let environment = graph.resolve::<ExecutionEnvironment>()?;
            let registrar = SourceRegistrar::new(registry)
                .with_source(BuiltinCommands)
                .with_source(PythonPlugins::new(environment));
            Ok(Arc::new(registrar) as Arc<dyn CommandRegistrar>)
        });
    }
}
