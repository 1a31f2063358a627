pub mod builtins;
pub mod registrar;
pub mod registry;

pub use builtins::BuiltinCommands;
pub use registrar::{CommandRegistrar, CommandSource, CommandsModule, SourceRegistrar};
pub use registry::{CommandRegistry, RegistryError};

use crate::shell::Shell;

/// A command the shell can dispatch to by name
pub trait Command {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Run with the words following the command name; returns the exit status
    fn execute(&self, shell: &Shell, args: &[String]) -> anyhow::Result<i32>;
}
