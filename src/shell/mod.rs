pub mod branding;
pub mod error_handler;
pub mod io;
pub mod prompt;
pub mod variables;

use std::cell::Cell;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::debug;

pub use branding::Branding;
pub use error_handler::{ErrorHandler, ShellErrorHandler};
pub use io::{BufferIo, IoChannel, StreamIo, Verbosity};
pub use prompt::{PromptRenderer, ShellPrompt};
pub use variables::{EnvValue, LAST_EXIT, SessionVariables, VariableStore};

use crate::command::CommandRegistry;
use crate::inject::{BindingTable, MAIN, Module};
use crate::logging::{LoggingSink, TracingLoggingSystem};

/// The assembled shell: every subsystem a session needs, plus its command table
pub struct Shell {
    logging: Arc<dyn LoggingSink>,
    prompt: Arc<dyn PromptRenderer>,
    error_handler: Arc<dyn ErrorHandler>,
    branding: Arc<Branding>,
    io: Arc<dyn IoChannel>,
    variables: Arc<dyn VariableStore>,
    commands: Arc<CommandRegistry>,
    exit_request: Cell<Option<i32>>,
}

impl Shell {
    pub fn new(
        logging: Arc<dyn LoggingSink>,
        prompt: Arc<dyn PromptRenderer>,
        error_handler: Arc<dyn ErrorHandler>,
        branding: Arc<Branding>,
        io: Arc<dyn IoChannel>,
        variables: Arc<dyn VariableStore>,
        commands: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            logging,
            prompt,
            error_handler,
            branding,
            io,
            variables,
            commands,
            exit_request: Cell::new(None),
        }
    }

    pub fn logging(&self) -> &dyn LoggingSink {
        self.logging.as_ref()
    }

    pub fn prompt(&self) -> &dyn PromptRenderer {
        self.prompt.as_ref()
    }

    pub fn error_handler(&self) -> &dyn ErrorHandler {
        self.error_handler.as_ref()
    }

    pub fn branding(&self) -> &Branding {
        &self.branding
    }

    pub fn io(&self) -> &dyn IoChannel {
        self.io.as_ref()
    }

    pub fn variables(&self) -> &dyn VariableStore {
        self.variables.as_ref()
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Split `line` into words and run the command named by the first one
    pub fn execute(&self, line: &str) -> anyhow::Result<i32> {
        let words = shell_words::split(line).context("could not parse command line")?;
        let Some((name, args)) = words.split_first() else {
            return Ok(0);
        };

        let Some(command) = self.commands.get(name) else {
            bail!("{name}: command not found");
        };
        debug!(command = %name, args = args.len(), "executing");
        command.execute(self, args)
    }

    /// Execute `line`, record its status in `?` and report any failure
    ///
    /// Returns whether the session should keep reading input.
    pub fn run_line(&self, line: &str) -> bool {
        match self.execute(line) {
            Ok(code) => {
                self.variables.set(LAST_EXIT, EnvValue::Integer(code.into()));
                true
            }
            Err(e) => {
                self.variables.set(LAST_EXIT, EnvValue::Integer(1));
                self.error_handler.handle_error(&e)
            }
        }
    }

    /// Status of the most recent command
    pub fn last_status(&self) -> i32 {
        match self.variables.get(LAST_EXIT) {
            Some(EnvValue::Integer(code)) => i32::try_from(code).unwrap_or(1),
            _ => 0,
        }
    }

    pub fn request_exit(&self, code: i32) {
        self.exit_request.set(Some(code));
    }

    pub fn exit_requested(&self) -> Option<i32> {
        self.exit_request.get()
    }
}

/// Bindings for the session-independent parts of the shell
///
/// Expects the session module to provide the logging sink, prompt, error
/// handler, branding and the `main` IO channel and variable store.
pub struct CoreModule;

impl Module for CoreModule {
    fn configure(&self, bindings: &mut BindingTable) {
        bindings
            .bind::<CommandRegistry>()
            .to_provider(|_| Ok(Arc::new(CommandRegistry::new())));

        bindings.bind::<Shell>().to_provider(|graph| {
            Ok(Arc::new(Shell::new(
                graph.resolve::<dyn LoggingSink>()?,
                graph.resolve::<dyn PromptRenderer>()?,
                graph.resolve::<dyn ErrorHandler>()?,
                graph.resolve::<Branding>()?,
                graph.resolve_named::<dyn IoChannel>(MAIN)?,
                graph.resolve_named::<dyn VariableStore>(MAIN)?,
                graph.resolve::<CommandRegistry>()?,
            )))
        });
    }
}

/// Bindings for one interactive session over the given streams and variables
pub struct ShellModule {
    branding: Arc<Branding>,
    io: Arc<dyn IoChannel>,
    variables: Arc<dyn VariableStore>,
}

impl ShellModule {
    pub fn new(branding: Branding, io: Arc<dyn IoChannel>, variables: Arc<dyn VariableStore>) -> Self {
        Self {
            branding: Arc::new(branding),
            io,
            variables,
        }
    }
}

impl Module for ShellModule {
    fn configure(&self, bindings: &mut BindingTable) {
        bindings
            .bind::<dyn LoggingSink>()
            .to_provider(|_| Ok(Arc::new(TracingLoggingSystem::new()) as Arc<dyn LoggingSink>));

        bindings.bind::<dyn PromptRenderer>().to_provider(|graph| {
            let prompt = ShellPrompt::new(
                graph.resolve::<Branding>()?,
                graph.resolve_named::<dyn VariableStore>(MAIN)?,
            );
            Ok(Arc::new(prompt) as Arc<dyn PromptRenderer>)
        });

        bindings.bind::<dyn ErrorHandler>().to_provider(|graph| {
            let handler = ShellErrorHandler::new(
                graph.resolve_named::<dyn IoChannel>(MAIN)?,
                graph.resolve_named::<dyn VariableStore>(MAIN)?,
            );
            Ok(Arc::new(handler) as Arc<dyn ErrorHandler>)
        });

        bindings.bind::<Branding>().to_instance(self.branding.clone());
        bindings.bind::<dyn IoChannel>().named(MAIN).to_instance(self.io.clone());
        bindings
            .bind::<dyn VariableStore>()
            .named(MAIN)
            .to_instance(self.variables.clone());
    }
}
