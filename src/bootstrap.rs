//! Startup sequence
//!
//! `Unconfigured -> EnvironmentLayered -> Composed -> CommandsRegistered -> Running`.
//! Each transition either succeeds in order or ends the bootstrap with a
//! `BootstrapError` naming it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::artifact::{ArtifactScanner, DirectoryScanner};
use crate::command::CommandRegistrar;
use crate::environment::{BootstrapContext, EnvironmentError, ExecutionEnvironment, build_layered_environment};
use crate::inject::{BindingError, BindingTable, CompositionGraph, Module, Stage, compose};
use crate::shell::{Branding, Shell, Verbosity};

/// Sub-directory of the home holding extension archives
pub const EXTENSIONS_DIR: &str = "ext";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{variable} is not set; it must name the shell's home directory")]
    HomeNotSet { variable: String },
}

/// Startup settings gathered from the environment and the command line
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    pub home: Option<PathBuf>,
    /// Variable the home came from, for error messages
    pub home_variable: String,
    pub verbosity: Verbosity,
}

impl ShellConfig {
    /// Read the home from the variable named by the branding
    pub fn from_env(branding: &Branding) -> Self {
        let home = std::env::var_os(&branding.home_variable).map(PathBuf::from);
        Self {
            home,
            home_variable: branding.home_variable.clone(),
            verbosity: Verbosity::Normal,
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// The directories scanned for artifacts; fails when no home is configured
    pub fn roots(&self) -> Result<ExtensionRoots, ConfigError> {
        match &self.home {
            Some(home) if !home.as_os_str().is_empty() => Ok(ExtensionRoots::new(home)),
            _ => Err(ConfigError::HomeNotSet {
                variable: self.home_variable.clone(),
            }),
        }
    }
}

/// Where artifacts are looked for: the home itself and its `ext` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRoots {
    pub primary: PathBuf,
    pub extensions: PathBuf,
}

impl ExtensionRoots {
    pub fn new(home: &Path) -> Self {
        Self {
            primary: home.to_path_buf(),
            extensions: home.join(EXTENSIONS_DIR),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Unconfigured,
    EnvironmentLayered,
    Composed,
    CommandsRegistered,
    Running,
    Failed,
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootState::Unconfigured => "Unconfigured",
            BootState::EnvironmentLayered => "EnvironmentLayered",
            BootState::Composed => "Composed",
            BootState::CommandsRegistered => "CommandsRegistered",
            BootState::Running => "Running",
            BootState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BootState,
    pub to: BootState,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[derive(Debug, Error)]
pub enum BootstrapErrorKind {
    #[error("configuration error")]
    Configuration(#[from] ConfigError),
    #[error("environment construction error")]
    Environment(#[from] EnvironmentError),
    #[error("binding error")]
    Binding(#[from] BindingError),
    #[error("command registration failed")]
    Registration(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("bootstrap failed during {transition}")]
pub struct BootstrapError {
    pub transition: Transition,
    #[source]
    pub kind: BootstrapErrorKind,
}

impl BootstrapError {
    /// Process exit status for a failed startup
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Receives the shell once startup is complete
pub trait RunLoop {
    /// Drive the session; returns the process exit status
    fn run(&mut self, shell: &Shell) -> anyhow::Result<i32>;
}

/// Drives the startup sequence against one `BootstrapContext`
pub struct Bootstrap<'a> {
    context: &'a BootstrapContext,
    scanner: Box<dyn ArtifactScanner + 'a>,
    modules: Vec<Box<dyn Module + 'a>>,
    state: BootState,
}

impl<'a> Bootstrap<'a> {
    pub fn new(context: &'a BootstrapContext) -> Self {
        Self {
            context,
            scanner: Box::new(DirectoryScanner),
            modules: Vec::new(),
            state: BootState::Unconfigured,
        }
    }

    pub fn with_scanner(mut self, scanner: impl ArtifactScanner + 'a) -> Self {
        self.scanner = Box::new(scanner);
        self
    }

    /// Add a module to the binding table; modules apply in the order given
    pub fn with_module(mut self, module: impl Module + 'a) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Last state reached; `Failed` once any step has failed
    pub fn state(&self) -> BootState {
        self.state
    }

    /// Run every step up to the hand-off
    pub fn run(&mut self, config: &ShellConfig) -> Result<Launch, BootstrapError> {
        let layered = self.layer_environment(config);
        let environment = self.advance(BootState::EnvironmentLayered, layered)?;

        let composed = self.compose_shell(&environment);
        let (graph, shell) = self.advance(BootState::Composed, composed)?;

        let registered = register_commands(&graph, &shell);
        self.advance(BootState::CommandsRegistered, registered)?;

        Ok(Launch {
            shell,
            environment,
            graph,
        })
    }

    fn advance<T>(&mut self, to: BootState, result: Result<T, BootstrapErrorKind>) -> Result<T, BootstrapError> {
        let transition = Transition { from: self.state, to };
        match result {
            Ok(value) => {
                info!(%transition, "bootstrap");
                self.state = to;
                Ok(value)
            }
            Err(kind) => {
                error!(%transition, error = %kind, "bootstrap failed");
                self.state = BootState::Failed;
                Err(BootstrapError { transition, kind })
            }
        }
    }

    fn layer_environment(&self, config: &ShellConfig) -> Result<Arc<ExecutionEnvironment>, BootstrapErrorKind> {
        // Checked before touching the filesystem
        let roots = config.roots()?;

        let mut artifacts = self.scanner.scan(&roots.primary);
        let extensions = self.scanner.scan(&roots.extensions);
        debug!(
            primary = artifacts.len(),
            extensions = extensions.len(),
            home = %roots.primary.display(),
            "scanned extension roots"
        );
        artifacts.extend(extensions);

        let environment = build_layered_environment(ExecutionEnvironment::root(), artifacts)?;
        Ok(self.context.install(environment)?)
    }

    fn compose_shell(
        &self,
        environment: &Arc<ExecutionEnvironment>,
    ) -> Result<(CompositionGraph, Arc<Shell>), BootstrapErrorKind> {
        let mut table = BindingTable::new();
        table.bind::<ExecutionEnvironment>().to_instance(Arc::clone(environment));
        for module in &self.modules {
            table.install(module.as_ref());
        }

        let graph = compose(table, Stage::Production)?;
        let shell = graph.resolve::<Shell>()?;
        Ok((graph, shell))
    }
}

/// Resolve the registrar and let it fill the shell's command table
pub fn register_commands(graph: &CompositionGraph, shell: &Shell) -> Result<(), BootstrapErrorKind> {
    let registrar = graph.resolve::<dyn CommandRegistrar>()?;
    registrar
        .register_commands()
        .map_err(BootstrapErrorKind::Registration)?;
    info!(commands = shell.commands().len(), "command table ready");
    Ok(())
}

/// A fully started shell, ready to be handed to its run loop
pub struct Launch {
    shell: Arc<Shell>,
    environment: Arc<ExecutionEnvironment>,
    graph: CompositionGraph,
}

impl Launch {
    pub fn shell(&self) -> &Arc<Shell> {
        &self.shell
    }

    pub fn environment(&self) -> &Arc<ExecutionEnvironment> {
        &self.environment
    }

    pub fn graph(&self) -> &CompositionGraph {
        &self.graph
    }

    pub fn hand_off(self, run_loop: &mut dyn RunLoop) -> anyhow::Result<i32> {
        let transition = Transition {
            from: BootState::CommandsRegistered,
            to: BootState::Running,
        };
        info!(%transition, "bootstrap");
        run_loop.run(&self.shell)
    }
}
