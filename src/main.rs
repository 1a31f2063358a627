use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use harbor_shell::bootstrap::{Bootstrap, Launch, RunLoop, ShellConfig};
use harbor_shell::command::CommandsModule;
use harbor_shell::environment::BootstrapContext;
use harbor_shell::logging::init_logging;
use harbor_shell::repl::{OneShot, Repl};
use harbor_shell::shell::variables::SHOW_ERROR_CHAIN;
use harbor_shell::shell::{
    Branding, CoreModule, EnvValue, SessionVariables, ShellModule, StreamIo, VariableStore, Verbosity,
};

#[derive(Debug, Parser)]
#[command(name = "harbor", version, about = "Harbor Shell, an extensible command shell")]
struct Cli {
    /// Run one command line and exit with its status
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    command: Option<String>,

    /// Log at debug level and show full error chains
    #[arg(short, long)]
    debug: bool,

    /// Only print errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Command to run instead of starting a session
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    fn one_shot_line(&self) -> Option<String> {
        match &self.command {
            Some(line) => Some(line.clone()),
            None if !self.args.is_empty() => Some(shell_words::join(&self.args)),
            None => None,
        }
    }
}

fn run(cli: &Cli, launch: Launch) -> Result<i32> {
    let mut run_loop: Box<dyn RunLoop> = match cli.one_shot_line() {
        Some(line) => Box::new(OneShot::new(line)),
        None => Box::new(Repl::new()?),
    };
    launch.hand_off(run_loop.as_mut())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let directives = if cli.debug { "debug" } else { "warn" };
    if let Err(e) = init_logging(directives) {
        eprintln!("warning: logging disabled: {e:#}");
    }

    let branding = Branding::harbor();
    let config = ShellConfig::from_env(&branding).with_verbosity(cli.verbosity());

    let variables = Arc::new(SessionVariables::from_parent());
    if cli.debug {
        variables.set(SHOW_ERROR_CHAIN, EnvValue::Bool(true));
    }
    let io = Arc::new(StreamIo::new(config.verbosity));

    // One context per process; the environment it holds is installed once
    let context = BootstrapContext::new();
    let launch = Bootstrap::new(&context)
        .with_module(ShellModule::new(branding, io, variables))
        .with_module(CoreModule)
        .with_module(CommandsModule)
        .run(&config);

    let launch = match launch {
        Ok(launch) => launch,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("harbor: {:#}", anyhow::Error::new(e));
            return ExitCode::from(code);
        }
    };

    match run(&cli, launch) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("harbor: {e:#}");
            ExitCode::FAILURE
        }
    }
}
