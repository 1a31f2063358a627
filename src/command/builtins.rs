use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};

use super::{Command, CommandSource};
use crate::shell::Shell;
use crate::shell::variables::EnvValue;

type BuiltinFn = fn(&Shell, &[String]) -> anyhow::Result<i32>;

/// A command implemented inside the shell itself
#[derive(Clone, Copy)]
pub struct Builtin {
    name: &'static str,
    description: &'static str,
    run: BuiltinFn,
}

impl Command for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn execute(&self, shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
        (self.run)(shell, args)
    }
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "help",
        description: "List commands, or describe one",
        run: help,
    },
    Builtin {
        name: "echo",
        description: "Print the arguments",
        run: echo,
    },
    Builtin {
        name: "set",
        description: "List variables, or set one: set NAME VALUE",
        run: set,
    },
    Builtin {
        name: "unset",
        description: "Remove variables",
        run: unset,
    },
    Builtin {
        name: "cd",
        description: "Change the working directory",
        run: cd,
    },
    Builtin {
        name: "pwd",
        description: "Print the working directory (-P resolves symlinks)",
        run: pwd,
    },
    Builtin {
        name: "loglevel",
        description: "Show or change the log filter",
        run: loglevel,
    },
    Builtin {
        name: "exit",
        description: "Leave the shell with an optional status",
        run: exit,
    },
];

/// The commands every shell has
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCommands;

impl CommandSource for BuiltinCommands {
    fn name(&self) -> &str {
        "builtins"
    }

    fn commands(&self) -> anyhow::Result<Vec<Arc<dyn Command>>> {
        Ok(BUILTINS
            .iter()
            .map(|builtin| Arc::new(*builtin) as Arc<dyn Command>)
            .collect())
    }
}

fn help(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    let io = shell.io();
    if let Some(name) = args.first() {
        let Some(command) = shell.commands().get(name) else {
            bail!("help: no command named `{name}`");
        };
        io.write_line(&format!("{name}: {}", command.description()))?;
        return Ok(0);
    }

    io.write_line(&format!("{} commands:", shell.branding().display_name))?;
    for name in shell.commands().names() {
        let description = shell
            .commands()
            .get(&name)
            .map(|command| command.description().to_string())
            .unwrap_or_default();
        io.write_line(&format!("  {name:<12} {description}"))?;
    }
    Ok(0)
}

fn echo(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    shell.io().write_line(&args.join(" "))?;
    Ok(0)
}

fn set(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    let variables = shell.variables();
    match args {
        [] => {
            for name in variables.names() {
                let value = variables.get(&name).unwrap_or(EnvValue::None);
                shell.io().write_line(&format!("{name}={value}"))?;
            }
        }
        [assignment] => {
            let Some((name, value)) = assignment.split_once('=') else {
                bail!("set: expected NAME=VALUE or NAME VALUE");
            };
            variables.set(name, EnvValue::parse(value));
        }
        [name, value @ ..] => variables.set(name, EnvValue::parse(&value.join(" "))),
    }
    Ok(0)
}

fn unset(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    if args.is_empty() {
        bail!("unset: missing variable name");
    }
    for name in args {
        shell.variables().unset(name);
    }
    Ok(0)
}

fn path_value(value: Option<EnvValue>) -> Option<PathBuf> {
    match value {
        Some(EnvValue::String(s)) => Some(PathBuf::from(s)),
        Some(EnvValue::FilePath(p)) => Some(p),
        _ => None,
    }
}

/// Args:
///   - [] -> HOME
///   - ["-"] -> OLDPWD, echoed
///   - [path] -> path, with a leading `~` expanded
fn cd(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    let variables = shell.variables();
    let target = match args.first().map(String::as_str) {
        None => path_value(variables.get("HOME")).context("cd: HOME not set")?,
        Some("-") => {
            let previous = path_value(variables.get("OLDPWD")).context("cd: OLDPWD not set")?;
            shell.io().write_line(&previous.display().to_string())?;
            previous
        }
        Some(path) if path == "~" || path.starts_with("~/") => {
            let home = path_value(variables.get("HOME")).context("cd: HOME not set")?;
            match path.strip_prefix("~/") {
                Some(rest) => home.join(rest),
                None => home,
            }
        }
        Some(path) => PathBuf::from(path),
    };

    let current = env::current_dir().context("cd: cannot get current directory")?;
    env::set_current_dir(&target).with_context(|| format!("cd: {}", target.display()))?;
    let new_dir = env::current_dir().context("cd: cannot get new directory")?;

    variables.set("OLDPWD", EnvValue::FilePath(current));
    variables.set("PWD", EnvValue::FilePath(new_dir));
    Ok(0)
}

fn pwd(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    let physical = args.iter().any(|arg| arg == "-P");
    let logical = if physical {
        None
    } else {
        path_value(shell.variables().get("PWD"))
    };

    let dir = match logical {
        Some(dir) => dir,
        None => env::current_dir().context("pwd")?,
    };
    shell.io().write_line(&dir.display().to_string())?;
    Ok(0)
}

fn loglevel(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    match args.first() {
        None => shell.io().write_line(&shell.logging().level())?,
        Some(directives) => shell.logging().set_level(directives)?,
    }
    Ok(0)
}

fn exit(shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
    let code = match args.first() {
        None => 0,
        Some(code) => code
            .parse::<i32>()
            .with_context(|| format!("exit: numeric status required, got `{code}`"))?,
    };
    shell.request_exit(code);
    Ok(code)
}
