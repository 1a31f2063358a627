//! Python plugin runtime
//!
//! Each installed artifact is a zip archive importable by Python's zipimport.
//! `<name>.zip` may provide the module `<name>`; a module contributes commands
//! through a `COMMANDS` mapping of command name to callable. The callable takes
//! the argument list and returns an exit status, or `None` for success.
//!
//! Archives that provide no such module are plain libraries: they are on
//! `sys.path` for plugins to import but contribute no commands.
//!
//! The interpreter starts on first use, so a shell without archives never
//! starts it.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use pyo3::exceptions::PyModuleNotFoundError;
use pyo3::prelude::*;
use tracing::{debug, info};

use crate::command::{Command, CommandSource};
use crate::environment::ExecutionEnvironment;
use crate::shell::Shell;

/// Module attribute listing a plugin's commands
pub const COMMANDS_ATTR: &str = "COMMANDS";

/// Put the environment's archives on `sys.path`, nearest layer first
///
/// Entries already present are left where they are, so activating twice is harmless.
pub fn activate_environment(py: Python<'_>, environment: &ExecutionEnvironment) -> PyResult<usize> {
    let sys_path = py.import("sys")?.getattr("path")?;

    let mut inserted = 0;
    for entry in environment.search_path() {
        let entry = entry.to_string_lossy().into_owned();
        if sys_path.contains(entry.as_str())? {
            continue;
        }
        sys_path.call_method1("insert", (inserted, entry))?;
        inserted += 1;
    }

    debug!(layer = environment.id(), inserted, "activated environment");
    Ok(inserted)
}

/// Whether `name` can be imported as a top-level module
///
/// Versioned or dotted archive names like `util-1.0` or `a.b` cannot.
pub fn is_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Candidate plugin modules of the environment, without repeats, nearest layer first
pub fn plugin_modules(environment: &ExecutionEnvironment) -> Vec<String> {
    let mut seen = BTreeSet::new();
    environment
        .all_artifacts()
        .into_iter()
        .map(|artifact| artifact.module_name())
        .filter(|name| {
            if !is_module_name(name) {
                debug!(archive = %name, "library archive, not a plugin module");
                return false;
            }
            seen.insert(name.clone())
        })
        .collect()
}

/// The import failed because `module_name` itself does not exist
fn is_missing(py: Python<'_>, err: &PyErr, module_name: &str) -> bool {
    err.is_instance_of::<PyModuleNotFoundError>(py)
        && err
            .value(py)
            .getattr("name")
            .ok()
            .and_then(|name| name.extract::<String>().ok())
            .is_some_and(|name| name == module_name)
}

/// Run `f` with `sys.stdout` captured; returns its result and what it printed
fn capture_stdout<T>(py: Python<'_>, f: impl FnOnce() -> PyResult<T>) -> PyResult<(PyResult<T>, String)> {
    let sys = py.import("sys")?;
    let capture = py.import("io")?.getattr("StringIO")?.call0()?;
    let saved = sys.getattr("stdout")?;

    sys.setattr("stdout", &capture)?;
    let result = f();
    sys.setattr("stdout", saved)?;

    let printed = capture.call_method0("getvalue")?.extract::<String>()?;
    Ok((result, printed))
}

/// Commands exported by the plugins of an installed environment
pub struct PythonPlugins {
    environment: Arc<ExecutionEnvironment>,
}

impl PythonPlugins {
    pub fn new(environment: Arc<ExecutionEnvironment>) -> Self {
        Self { environment }
    }
}

impl CommandSource for PythonPlugins {
    fn name(&self) -> &str {
        "python plugins"
    }

    fn commands(&self) -> anyhow::Result<Vec<Arc<dyn Command>>> {
        let modules = plugin_modules(&self.environment);
        if modules.is_empty() {
            debug!("no plugin archives installed");
            return Ok(Vec::new());
        }

        Python::attach(|py| {
            activate_environment(py, &self.environment).context("could not activate the plugin environment")?;

            let mut commands: Vec<Arc<dyn Command>> = Vec::new();
            for module_name in &modules {
                let module = match py.import(module_name.as_str()) {
                    Ok(module) => module,
                    Err(err) if is_missing(py, &err, module_name) => {
                        debug!(module = %module_name, "archive provides no module of its name");
                        continue;
                    }
                    Err(err) => {
                        return Err(anyhow::Error::new(err)
                            .context(format!("could not import plugin module `{module_name}`")));
                    }
                };

                if !module.hasattr(COMMANDS_ATTR)? {
                    debug!(module = %module_name, "plugin exports no commands");
                    continue;
                }

                let exported = module.getattr(COMMANDS_ATTR)?;
                let mut count = 0;
                for item in exported.call_method0("items")?.try_iter()? {
                    let (name, callable) = item?
                        .extract::<(String, Py<PyAny>)>()
                        .with_context(|| format!("`{module_name}.{COMMANDS_ATTR}` must map names to callables"))?;
                    let description = describe(callable.bind(py));
                    commands.push(Arc::new(PythonCommand {
                        name,
                        description,
                        module: module_name.clone(),
                        callable,
                    }));
                    count += 1;
                }
                info!(module = %module_name, count, "loaded plugin");
            }
            Ok(commands)
        })
    }
}

/// First line of the callable's docstring
fn describe(callable: &Bound<'_, PyAny>) -> String {
    callable
        .getattr("__doc__")
        .ok()
        .filter(|doc| !doc.is_none())
        .and_then(|doc| doc.extract::<String>().ok())
        .and_then(|doc| doc.lines().map(str::trim).find(|line| !line.is_empty()).map(String::from))
        .unwrap_or_default()
}

/// A command implemented by a plugin callable
pub struct PythonCommand {
    name: String,
    description: String,
    module: String,
    callable: Py<PyAny>,
}

impl PythonCommand {
    pub fn module(&self) -> &str {
        &self.module
    }
}

impl Command for PythonCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&self, shell: &Shell, args: &[String]) -> anyhow::Result<i32> {
        Python::attach(|py| {
            let (result, printed) = capture_stdout(py, || self.callable.call1(py, (args.to_vec(),)))
                .context("could not redirect plugin output")?;
            for line in printed.lines() {
                shell.io().write_line(line)?;
            }
            let result = result.with_context(|| format!("{} (from `{}`) raised", self.name, self.module))?;

            let result = result.bind(py);
            if result.is_none() {
                return Ok(0);
            }
            let code = result
                .extract::<i32>()
                .with_context(|| format!("{} must return an int or None", self.name))?;
            Ok(code)
        })
    }
}
