use std::path::Path;
use std::sync::Arc;

use harbor_shell::artifact::scan;
use harbor_shell::bootstrap::{BootState, Bootstrap, BootstrapError, BootstrapErrorKind, Launch, ShellConfig};
use harbor_shell::command::{Command, CommandSource, CommandsModule};
use harbor_shell::environment::{BootstrapContext, ExecutionEnvironment, build_layered_environment};
use harbor_shell::py_bindings::{PythonPlugins, activate_environment, plugin_modules};
use harbor_shell::repl::OneShot;
use harbor_shell::shell::{Branding, BufferIo, CoreModule, SessionVariables, ShellModule, Verbosity};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tempfile::TempDir;

const GREETER: &str = r#"
def hello(args):
    """Say hello

    Prints its arguments.
    """
    print("hello", *args)
    return len(args)

def quiet(args):
    pass

COMMANDS = {"hello": hello, "quiet": quiet}
"#;

const HELPERS: &str = "def helper():\n    return 1\n";

/// Write `<archive>.zip` holding the given `(file name, source)` members,
/// using the interpreter's own zipfile
fn write_archive(dir: &Path, archive: &str, members: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    let target = dir.join(format!("{archive}.zip"));
    Python::attach(|py| {
        let globals = PyDict::new(py);
        globals.set_item("target", target.to_string_lossy().into_owned())?;
        globals.set_item("members", members.to_vec())?;
        py.run(
            c"import zipfile\nwith zipfile.ZipFile(target, 'w') as archive:\n    for member, source in members:\n        archive.writestr(member, source)\n",
            Some(&globals),
            None,
        )
    })
    .unwrap();
}

/// Write `<module>.zip` holding `<module>.py`
fn write_plugin(dir: &Path, module: &str, source: &str) {
    let member = format!("{module}.py");
    write_archive(dir, module, &[(member.as_str(), source)]);
}

fn boot(home: &Path, io: Arc<BufferIo>) -> Result<Launch, BootstrapError> {
    let context = BootstrapContext::new();
    Bootstrap::new(&context)
        .with_module(ShellModule::new(Branding::harbor(), io, Arc::new(SessionVariables::new())))
        .with_module(CoreModule)
        .with_module(CommandsModule)
        .run(&ShellConfig::default().with_home(home))
}

#[test]
fn empty_environment_contributes_no_commands() {
    let environment = Arc::new(build_layered_environment(ExecutionEnvironment::root(), Vec::new()).unwrap());
    assert!(plugin_modules(&environment).is_empty());
    assert!(PythonPlugins::new(environment).commands().unwrap().is_empty());
}

#[test]
fn archives_export_their_commands() {
    let home = TempDir::new().unwrap();
    write_plugin(home.path(), "greeter_listing", GREETER);
    write_plugin(home.path(), "helpers_listing", HELPERS);

    let environment = Arc::new(build_layered_environment(ExecutionEnvironment::root(), scan(home.path())).unwrap());
    let mut names: Vec<String> = PythonPlugins::new(environment)
        .commands()
        .unwrap()
        .iter()
        .map(|command| format!("{}: {}", command.name(), command.description()))
        .collect();
    names.sort();

    assert_eq!(names, vec!["hello: Say hello", "quiet: "]);
}

#[test]
fn plugin_commands_run_inside_the_shell() {
    let home = TempDir::new().unwrap();
    write_plugin(&home.path().join("ext"), "greeter_session", GREETER);

    let io = Arc::new(BufferIo::new(Verbosity::Normal));
    let launch = boot(home.path(), io.clone()).unwrap();

    let shell = Arc::clone(launch.shell());
    assert!(shell.commands().get("hello").is_some());
    assert!(shell.commands().get("echo").is_some());

    assert_eq!(shell.execute("hello one two").unwrap(), 2);
    assert_eq!(io.output(), "hello one two\n");
    assert_eq!(shell.execute("quiet").unwrap(), 0);
    assert_eq!(launch.hand_off(&mut OneShot::new("hello")).unwrap(), 0);
    assert_eq!(io.output(), "hello one two\nhello\n");

    // Printed output goes through the shell's channel, so quiet mode mutes it
    let muted = TempDir::new().unwrap();
    write_plugin(muted.path(), "greeter_muted", GREETER);
    let io = Arc::new(BufferIo::new(Verbosity::Quiet));
    let launch = boot(muted.path(), io.clone()).unwrap();

    assert_eq!(launch.shell().execute("hello there").unwrap(), 1);
    assert_eq!(io.output(), "");
    assert_eq!(io.errors(), "");
}

const USES_SHARED: &str = r#"
import shared_util

def greeting(args):
    return shared_util.CODE

COMMANDS = {"greeting": greeting}
"#;

#[test]
fn library_archives_are_importable_but_export_nothing() {
    let home = TempDir::new().unwrap();
    write_archive(home.path(), "shared_util-1.0", &[("shared_util.py", "CODE = 5\n")]);
    write_archive(home.path(), "tools_bundle", &[("bundled_tool.py", "")]);
    write_plugin(&home.path().join("ext"), "uses_shared", USES_SHARED);

    let launch = boot(home.path(), Arc::new(BufferIo::default())).unwrap();

    let mut modules = plugin_modules(launch.environment());
    modules.sort();
    assert_eq!(modules, vec!["tools_bundle", "uses_shared"]);
    assert_eq!(launch.shell().execute("greeting").unwrap(), 5);
    assert!(launch.shell().commands().get("tools_bundle").is_none());
}

#[test]
fn plugin_with_a_missing_dependency_stops_bootstrap() {
    let home = TempDir::new().unwrap();
    write_plugin(home.path(), "needs_absent", "import absent_dependency_xyz\nCOMMANDS = {}\n");

    let context = BootstrapContext::new();
    let mut bootstrap = Bootstrap::new(&context)
        .with_module(ShellModule::new(
            Branding::harbor(),
            Arc::new(BufferIo::default()),
            Arc::new(SessionVariables::new()),
        ))
        .with_module(CoreModule)
        .with_module(CommandsModule);
    let err = bootstrap
        .run(&ShellConfig::default().with_home(home.path()))
        .err()
        .unwrap();

    assert_eq!(bootstrap.state(), BootState::Failed);
    assert!(matches!(err.kind, BootstrapErrorKind::Registration(_)));
    let report = format!("{:#}", anyhow::Error::new(err));
    assert!(report.contains("needs_absent"), "{report}");
}

#[test]
fn activated_layer_shadows_archives_already_on_the_path() {
    let base = TempDir::new().unwrap();
    let upper = TempDir::new().unwrap();
    write_plugin(base.path(), "shadowed_settings", "VALUE = 'base'\n");
    write_plugin(upper.path(), "shadowed_settings", "VALUE = 'layer'\n");

    let environment = build_layered_environment(ExecutionEnvironment::root(), scan(upper.path())).unwrap();
    let base_entry = base.path().join("shadowed_settings.zip").to_string_lossy().into_owned();

    Python::attach(|py| -> PyResult<()> {
        let sys_path = py.import("sys")?.getattr("path")?;
        sys_path.call_method1("append", (base_entry.as_str(),))?;

        assert_eq!(activate_environment(py, &environment)?, 1);

        let value: String = py.import("shadowed_settings")?.getattr("VALUE")?.extract()?;
        assert_eq!(value, "layer");
        Ok(())
    })
    .unwrap();
}
