//! Harbor: an extensible command shell
//!
//! Startup scans the shell's home for plugin archives, layers them into an
//! execution environment, composes the shell from typed bindings, registers its
//! commands and hands it to a run loop.

pub mod artifact;
pub mod bootstrap;
pub mod command;
pub mod environment;
pub mod inject;
pub mod logging;
pub mod py_bindings;
pub mod repl;
pub mod shell;
