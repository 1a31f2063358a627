use std::sync::Arc;

use crossterm::style::Stylize;
use tracing::warn;

use super::io::{IoChannel, Verbosity};
use super::variables::{SHOW_ERROR_CHAIN, VariableStore};

/// Reports failed commands to the operator
pub trait ErrorHandler {
    /// Report `error`; returns whether the session should keep running
    fn handle_error(&self, error: &anyhow::Error) -> bool;
}

/// Writes failures to the session's error stream
pub struct ShellErrorHandler {
    io: Arc<dyn IoChannel>,
    variables: Arc<dyn VariableStore>,
}

impl ShellErrorHandler {
    pub fn new(io: Arc<dyn IoChannel>, variables: Arc<dyn VariableStore>) -> Self {
        Self { io, variables }
    }

    fn show_chain(&self) -> bool {
        self.io.verbosity() == Verbosity::Debug || self.variables.is_true(SHOW_ERROR_CHAIN)
    }
}

impl ErrorHandler for ShellErrorHandler {
    fn handle_error(&self, error: &anyhow::Error) -> bool {
        let tag = "ERROR".red().bold();
        let mut lines = vec![format!("{tag} {error}")];
        if self.show_chain() {
            lines.extend(error.chain().skip(1).map(|cause| format!("    caused by: {cause}")));
        }

        for line in &lines {
            if let Err(e) = self.io.write_error_line(line) {
                warn!(error = %e, "could not report command failure");
            }
        }
        true
    }
}
