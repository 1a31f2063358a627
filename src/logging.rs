//! Process logging
//!
//! `init_logging` installs one tracing subscriber for the process. Its filter sits
//! behind a reload layer so the shell's `LoggingSink` can change levels later.

use std::sync::{Mutex, OnceLock, PoisonError};

use anyhow::{Context, anyhow};
use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

static LOGGING_STATE: OnceLock<LoggingState> = OnceLock::new();

struct LoggingState {
    handle: reload::Handle<EnvFilter, Registry>,
    directives: Mutex<String>,
}

/// Install the process subscriber. `RUST_LOG` wins over `default_directives`.
///
/// Calling it again after a successful install does nothing.
pub fn init_logging(default_directives: &str) -> anyhow::Result<()> {
    if LOGGING_STATE.get().is_some() {
        return Ok(());
    }

    let (filter, directives) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let directives = filter.to_string();
            (filter, directives)
        }
        Err(_) => (
            EnvFilter::try_new(default_directives)
                .with_context(|| format!("invalid log directives `{default_directives}`"))?,
            default_directives.to_string(),
        ),
    };

    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .try_init()
        .context("failed to install the log subscriber")?;

    let _ = LOGGING_STATE.set(LoggingState {
        handle,
        directives: Mutex::new(directives),
    });
    Ok(())
}

/// Controls the shell's log output
pub trait LoggingSink {
    /// Active filter directives, `off` when logging was never installed
    fn level(&self) -> String;
    /// Replace the filter, e.g. `debug` or `harbor_shell=trace`
    fn set_level(&self, directives: &str) -> anyhow::Result<()>;
}

/// `LoggingSink` backed by the process tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLoggingSystem;

impl TracingLoggingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl LoggingSink for TracingLoggingSystem {
    fn level(&self) -> String {
        match LOGGING_STATE.get() {
            Some(state) => state
                .directives
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            None => "off".to_string(),
        }
    }

    fn set_level(&self, directives: &str) -> anyhow::Result<()> {
        let state = LOGGING_STATE
            .get()
            .ok_or_else(|| anyhow!("logging has not been initialized"))?;
        let filter = EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log directives `{directives}`"))?;

        state
            .handle
            .reload(filter)
            .context("failed to swap the log filter")?;
        *state.directives.lock().unwrap_or_else(PoisonError::into_inner) = directives.to_string();
        debug!(directives, "log level changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_can_be_changed_after_init() {
        init_logging("warn").unwrap();
        let sink = TracingLoggingSystem::new();

        sink.set_level("debug").unwrap();
        assert_eq!(sink.level(), "debug");

        assert!(sink.set_level("harbor_shell=loudest").is_err());
        assert_eq!(sink.level(), "debug");
    }
}
