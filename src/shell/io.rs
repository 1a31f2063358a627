use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// How much the shell says on its output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Only errors
    Quiet,
    #[default]
    Normal,
    /// Errors include their full cause chain
    Debug,
}

/// Output and error streams of one shell session
pub trait IoChannel {
    /// Write one line to the output stream; dropped when quiet
    fn write_line(&self, line: &str) -> io::Result<()>;
    /// Write one line to the error stream
    fn write_error_line(&self, line: &str) -> io::Result<()>;
    fn verbosity(&self) -> Verbosity;
}

/// The process's stdout and stderr
#[derive(Debug, Default)]
pub struct StreamIo {
    verbosity: Verbosity,
}

impl StreamIo {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

impl IoChannel for StreamIo {
    fn write_line(&self, line: &str) -> io::Result<()> {
        if self.verbosity == Verbosity::Quiet {
            return Ok(());
        }
        let mut out = io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()
    }

    fn write_error_line(&self, line: &str) -> io::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{line}")
    }

    fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}

/// Collects everything written, for embedding and tests
#[derive(Debug, Default)]
pub struct BufferIo {
    verbosity: Verbosity,
    out: Mutex<String>,
    err: Mutex<String>,
}

impl BufferIo {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            ..Self::default()
        }
    }

    pub fn output(&self) -> String {
        self.out.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn errors(&self) -> String {
        self.err.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl IoChannel for BufferIo {
    fn write_line(&self, line: &str) -> io::Result<()> {
        if self.verbosity != Verbosity::Quiet {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            out.push_str(line);
            out.push('\n');
        }
        Ok(())
    }

    fn write_error_line(&self, line: &str) -> io::Result<()> {
        let mut err = self.err.lock().unwrap_or_else(PoisonError::into_inner);
        err.push_str(line);
        err.push('\n');
        Ok(())
    }

    fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}
