use reedline::{
    Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal,
};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use signal_hook::SigId;
use signal_hook::consts::SIGTERM;
use tracing::{debug, info};

use crate::bootstrap::RunLoop;
use crate::shell::{PromptRenderer, Shell};

/// Prompt texts captured from the shell's renderer before each read
#[derive(Default)]
struct ShellPromptAdapter {
    left: String,
    right: String,
    is_continuation: bool,
}

impl ShellPromptAdapter {
    fn refresh(&mut self, renderer: &dyn PromptRenderer, is_continuation: bool) {
        self.is_continuation = is_continuation;
        self.left = if is_continuation {
            renderer.render_continuation()
        } else {
            renderer.render()
        };
        self.right = renderer.render_right();
    }
}

impl Prompt for ShellPromptAdapter {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        // Reset so earlier command output can't leave the prompt colored
        Cow::Owned(format!("\x1b[0m{}", self.left))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        if self.is_continuation {
            return Cow::Borrowed("");
        }
        Cow::Owned(format!("\x1b[0m{}", self.right))
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse search) ", prefix))
    }
}

/// A line ending in an unescaped backslash continues on the next one
fn continues(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

/// SIGTERM handling for an interactive session
///
/// Waiting at the prompt, SIGTERM terminates the process as if unhandled.
/// While a line runs it only sets a flag, and the session ends after the line.
struct Termination {
    requested: Arc<AtomicBool>,
    at_prompt: Arc<AtomicBool>,
    handlers: Vec<SigId>,
}

impl Termination {
    fn install() -> anyhow::Result<Self> {
        let requested = Arc::new(AtomicBool::new(false));
        let at_prompt = Arc::new(AtomicBool::new(false));
        let handlers = vec![
            signal_hook::flag::register_conditional_default(SIGTERM, Arc::clone(&at_prompt))
                .context("could not install the SIGTERM handler")?,
            signal_hook::flag::register(SIGTERM, Arc::clone(&requested))
                .context("could not install the SIGTERM handler")?,
        ];
        Ok(Self {
            requested,
            at_prompt,
            handlers,
        })
    }

    fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn set_at_prompt(&self, waiting: bool) {
        self.at_prompt.store(waiting, Ordering::SeqCst);
    }
}

impl Drop for Termination {
    fn drop(&mut self) {
        for id in self.handlers.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Interactive read-eval loop
pub struct Repl {
    termination: Termination,
}

impl Repl {
    /// Create the loop and install its SIGTERM handling
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            termination: Termination::install()?,
        })
    }
}

impl RunLoop for Repl {
    fn run(&mut self, shell: &Shell) -> anyhow::Result<i32> {
        let mut line_editor = Reedline::create();
        let mut buffer = String::new();
        let mut prompt = ShellPromptAdapter::default();

        shell.io().write_line(&shell.branding().welcome_message())?;
        shell.io().write_line("")?;

        loop {
            if self.termination.requested() {
                info!("received SIGTERM, leaving the session");
                return Ok(shell.exit_requested().unwrap_or(0));
            }

            prompt.refresh(shell.prompt(), !buffer.is_empty());
            self.termination.set_at_prompt(true);
            let sig = line_editor.read_line(&prompt);
            self.termination.set_at_prompt(false);

            match sig {
                Ok(Signal::Success(line)) => {
                    if continues(&line) {
                        buffer.push_str(&line[..line.len() - 1]);
                        buffer.push(' ');
                        continue;
                    }
                    buffer.push_str(&line);

                    if !buffer.trim().is_empty() {
                        let keep_going = shell.run_line(&buffer);
                        if let Some(code) = shell.exit_requested() {
                            debug!(code, "exit requested");
                            return Ok(code);
                        }
                        if !keep_going {
                            return Ok(shell.last_status());
                        }
                    }
                    buffer.clear();
                }
                Ok(Signal::CtrlC) => {
                    shell.io().write_line("^C")?;
                    buffer.clear();
                    continue;
                }
                Ok(Signal::CtrlD) => {
                    shell.io().write_line(&shell.branding().goodbye_message())?;
                    return Ok(0);
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err).context("could not read input"));
                }
            }
        }
    }
}

/// Runs a single line and finishes with its status
pub struct OneShot {
    line: String,
}

impl OneShot {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

impl RunLoop for OneShot {
    fn run(&mut self, shell: &Shell) -> anyhow::Result<i32> {
        shell.run_line(&self.line);
        Ok(shell.exit_requested().unwrap_or_else(|| shell.last_status()))
    }
}
