use std::sync::Arc;

use super::branding::Branding;
use super::variables::{EnvValue, LAST_EXIT, PROMPT, VariableStore};

/// Produces the texts shown before each input line
pub trait PromptRenderer {
    fn render(&self) -> String;
    /// Shown while a line continues onto the next one
    fn render_continuation(&self) -> String;
    fn render_right(&self) -> String;
}

/// Prompt taken from the `shell.prompt` variable, falling back to the branding
pub struct ShellPrompt {
    branding: Arc<Branding>,
    variables: Arc<dyn VariableStore>,
}

impl ShellPrompt {
    pub fn new(branding: Arc<Branding>, variables: Arc<dyn VariableStore>) -> Self {
        Self {
            branding,
            variables,
        }
    }
}

impl PromptRenderer for ShellPrompt {
    fn render(&self) -> String {
        match self.variables.get(PROMPT) {
            Some(EnvValue::None) | None => self.branding.prompt.clone(),
            Some(value) => value.to_string(),
        }
    }

    fn render_continuation(&self) -> String {
        self.branding.continuation_prompt.clone()
    }

    fn render_right(&self) -> String {
        // Only a failing status is worth the space
        match self.variables.get(LAST_EXIT) {
            Some(EnvValue::Integer(code)) if code != 0 => format!("[{code}]"),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::variables::SessionVariables;

    #[test]
    fn variable_overrides_branded_prompt() {
        let variables = Arc::new(SessionVariables::new());
        let prompt = ShellPrompt::new(Arc::new(Branding::harbor()), variables.clone());
        assert_eq!(prompt.render(), "harbor> ");

        variables.set(PROMPT, EnvValue::String("dock$ ".to_string()));
        assert_eq!(prompt.render(), "dock$ ");
    }

    #[test]
    fn right_prompt_shows_failing_status() {
        let variables = Arc::new(SessionVariables::new());
        let prompt = ShellPrompt::new(Arc::new(Branding::harbor()), variables.clone());

        variables.set(LAST_EXIT, EnvValue::Integer(0));
        assert_eq!(prompt.render_right(), "");

        variables.set(LAST_EXIT, EnvValue::Integer(127));
        assert_eq!(prompt.render_right(), "[127]");
    }
}
