/// Identity of the shell: names, version and the default texts it shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub prompt: String,
    pub continuation_prompt: String,
    /// Environment variable holding the shell's home directory
    pub home_variable: String,
}

impl Branding {
    pub fn harbor() -> Self {
        Self {
            name: "harbor".to_string(),
            display_name: "Harbor Shell".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            prompt: "harbor> ".to_string(),
            continuation_prompt: "....... ".to_string(),
            home_variable: "HARBOR_HOME".to_string(),
        }
    }

    pub fn welcome_message(&self) -> String {
        format!(
            "{} {}\nType 'help' for the available commands, 'exit' or Ctrl+D to quit",
            self.display_name, self.version
        )
    }

    pub fn goodbye_message(&self) -> String {
        "Exiting...".to_string()
    }
}

impl Default for Branding {
    fn default() -> Self {
        Self::harbor()
    }
}
