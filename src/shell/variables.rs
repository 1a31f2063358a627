use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use nix::unistd::{getcwd, getpid, getppid};

/// Exit status of the most recent command
pub const LAST_EXIT: &str = "?";
/// Show the full cause chain when a command fails
pub const SHOW_ERROR_CHAIN: &str = "shell.errors.chain";
/// Overrides the branded prompt
pub const PROMPT: &str = "shell.prompt";

/// A value stored in the session's variables
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Bool(bool),
    None,
    List(Vec<EnvValue>),
    FilePath(PathBuf),
}

impl EnvValue {
    /// Parse an inherited string, picking the most specific type
    pub fn parse(s: &str) -> EnvValue {
        if s.is_empty() {
            return EnvValue::None;
        }

        match s {
            "True" | "true" => return EnvValue::Bool(true),
            "False" | "false" => return EnvValue::Bool(false),
            _ => {}
        }

        if !s.contains('.')
            && let Ok(i) = s.parse::<i64>()
        {
            return EnvValue::Integer(i);
        }

        if s.contains('.')
            && let Ok(f) = s.parse::<f64>()
        {
            return EnvValue::Decimal(f);
        }

        // Before the path check so PATH=/usr/bin:/bin becomes a list of paths
        if s.contains(':') {
            return EnvValue::List(s.split(':').map(EnvValue::parse).collect());
        }

        if s.starts_with('/')
            || (s.starts_with('~') && s.contains('/'))
            || s.starts_with("./")
            || s.starts_with("../")
        {
            return EnvValue::FilePath(PathBuf::from(s));
        }

        EnvValue::String(s.to_string())
    }

    /// Truthiness used for flag variables
    pub fn is_true(&self) -> bool {
        match self {
            EnvValue::Bool(b) => *b,
            EnvValue::Integer(i) => *i != 0,
            EnvValue::String(s) => s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("on"),
            _ => false,
        }
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::String(s) => write!(f, "{s}"),
            EnvValue::Integer(i) => write!(f, "{i}"),
            EnvValue::Decimal(d) => write!(f, "{d}"),
            EnvValue::Bool(true) => write!(f, "True"),
            EnvValue::Bool(false) => write!(f, "False"),
            EnvValue::None => Ok(()),
            EnvValue::List(items) => {
                let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", joined.join(":"))
            }
            EnvValue::FilePath(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Named variables of one shell session
pub trait VariableStore {
    fn get(&self, name: &str) -> Option<EnvValue>;
    fn set(&self, name: &str, value: EnvValue);
    fn unset(&self, name: &str) -> Option<EnvValue>;
    fn contains(&self, name: &str) -> bool;
    /// Variable names, sorted
    fn names(&self) -> Vec<String>;

    fn is_true(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| value.is_true())
    }
}

/// In-memory variable store
#[derive(Debug, Default)]
pub struct SessionVariables {
    vars: RwLock<HashMap<String, EnvValue>>,
}

impl SessionVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the parent process environment
    pub fn from_parent() -> Self {
        Self::from_pairs(std::env::vars())
    }

    /// Seed from explicit `(name, raw value)` pairs, then fill in shell defaults
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut vars: HashMap<String, EnvValue> = pairs
            .into_iter()
            .map(|(key, value)| {
                let parsed = EnvValue::parse(&value);
                (key, parsed)
            })
            .collect();

        vars.insert("$".to_string(), EnvValue::Integer(getpid().as_raw().into()));
        vars.insert("PPID".to_string(), EnvValue::Integer(getppid().as_raw().into()));
        vars.insert(LAST_EXIT.to_string(), EnvValue::Integer(0));

        // HOME is either inherited, or looked up in the user database
        let home_dir = match home::home_dir() {
            Some(path) if !path.as_os_str().is_empty() => EnvValue::FilePath(path),
            _ => EnvValue::None,
        };
        if !vars.contains_key("HOME") {
            vars.insert("HOME".to_string(), home_dir.clone());
        }

        if !vars.contains_key("PWD") {
            let pwd = match getcwd() {
                Ok(path) => EnvValue::FilePath(path),
                Err(_) => home_dir,
            };
            vars.insert("PWD".to_string(), pwd);
        }

        let shlvl = match vars.get("SHLVL") {
            Some(EnvValue::Integer(level)) => level + 1,
            _ => 1,
        };
        vars.insert("SHLVL".to_string(), EnvValue::Integer(shlvl));

        Self {
            vars: RwLock::new(vars),
        }
    }
}

impl VariableStore for SessionVariables {
    fn get(&self, name: &str) -> Option<EnvValue> {
        let vars = self.vars.read().unwrap_or_else(PoisonError::into_inner);
        vars.get(name).cloned()
    }

    fn set(&self, name: &str, value: EnvValue) {
        let mut vars = self.vars.write().unwrap_or_else(PoisonError::into_inner);
        vars.insert(name.to_string(), value);
    }

    fn unset(&self, name: &str) -> Option<EnvValue> {
        let mut vars = self.vars.write().unwrap_or_else(PoisonError::into_inner);
        vars.remove(name)
    }

    fn contains(&self, name: &str) -> bool {
        let vars = self.vars.read().unwrap_or_else(PoisonError::into_inner);
        vars.contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let vars = self.vars.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = vars.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherited_values_are_typed() {
        assert_eq!(EnvValue::parse(""), EnvValue::None);
        assert_eq!(EnvValue::parse("True"), EnvValue::Bool(true));
        assert_eq!(EnvValue::parse("42"), EnvValue::Integer(42));
        assert_eq!(EnvValue::parse("1.5"), EnvValue::Decimal(1.5));
        assert_eq!(EnvValue::parse("/opt/harbor"), EnvValue::FilePath(PathBuf::from("/opt/harbor")));
        assert_eq!(EnvValue::parse("1.2.3"), EnvValue::String("1.2.3".to_string()));
        assert_eq!(
            EnvValue::parse("/usr/bin:/bin"),
            EnvValue::List(vec![
                EnvValue::FilePath(PathBuf::from("/usr/bin")),
                EnvValue::FilePath(PathBuf::from("/bin")),
            ])
        );
    }

    #[test]
    fn display_round_trips_lists() {
        let path = EnvValue::parse("/usr/bin:/bin");
        assert_eq!(path.to_string(), "/usr/bin:/bin");
        assert_eq!(EnvValue::Bool(false).to_string(), "False");
        assert_eq!(EnvValue::None.to_string(), "");
    }

    #[test]
    fn seeded_store_has_shell_defaults() {
        let vars = SessionVariables::from_pairs(vec![
            ("SHLVL".to_string(), "2".to_string()),
            ("EDITOR".to_string(), "vi".to_string()),
        ]);

        assert_eq!(vars.get("SHLVL"), Some(EnvValue::Integer(3)));
        assert_eq!(vars.get("EDITOR"), Some(EnvValue::String("vi".to_string())));
        assert_eq!(vars.get(LAST_EXIT), Some(EnvValue::Integer(0)));
        assert!(vars.contains("$"));
        assert!(vars.contains("PWD"));
    }

    #[test]
    fn set_unset_and_flags() {
        let vars = SessionVariables::new();
        assert!(!vars.is_true(SHOW_ERROR_CHAIN));

        vars.set(SHOW_ERROR_CHAIN, EnvValue::parse("true"));
        assert!(vars.is_true(SHOW_ERROR_CHAIN));

        vars.set("b", EnvValue::Integer(1));
        assert_eq!(vars.names(), vec!["b".to_string(), SHOW_ERROR_CHAIN.to_string()]);

        assert_eq!(vars.unset("b"), Some(EnvValue::Integer(1)));
        assert!(!vars.contains("b"));
    }
}
