use crate::command::ExitCode;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Session-wide state shared by every pipeline of an interpreter.
///
/// The environment contains:
/// - `vars`: the variable store read by substitution and handed to external commands.
/// - `current_dir`: the working directory for command execution and relative paths.
/// - `last_status`: the exit code of the most recently finished pipeline.
///
/// Stages of a running pipeline only ever see a clone taken when the stage was set up,
/// so the live value is mutated by assignments alone.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Exit code of the last pipeline; a bare `exit` reports it.
    pub last_status: ExitCode,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`.
    pub fn new() -> Self {
        let mut env = Self::empty();
        env.vars.extend(stdenv::vars());
        env
    }

    /// An environment with no variables, rooted at the process working directory.
    pub fn empty() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars: HashMap::new(),
            current_dir,
            last_status: 0,
        }
    }

    /// Get the value of a variable.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::empty();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");
        assert_eq!(env.get_var("KEY"), Some("VALUE"));

        env.set_var("KEY", "OTHER");
        assert_eq!(env.get_var("KEY"), Some("OTHER"));
        assert_eq!(env.vars.len(), 1);
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_empty_env_does_not_fall_back_to_process_env() {
        let env = Environment::empty();
        assert_eq!(env.get_var("PATH"), None);
        assert_eq!(env.last_status, 0);
    }

    #[test]
    fn test_clone_is_an_independent_snapshot() {
        let mut env = Environment::empty();
        env.set_var("A", "1");
        let snapshot = env.clone();
        env.set_var("A", "2");
        assert_eq!(snapshot.get_var("A"), Some("1"));
    }
}
