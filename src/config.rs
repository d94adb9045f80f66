//! Session configuration.

/// What substitution does with `$NAME` when `NAME` is not in the environment.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UnsetPolicy {
    /// Leave `$NAME` / `${NAME}` in the argument exactly as written.
    #[default]
    Keep,
    /// Replace the reference with an empty string.
    Empty,
}

/// Knobs of one interpreter session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Reject unterminated quotes and redirections without a file name
    /// instead of accepting a best-effort reading of the line.
    pub strict: bool,
    /// Treatment of unset variables during substitution.
    pub unset_policy: UnsetPolicy,
    /// Seed the environment store from the host process environment.
    pub inherit_env: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict: false,
            unset_policy: UnsetPolicy::Keep,
            inherit_env: true,
        }
    }
}
