use crate::env::Environment;
use crate::error::ResolveError;
use anyhow::Result;
use std::io::{Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Generic failure: I/O error, no match for `grep`, invalid pattern.
pub const EXIT_FAILURE: ExitCode = 1;

/// A line that could not be parsed in strict mode.
pub const EXIT_USAGE: ExitCode = 2;

/// The command could not be resolved into something runnable.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// What running a stage (or a whole line) produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Outcome {
    pub code: ExitCode,
    /// The session should end after this.
    pub should_exit: bool,
}

impl Outcome {
    pub fn code(code: ExitCode) -> Self {
        Self {
            code,
            should_exit: false,
        }
    }

    pub fn terminate(code: ExitCode) -> Self {
        Self {
            code,
            should_exit: true,
        }
    }
}

/// Abstraction over a readable input stream that can also be handed to a spawned
/// process.
///
/// OS-backed streams (files, pipes, the inherited stdin) convert into a [`Stdio`].
/// Streams that live in memory hand themselves back so the caller can relay the
/// bytes through a pipe instead.
pub trait Stdin: Read + Send {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> std::result::Result<Stdio, Box<dyn Read + Send>>;
}

/// Abstraction over a writable output stream that can also be handed to a spawned
/// process. See [`Stdin`].
pub trait Stdout: Write + Send {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> std::result::Result<Stdio, Box<dyn Write + Send>>;
}

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
/// Units are `Send` because every pipeline stage runs on its own thread.
pub trait ExecutableCommand: Send {
    /// Executes the command against its resolved streams and an environment snapshot.
    ///
    /// An `Err` is an execution failure of this stage only.
    fn execute(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        env: &Environment,
    ) -> Result<Outcome>;

    /// Whether running this unit ends the session (`exit`).
    fn terminates_session(&self) -> bool {
        false
    }
}

/// Creates a runnable unit for a command name, if the name belongs to it.
///
/// `None` means "not mine": the next factory is asked. `Some(Err(_))` means the
/// name was recognized but the unit cannot be built from these arguments.
pub trait CommandFactory: Send + Sync {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Result<Box<dyn ExecutableCommand>, ResolveError>>;
}
