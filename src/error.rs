//! Error taxonomy of the interpreter.
//!
//! Parse errors abort a whole line, setup errors abort one pipeline, and
//! resolution errors only fail the offending stage. Runtime failures of a builtin
//! are plain [`anyhow::Error`]s and also stay local to their stage.

use std::io;
use thiserror::Error;

/// A line rejected in strict mode.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseError {
    /// A quote was opened and never closed.
    #[error("unterminated quote `{0}`")]
    UnterminatedQuote(char),
    /// A redirection operator with no file name after it.
    #[error("redirection `{0}` is missing a file name")]
    DanglingRedirect(&'static str),
}

/// Failure to turn a descriptor into a runnable unit. Reported as exit code 127.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Neither a builtin nor an executable that can be found.
    #[error("{0}: command not found")]
    NotFound(String),
    /// A builtin rejected its arguments.
    #[error("{name}: {message}")]
    InvalidArguments { name: String, message: String },
    /// The executable exists but could not be started.
    #[error("{name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// The stream topology of a pipeline could not be built.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{path}: cannot open for reading: {source}")]
    OpenInput {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}: cannot open for writing: {source}")]
    OpenOutput {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("cannot start stage `{name}`: {source}")]
    Thread {
        name: String,
        #[source]
        source: io::Error,
    },
}
