//! A line-oriented command interpreter.
//!
//! A line of text goes through three steps:
//!
//! 1. [`lexer`] splits it into quote-aware tokens,
//! 2. [`parser`] turns the tokens into an ordered list of
//!    [`CommandDescriptor`](parser::CommandDescriptor)s (one per pipeline stage or
//!    variable assignment),
//! 3. [`executor`] wires the descriptors together with files and OS pipes and
//!    runs every stage of a pipeline concurrently.
//!
//! [`Interpreter`] bundles the steps with a session [`Environment`](env::Environment)
//! and is what the binary drives.
//!
//! ```
//! use shell_pipeline::io_adapters::CapturedStreams;
//! use shell_pipeline::{Config, Interpreter};
//!
//! let streams = CapturedStreams::new("");
//! let mut sh = Interpreter::with_streams(Config::default(), Box::new(streams.clone()));
//! sh.run_line("GREETING=hello");
//! let outcome = sh.run_line("echo \"$GREETING world\" | wc");
//! assert_eq!(outcome.code, 0);
//! assert_eq!(streams.captured(), "1 2 12\n");
//! ```

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod substitution;

pub use config::{Config, UnsetPolicy};
pub use interpreter::Interpreter;
