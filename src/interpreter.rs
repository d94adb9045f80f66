use crate::command::{EXIT_USAGE, ExitCode, Outcome};
use crate::config::Config;
use crate::env::Environment;
use crate::error::ParseError;
use crate::executor::PipelineExecutor;
use crate::io_adapters::{InheritedStreams, SessionStreams};
use crate::parser::{self, CommandDescriptor};
use crate::resolver::Resolver;
use std::io::{self, Write};

const PROMPT: &str = "$ ";

/// A line-oriented shell session.
///
/// The interpreter owns the session [`Environment`]: variables set on one line
/// are visible to every later line. Each line is parsed into descriptors and
/// handed to a [`PipelineExecutor`].
///
/// Example
/// ```
/// use shell_pipeline::io_adapters::CapturedStreams;
/// use shell_pipeline::{Config, Interpreter};
///
/// let streams = CapturedStreams::new("");
/// let mut sh = Interpreter::with_streams(Config::default(), Box::new(streams.clone()));
/// let outcome = sh.run_line("echo hello | exit");
/// assert_eq!(outcome.code, 0);
/// assert!(outcome.should_exit);
/// ```
pub struct Interpreter {
    env: Environment,
    config: Config,
    resolver: Resolver,
    streams: Box<dyn SessionStreams>,
}

impl Interpreter {
    /// A session on the process standard input and output.
    pub fn new(config: Config) -> Self {
        Self::with_streams(config, Box::new(InheritedStreams))
    }

    /// A session whose pipelines read from and write to `streams` by default.
    pub fn with_streams(config: Config, streams: Box<dyn SessionStreams>) -> Self {
        let env = if config.inherit_env {
            Environment::new()
        } else {
            Environment::empty()
        };
        Self {
            env,
            config,
            resolver: Resolver::default(),
            streams,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Parses a line using the session's strictness.
    pub fn parse(&self, line: &str) -> Result<Vec<CommandDescriptor>, ParseError> {
        parser::parse_line(line, self.config.strict)
    }

    /// Parses and runs one line.
    ///
    /// A line rejected by the parser runs nothing and reports [`EXIT_USAGE`].
    pub fn run_line(&mut self, line: &str) -> Outcome {
        let descriptors = match self.parse(line) {
            Ok(descriptors) => descriptors,
            Err(err) => {
                eprintln!("parse error: {}", err);
                self.env.last_status = EXIT_USAGE;
                return Outcome::code(EXIT_USAGE);
            }
        };
        let executor = PipelineExecutor::new(
            &self.resolver,
            self.streams.as_ref(),
            self.config.unset_policy,
        );
        executor.execute(descriptors, &mut self.env)
    }

    /// Read-Eval-Print Loop.
    ///
    /// Prints a prompt, reads a line with `read_line` and runs it, until a line
    /// ends the session or `read_line` reports end of input. Returns the status
    /// the session ended with.
    pub fn repl(
        &mut self,
        mut read_line: impl FnMut(&mut String) -> io::Result<usize>,
        prompt: &mut dyn Write,
    ) -> ExitCode {
        let mut line = String::new();
        loop {
            let _ = write!(prompt, "{}", PROMPT).and_then(|()| prompt.flush());

            line.clear();
            match read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "cannot read input");
                    break;
                }
            }

            let outcome = self.run_line(line.trim_end_matches(['\n', '\r']));
            if outcome.should_exit {
                return outcome.code;
            }
        }
        self.env.last_status
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
