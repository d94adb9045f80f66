//! Maps a descriptor to something runnable.
//!
//! Builtins are tried first, in a fixed order; any other name is looked up as an
//! external executable.

use crate::builtin::{BuiltinCommand, Cat, Echo, Exit, Grep, HelpText, Pwd, Wc};
use crate::command::{CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::error::ResolveError;
use crate::external::ExternalCommand;
use crate::parser::CommandDescriptor;
use argh::EarlyExit;
use std::marker::PhantomData;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: a [`BuiltinCommand`] or
/// [`ExternalCommand`].
pub(crate) struct Factory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Result<Box<dyn ExecutableCommand>, ResolveError>> {
        if name != T::name() {
            return None;
        }
        let created: Box<dyn ExecutableCommand> = match T::from_args(&[name], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit {
                output,
                status: Ok(()),
            }) => Box::new(HelpText { output }),
            Err(EarlyExit {
                output,
                status: Err(()),
            }) => {
                return Some(Err(ResolveError::InvalidArguments {
                    name: name.to_string(),
                    message: output.trim_end().to_string(),
                }));
            }
        };
        Some(Ok(created))
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Result<Box<dyn ExecutableCommand>, ResolveError>> {
        let cmd = match ExternalCommand::locate(env, name, args) {
            Some(cmd) => Ok(Box::new(cmd) as Box<dyn ExecutableCommand>),
            None => Err(ResolveError::NotFound(name.to_string())),
        };
        Some(cmd)
    }
}

/// The closed set of commands a session can run.
pub struct Resolver {
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Resolver {
    /// Creates the runnable unit for an invocation.
    ///
    /// The descriptor must already be substituted. Assignments are not commands
    /// and resolve to [`ResolveError::NotFound`].
    pub fn resolve(
        &self,
        descriptor: &CommandDescriptor,
        env: &Environment,
    ) -> Result<Box<dyn ExecutableCommand>, ResolveError> {
        let Some(name) = descriptor.command_name() else {
            return Err(ResolveError::NotFound(String::new()));
        };
        let args: Vec<&str> = descriptor.arguments[1..]
            .iter()
            .map(String::as_str)
            .collect();
        for factory in &self.commands {
            if let Some(created) = factory.try_create(env, name, &args) {
                tracing::trace!(name, ok = created.is_ok(), "resolved");
                return created;
            }
        }
        Err(ResolveError::NotFound(name.to_string()))
    }
}

impl Default for Resolver {
    /// The builtins `cat`, `echo`, `wc`, `grep`, `pwd` and `exit`, then the
    /// external command launcher.
    fn default() -> Self {
        Self {
            commands: vec![
                Box::new(Factory::<Cat>::default()),
                Box::new(Factory::<Echo>::default()),
                Box::new(Factory::<Wc>::default()),
                Box::new(Factory::<Grep>::default()),
                Box::new(Factory::<Pwd>::default()),
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<ExternalCommand>::default()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::{MemReader, MemWriter};
    use crate::parser::parse_line;
    use assert_matches::assert_matches;

    fn descriptor(line: &str) -> CommandDescriptor {
        parse_line(line, false).unwrap().remove(0)
    }

    fn env_with_path() -> Environment {
        let mut env = Environment::empty();
        env.set_var("PATH", "/usr/bin:/bin");
        env
    }

    #[test]
    fn test_builtins_take_precedence_over_path() {
        let resolver = Resolver::default();
        let cmd = resolver
            .resolve(&descriptor("echo hi"), &env_with_path())
            .unwrap();
        let (writer, handle) = MemWriter::with_handle();
        let outcome = cmd
            .execute(Box::new(MemReader::new("")), Box::new(writer), &env_with_path())
            .unwrap();
        assert_eq!(outcome.code, 0);
        assert_eq!(handle.lock().unwrap().as_slice(), b"hi\n");
    }

    #[test]
    fn test_exit_terminates_session() {
        let resolver = Resolver::default();
        let cmd = resolver.resolve(&descriptor("exit"), &Environment::empty()).unwrap();
        assert!(cmd.terminates_session());
        let cmd = resolver.resolve(&descriptor("pwd"), &Environment::empty()).unwrap();
        assert!(!cmd.terminates_session());
    }

    #[test]
    fn test_unknown_command_is_not_found() {
        let resolver = Resolver::default();
        let err = resolver
            .resolve(&descriptor("nonexistentcommand arg"), &env_with_path())
            .err()
            .unwrap();
        assert_matches!(&err, ResolveError::NotFound(name) if name == "nonexistentcommand");
        assert_eq!(err.to_string(), "nonexistentcommand: command not found");
    }

    #[test]
    fn test_external_lookup_uses_store_path() {
        let resolver = Resolver::default();
        assert!(resolver.resolve(&descriptor("sh -c true"), &env_with_path()).is_ok());
        assert_matches!(
            resolver
                .resolve(&descriptor("sh -c true"), &Environment::empty())
                .err(),
            Some(ResolveError::NotFound(_))
        );
    }

    #[test]
    fn test_invalid_builtin_arguments() {
        let resolver = Resolver::default();
        let env = Environment::empty();
        assert_matches!(
            resolver.resolve(&descriptor("pwd extra"), &env).err(),
            Some(ResolveError::InvalidArguments { name, .. }) if name == "pwd"
        );
        assert_matches!(
            resolver.resolve(&descriptor("grep"), &env).err(),
            Some(ResolveError::InvalidArguments { .. })
        );
    }

    #[test]
    fn test_help_prints_usage() {
        let resolver = Resolver::default();
        let env = Environment::empty();
        let cmd = resolver.resolve(&descriptor("wc --help"), &env).unwrap();
        let (writer, handle) = MemWriter::with_handle();
        let outcome = cmd
            .execute(Box::new(MemReader::new("")), Box::new(writer), &env)
            .unwrap();
        assert_eq!(outcome.code, 0);
        let out = String::from_utf8(handle.lock().unwrap().clone()).unwrap();
        assert!(out.starts_with("Usage: wc"));
    }

    #[test]
    fn test_assignment_does_not_resolve() {
        let resolver = Resolver::default();
        assert!(resolver
            .resolve(&descriptor("A=1"), &Environment::empty())
            .is_err());
    }
}
