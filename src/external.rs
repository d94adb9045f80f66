use crate::command::{ExecutableCommand, Outcome, Stdin, Stdout};
use crate::env::Environment;
use crate::error::ResolveError;
use anyhow::Result;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// Command that is not a builtin.
pub struct ExternalCommand {
    /// The name as typed, for diagnostics.
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(name: impl Into<String>, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program,
            args,
        }
    }

    /// Looks `name` up the way a shell would, with `PATH` taken from the session store.
    pub fn locate(env: &Environment, name: &str, args: &[&str]) -> Option<Self> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(
            OsStr::new(search_paths),
            Path::new(name),
            &env.current_dir,
        )?;
        Some(Self::new(
            name,
            program.into_owned(),
            args.iter().map(|x| x.to_string()).collect(),
        ))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        env: &Environment,
    ) -> Result<Outcome> {
        // Memory-backed streams cannot be inherited by the child and are relayed.
        let (stdin, mut input_relay) = match stdin.stdio() {
            Ok(stdio) => (stdio, None),
            Err(reader) => (Stdio::piped(), Some(reader)),
        };
        let (stdout, output_relay) = match stdout.stdio() {
            Ok(stdio) => (stdio, None),
            Err(writer) => (Stdio::piped(), Some(writer)),
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout)
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir)
            .spawn()
            .map_err(|source| ResolveError::Spawn {
                name: self.name.clone(),
                source,
            })?;
        tracing::debug!(program = %self.program.display(), pid = child.id(), "spawned");

        let feeder = match (input_relay.take(), child.stdin.take()) {
            (Some(mut reader), Some(mut child_stdin)) => Some(thread::spawn(move || {
                // The child may exit without reading everything.
                if let Err(e) = io::copy(&mut reader, &mut child_stdin) {
                    tracing::debug!(error = %e, "stdin relay stopped");
                }
            })),
            _ => None,
        };

        let relayed = match (output_relay, child.stdout.take()) {
            (Some(mut writer), Some(mut child_stdout)) => {
                relay_output(&mut child_stdout, &mut writer)
            }
            _ => Ok(()),
        };

        let exit_status = child.wait()?;
        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }
        relayed?;

        let code = match exit_status.code() {
            Some(x) => x,
            None => terminated_by_signal(exit_status),
        };
        Ok(Outcome::code(code))
    }
}

fn relay_output(from: &mut dyn Read, to: &mut dyn Write) -> io::Result<()> {
    io::copy(from, to)?;
    to.flush()
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is a file.
/// - Relative with multiple components (e.g., `bin/sh`) or `./`-prefixed: resolved
///   against `cwd`, the session working directory.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result had to be built.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    path: &'a Path,
    cwd: &Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => {
            // Empty path -> not found
            None
        }
        (Some(x), None) if !path.starts_with("./") => {
            // Single component -> search in PATH
            find_in_path(search_paths, x.as_os_str()).map(Cow::Owned)
        }
        _ => {
            // Separators -> relative to the session directory
            let joined = cwd.join(path);
            find_by_path(&joined).map(|p| Cow::Owned(p.to_path_buf()))
        }
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::{MemReader, MemWriter};
    use assert_matches::assert_matches;
    use std::fs::{self, File};

    #[cfg(unix)]
    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn run_sh(script: &str, env: &Environment, input: &str) -> (Outcome, String) {
        let cmd = Box::new(ExternalCommand::new(
            "sh",
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), script.to_string()],
        ));
        let (writer, handle) = MemWriter::with_handle();
        let outcome = cmd
            .execute(Box::new(MemReader::new(input)), Box::new(writer), env)
            .expect("sh runs");
        let out = String::from_utf8(handle.lock().unwrap().clone()).unwrap();
        (outcome, out)
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let res = find_command_path(osstr("/bin"), path, Path::new("/"));
        let found = res.expect("Expected to find /bin/sh via absolute path");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), path, Path::new("/"));
        assert!(
            res.is_none(),
            "Expected not to find /bin/nonexisting via absolute path"
        );
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let res = find_command_path(osstr("/nowhere:/bin"), Path::new("sh"), Path::new("/"));
        let found = res.expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"), Path::new("/"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    #[cfg(unix)]
    fn single_component_ignores_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("tool")).unwrap();
        let res = find_command_path(osstr("/nowhere"), Path::new("tool"), dir.path());
        assert!(res.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn multiple_components_relative_to_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).expect("create temp bin dir");
        File::create(dir.path().join("bin").join("sh")).expect("touch bin/sh");

        let res = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"), dir.path());
        let found = res.expect("Expected to find relative 'bin/sh' in session dir");
        assert_eq!(found.as_ref(), dir.path().join("bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn current_dir_with_dot_prefix() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("foo")).expect("touch foo");

        let res = find_command_path(osstr("/bin"), Path::new("./foo"), dir.path());
        let found = res.expect("Expected to find './foo' in session dir");
        assert!(found.as_ref().ends_with("foo"));
        assert!(found.as_ref().starts_with(dir.path()));
    }

    #[test]
    #[cfg(unix)]
    fn directories_are_not_commands() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let search = dir.path().as_os_str();
        assert!(find_command_path(search, Path::new("sub"), Path::new("/")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new(""), Path::new("/"));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    #[cfg(unix)]
    fn locate_uses_session_path() {
        let mut env = Environment::empty();
        assert!(ExternalCommand::locate(&env, "sh", &[]).is_none());
        env.set_var("PATH", "/bin");
        let cmd = ExternalCommand::locate(&env, "sh", &["-c", "true"]).expect("sh in /bin");
        assert_eq!(cmd.program, PathBuf::from("/bin/sh"));
        assert_eq!(cmd.args, ["-c", "true"]);
    }

    #[test]
    #[cfg(unix)]
    fn exit_code_is_passed_through() {
        let (outcome, _) = run_sh("exit 3", &Environment::empty(), "");
        assert_eq!(outcome, Outcome::code(3));
    }

    #[test]
    #[cfg(unix)]
    fn killed_child_reports_128_plus_signal() {
        let (outcome, _) = run_sh("kill -TERM $$", &Environment::empty(), "");
        assert_eq!(outcome.code, 128 + 15);
    }

    #[test]
    #[cfg(unix)]
    fn child_sees_only_the_session_environment() {
        let mut env = Environment::empty();
        env.set_var("FOO", "bar");
        let (_, out) = run_sh("printf '%s|%s' \"$FOO\" \"$HOME\"", &env, "");
        assert_eq!(out, "bar|");
    }

    #[test]
    #[cfg(unix)]
    fn child_runs_in_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::empty();
        env.current_dir = dir.path().canonicalize().unwrap();
        let (_, out) = run_sh("pwd -P", &env, "");
        assert_eq!(out.trim_end(), env.current_dir.to_string_lossy());
    }

    #[test]
    #[cfg(unix)]
    fn memory_streams_are_relayed() {
        let mut env = Environment::empty();
        env.set_var("PATH", std::env::var("PATH").unwrap_or_default());
        let (outcome, out) = run_sh("tr a-z A-Z", &env, "piped text\n");
        assert_eq!(outcome.code, 0);
        assert_eq!(out, "PIPED TEXT\n");
    }

    #[test]
    #[cfg(unix)]
    fn spawn_failure_is_a_resolve_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("not_executable");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        let cmd = Box::new(ExternalCommand::new("not_executable", script, Vec::new()));
        let err = cmd
            .execute(
                Box::new(MemReader::new("")),
                Box::new(MemWriter::new()),
                &Environment::empty(),
            )
            .err()
            .expect("spawning a non-executable file fails");
        assert_matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::Spawn { .. })
        );
    }
}
