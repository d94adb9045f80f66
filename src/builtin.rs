use crate::command::{ExecutableCommand, ExitCode, Outcome, Stdin, Stdout};
use crate::env::Environment;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use regex::RegexBuilder;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process on the thread of their pipeline stage.
pub(crate) trait BuiltinCommand: Sized + FromArgs + Send + 'static {
    /// Canonical name of the command, e.g. "echo" or "wc".
    fn name() -> &'static str;

    /// Whether the command ends the session.
    const TERMINATES: bool = false;

    /// Executes the command using provided IO streams and an environment snapshot.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        env: &Environment,
    ) -> Result<Outcome> {
        let code = <T as BuiltinCommand>::execute(*self, &mut stdin, &mut stdout, env)?;
        stdout.flush()?;
        Ok(Outcome {
            code,
            should_exit: T::TERMINATES,
        })
    }

    fn terminates_session(&self) -> bool {
        T::TERMINATES
    }
}

/// Output of `--help`: printed instead of running the builtin.
pub(crate) struct HelpText {
    pub output: String,
}

impl ExecutableCommand for HelpText {
    fn execute(
        self: Box<Self>,
        _stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        _env: &Environment,
    ) -> Result<Outcome> {
        writeln!(stdout, "{}", self.output)?;
        stdout.flush()?;
        Ok(Outcome::code(0))
    }
}

/// Paths given to builtins are relative to the session working directory.
fn session_path(env: &Environment, file: &str) -> PathBuf {
    env.current_dir.join(file)
}

fn open_file(env: &Environment, file: &str) -> Result<fs::File> {
    fs::File::open(session_path(env, file)).with_context(|| file.to_string())
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell. The exit status is the status of the preceding command.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    const TERMINATES: bool = true;

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        Ok(env.last_status)
    }
}

/// Write the arguments to standard output, separated by spaces.
///
/// By default, a trailing newline is printed; a leading `-n` suppresses it. Every
/// other argument is printed as-is, even when it looks like an option.
pub struct Echo {
    pub no_newline: bool,
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        let (no_newline, args) = match args.split_first() {
            Some((&"-n", rest)) => (true, rest),
            _ => (false, args),
        };
        Ok(Echo {
            no_newline,
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// count lines, words and bytes
pub struct Wc {
    #[argh(positional)]
    /// file to count; reads standard input when omitted
    pub file: Option<String>,
}

impl BuiltinCommand for Wc {
    fn name() -> &'static str {
        "wc"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let mut buf = Vec::new();
        match &self.file {
            Some(file) => {
                open_file(env, file)?
                    .read_to_end(&mut buf)
                    .with_context(|| file.clone())?;
            }
            None => {
                stdin.read_to_end(&mut buf)?;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        let lines = text.lines().count();
        let words = text.split_whitespace().count();
        let bytes = buf.len();
        match &self.file {
            Some(file) => writeln!(stdout, "{} {} {} {}", lines, words, bytes, file)?,
            None => writeln!(stdout, "{} {} {}", lines, words, bytes)?,
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print a file to standard output
pub struct Cat {
    #[argh(positional)]
    /// file to print; copies standard input when omitted
    pub file: Option<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        match &self.file {
            Some(file) => {
                let mut f = open_file(env, file)?;
                std::io::copy(&mut f, stdout).with_context(|| file.clone())?;
            }
            None => {
                std::io::copy(stdin, stdout)?;
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print lines matching a pattern
pub struct Grep {
    #[argh(positional)]
    /// the pattern to search for (a regular expression)
    pub pattern: String,

    #[argh(positional)]
    /// file to search. If none provided, reads from stdin.
    pub file: Option<String>,

    #[argh(switch, short = 'w')]
    /// match only whole words (using non-word characters as boundaries)
    pub word_regexp: bool,

    #[argh(switch, short = 'i')]
    /// ignore case distinctions
    pub ignore_case: bool,

    #[argh(option, short = 'A', default = "0")]
    /// print NUM lines of trailing context after matching lines
    pub after_context: usize,
}

impl Grep {
    /// Prints matching lines with their trailing context; returns whether anything matched.
    fn process_source(
        &self,
        reader: &mut dyn Read,
        stdout: &mut dyn Write,
        re: &regex::Regex,
    ) -> Result<bool> {
        let reader = BufReader::new(reader);

        let mut lines = Vec::new();
        let mut match_indices = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.context("read error")?;
            if re.is_match(&line) {
                match_indices.push(line_num);
            }
            lines.push(line);
        }

        let total_lines = lines.len();
        let mut to_print = vec![false; total_lines];
        for &match_line in &match_indices {
            let end_print = match_line
                .saturating_add(self.after_context)
                .saturating_add(1)
                .min(total_lines);
            for flag in &mut to_print[match_line..end_print] {
                *flag = true;
            }
        }

        let mut last_printed_index: Option<usize> = None;
        for (i, line) in lines.iter().enumerate() {
            if !to_print[i] {
                continue;
            }
            // Groups of context that do not touch are separated like GNU grep does.
            if self.after_context > 0 && last_printed_index.is_some_and(|last| i > last + 1) {
                writeln!(stdout, "--")?;
            }
            writeln!(stdout, "{}", line)?;
            last_printed_index = Some(i);
        }

        Ok(!match_indices.is_empty())
    }
}

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let pattern = if self.word_regexp {
            format!(r"\b(?:{})\b", self.pattern)
        } else {
            self.pattern.clone()
        };

        let re = RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
            .with_context(|| format!("invalid pattern: {}", self.pattern))?;

        let matched = match &self.file {
            Some(file) => {
                let mut f = open_file(env, file)?;
                self.process_source(&mut f, stdout, &re)
                    .with_context(|| file.clone())?
            }
            None => self.process_source(stdin, stdout, &re)?,
        };
        Ok(if matched { 0 } else { 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// A scratch directory holding one file, plus an environment rooted in it.
    fn setup(content: &str) -> (TempDir, Environment) {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("test_data.txt"), content).expect("write test file");
        let mut env = Environment::empty();
        env.current_dir = dir.path().to_path_buf();
        (dir, env)
    }

    fn run<T: BuiltinCommand>(cmd: T, input: &str, env: &Environment) -> (ExitCode, String) {
        let mut out = Vec::new();
        let code = BuiltinCommand::execute(
            cmd,
            &mut Cursor::new(input.as_bytes().to_vec()),
            &mut out,
            env,
        )
        .expect("builtin failed");
        (code, String::from_utf8(out).unwrap())
    }

    fn grep(pattern: &str, file: Option<&str>) -> Grep {
        Grep {
            pattern: pattern.to_string(),
            file: file.map(str::to_string),
            word_regexp: false,
            ignore_case: false,
            after_context: 0,
        }
    }

    #[test]
    fn test_pwd_prints_session_dir() {
        let (dir, env) = setup("");
        let (code, out) = run(Pwd {}, "", &env);
        assert_eq!(code, 0);
        assert_eq!(out, format!("{}\n", dir.path().to_string_lossy()));
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let env = Environment::empty();

        let echo = Echo::from_args(&["echo"], &["hello", "world"]).unwrap();
        assert_eq!(run(echo, "", &env), (0, "hello world\n".to_string()));

        let echo = Echo::from_args(&["echo"], &["-n", "foo", "bar"]).unwrap();
        assert_eq!(run(echo, "", &env), (0, "foo bar".to_string()));
    }

    #[test]
    fn test_echo_prints_option_like_arguments() {
        let env = Environment::empty();
        let echo = Echo::from_args(&["echo"], &["--help", "-x", "-n"]).unwrap();
        assert_eq!(run(echo, "", &env).1, "--help -x -n\n");

        let echo = Echo::from_args(&["echo"], &[]).unwrap();
        assert_eq!(run(echo, "", &env).1, "\n");
    }

    #[test]
    fn test_exit_reports_last_status() {
        let mut env = Environment::empty();
        env.last_status = 3;
        assert_eq!(run(Exit {}, "", &env).0, 3);
        assert!(<Exit as BuiltinCommand>::TERMINATES);
        assert!(!<Echo as BuiltinCommand>::TERMINATES);
    }

    #[test]
    fn test_cat_reads_relative_file() {
        let (_dir, env) = setup("hello\nworld\n");
        let cat = Cat {
            file: Some("test_data.txt".to_string()),
        };
        assert_eq!(run(cat, "", &env), (0, "hello\nworld\n".to_string()));
    }

    #[test]
    fn test_cat_reads_stdin_when_no_args() {
        let env = Environment::empty();
        let cat = Cat { file: None };
        assert_eq!(run(cat, "from stdin\nline2\n", &env).1, "from stdin\nline2\n");
    }

    #[test]
    fn test_cat_missing_file_is_an_error() {
        let (_dir, env) = setup("");
        let cat = Cat {
            file: Some("missing.txt".to_string()),
        };
        let err = BuiltinCommand::execute(cat, &mut Cursor::new(Vec::new()), &mut Vec::new(), &env)
            .unwrap_err();
        assert!(format!("{:#}", err).starts_with("missing.txt: "));
    }

    #[test]
    fn test_wc_counts_file() {
        let (_dir, env) = setup("one two\nthree\n");
        let wc = Wc {
            file: Some("test_data.txt".to_string()),
        };
        assert_eq!(run(wc, "", &env).1, "2 3 14 test_data.txt\n");
    }

    #[test]
    fn test_wc_counts_stdin_when_no_args() {
        let env = Environment::empty();
        let (code, out) = run(Wc { file: None }, "a b c\n", &env);
        assert_eq!(code, 0);
        assert_eq!(out, "1 3 6\n");

        assert_eq!(run(Wc { file: None }, "", &env).1, "0 0 0\n");
    }

    #[test]
    fn test_wc_from_args_rejects_two_files() {
        assert!(Wc::from_args(&["wc"], &["a", "b"]).is_err());
        assert!(Wc::from_args(&["wc"], &["a"]).is_ok());
    }

    #[test]
    fn test_grep_ignore_case() {
        let (_dir, env) = setup("Target 1\nTaRgEt 2\nNo match\n");
        let mut cmd = grep("target", Some("test_data.txt"));
        cmd.ignore_case = true;
        assert_eq!(run(cmd, "", &env), (0, "Target 1\nTaRgEt 2\n".to_string()));
    }

    #[test]
    fn test_grep_whole_word() {
        let env = Environment::empty();
        let mut cmd = grep("cat", None);
        cmd.word_regexp = true;
        let (code, out) = run(cmd, "cat\nconcatenate\nthe cat sat\n", &env);
        assert_eq!(code, 0);
        assert_eq!(out, "cat\nthe cat sat\n");
    }

    #[test]
    fn test_grep_trailing_context() {
        let content = "Line 1\nMATCH 1\nLine 3\nLine 4\nMATCH 2\nLine 6\nLine 7\nLine 8\n";
        let (_dir, env) = setup(content);
        let mut cmd = grep("MATCH", Some("test_data.txt"));
        cmd.after_context = 1;
        let (_, out) = run(cmd, "", &env);
        assert_eq!(out, "MATCH 1\nLine 3\n--\nMATCH 2\nLine 6\n");
    }

    #[test]
    fn test_grep_context_overlap() {
        let content = "MATCH 1\nLine 2\nMATCH 2\nLine 4\nLine 5\nLine 6\n";
        let env = Environment::empty();
        let mut cmd = grep("MATCH", None);
        cmd.after_context = 2;
        let (_, out) = run(cmd, content, &env);
        assert_eq!(out, "MATCH 1\nLine 2\nMATCH 2\nLine 4\nLine 5\n");
    }

    #[test]
    fn test_grep_huge_context_prints_to_the_end() {
        let env = Environment::empty();
        let cmd = Grep::from_args(&["grep"], &["-A", "18446744073709551615", "x"]).unwrap();
        assert_eq!(run(cmd, "a\nx\ny\n", &env), (0, "x\ny\n".to_string()));
    }

    #[test]
    fn test_grep_no_match_exits_with_one() {
        let env = Environment::empty();
        assert_eq!(run(grep("zzz", None), "abc\n", &env), (1, String::new()));
    }

    #[test]
    fn test_grep_invalid_pattern_is_an_error() {
        let env = Environment::empty();
        let result = BuiltinCommand::execute(
            grep("(unclosed", None),
            &mut Cursor::new(b"abc\n".to_vec()),
            &mut Vec::new(),
            &env,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_grep_parses_flags() {
        let cmd = Grep::from_args(&["grep"], &["-i", "-A", "2", "pat", "file.txt"]).unwrap();
        assert!(cmd.ignore_case);
        assert!(!cmd.word_regexp);
        assert_eq!(cmd.after_context, 2);
        assert_eq!(cmd.pattern, "pat");
        assert_eq!(cmd.file.as_deref(), Some("file.txt"));

        assert!(Grep::from_args(&["grep"], &[]).is_err());
    }
}
