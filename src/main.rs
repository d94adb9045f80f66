use argh::FromArgs;
use shell_pipeline::{Config, Interpreter, UnsetPolicy};
use std::io;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(FromArgs)]
/// A small shell with pipes, redirections and variables.
struct Options {
    #[argh(option, short = 'c')]
    /// run this line and exit instead of reading lines from standard input
    command: Option<String>,

    #[argh(switch)]
    /// reject unterminated quotes and redirections without a file name
    strict: bool,

    #[argh(switch)]
    /// substitute unset variables with an empty string instead of keeping `$NAME`
    unset_empty: bool,

    #[argh(switch)]
    /// start with an empty environment instead of the process environment
    clean_env: bool,
}

impl Options {
    fn config(&self) -> Config {
        Config {
            strict: self.strict,
            unset_policy: if self.unset_empty {
                UnsetPolicy::Empty
            } else {
                UnsetPolicy::Keep
            },
            inherit_env: !self.clean_env,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()?;

    let options: Options = argh::from_env();
    let mut sh = Interpreter::new(options.config());

    let status = match &options.command {
        Some(line) => sh.run_line(line).code,
        None => sh.repl(|buf| io::stdin().read_line(buf), &mut io::stdout()),
    };
    tracing::debug!(status, "session finished");
    Ok(ExitCode::from((status & 0xff) as u8))
}
