//! Runs parsed descriptors.
//!
//! The descriptor list of a line is cut into pipelines. Each pipeline is set up
//! left to right on the calling thread: assignments are applied, arguments are
//! substituted, redirections are opened, pipes are created and commands are
//! resolved. Only when every stage is set up do the stages start, one thread
//! each, and the executor waits for all of them.

use crate::command::{
    EXIT_FAILURE, EXIT_NOT_FOUND, ExecutableCommand, ExitCode, Outcome, Stdin, Stdout,
};
use crate::config::UnsetPolicy;
use crate::env::Environment;
use crate::error::{ResolveError, SetupError};
use crate::io_adapters::SessionStreams;
use crate::parser::{CommandDescriptor, RedirectTarget};
use crate::resolver::Resolver;
use crate::substitution::substitute_descriptor;
use os_pipe::PipeReader;
use std::fs::{File, OpenOptions};
use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// A command ready to start, with everything it touches already open.
struct ReadyStage {
    name: String,
    unit: Box<dyn ExecutableCommand>,
    stdin: Box<dyn Stdin>,
    stdout: Box<dyn Stdout>,
    env: Environment,
}

enum Stage {
    Ready(ReadyStage),
    /// Settled during setup, e.g. a command that could not be resolved.
    Finished(ExitCode),
    /// `exit` before the end of a pipeline does nothing.
    Skipped,
    /// `exit` at the end of a pipeline, with the pipe it is fed from.
    Exit(Option<PipeReader>),
}

enum Running {
    Thread(JoinHandle<ExitCode>),
    Finished(ExitCode),
    Skipped,
    Exit(Option<JoinHandle<ExitCode>>),
}

/// Cuts the descriptor list of a line into pipelines.
///
/// Every `;` clause is one pipeline, so a clause made only of assignments is
/// a pipeline without stages.
pub fn split_pipelines(descriptors: Vec<CommandDescriptor>) -> Vec<Vec<CommandDescriptor>> {
    let mut pipelines = Vec::new();
    let mut current = Vec::new();
    for descriptor in descriptors {
        let ends_pipeline = descriptor.ends_clause;
        current.push(descriptor);
        if ends_pipeline {
            pipelines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        pipelines.push(current);
    }
    pipelines
}

pub struct PipelineExecutor<'a> {
    resolver: &'a Resolver,
    streams: &'a dyn SessionStreams,
    policy: UnsetPolicy,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(
        resolver: &'a Resolver,
        streams: &'a dyn SessionStreams,
        policy: UnsetPolicy,
    ) -> Self {
        Self {
            resolver,
            streams,
            policy,
        }
    }

    /// Runs every pipeline of a line in order and reports the last one.
    ///
    /// A pipeline that terminates the session stops the line. The status of every
    /// finished pipeline is stored in `env.last_status`. A line without commands
    /// leaves the status as it was.
    pub fn execute(&self, descriptors: Vec<CommandDescriptor>, env: &mut Environment) -> Outcome {
        let mut outcome = Outcome::code(env.last_status);
        for pipeline in split_pipelines(descriptors) {
            outcome = match self.prepare(pipeline, env) {
                Ok(stages) => self.run(stages, env.last_status),
                Err(err) => {
                    eprintln!("{}", err);
                    tracing::debug!(error = ?err, "pipeline aborted during setup");
                    Outcome::code(EXIT_FAILURE)
                }
            };
            env.last_status = outcome.code;
            if outcome.should_exit {
                break;
            }
        }
        outcome
    }

    /// Sets up one pipeline: applies its assignments and opens every stream.
    ///
    /// Any error drops the stages built so far, which closes their files and pipe
    /// ends, and nothing of the pipeline runs.
    fn prepare(
        &self,
        pipeline: Vec<CommandDescriptor>,
        env: &mut Environment,
    ) -> Result<Vec<Stage>, SetupError> {
        let last_invocation = pipeline.iter().rposition(|d| !d.is_assignment());
        let mut stages = Vec::new();
        let mut inbound: Option<PipeReader> = None;

        for (index, mut descriptor) in pipeline.into_iter().enumerate() {
            substitute_descriptor(&mut descriptor, env, self.policy);

            if descriptor.is_assignment() {
                let [key, value] = &descriptor.arguments[..] else {
                    continue;
                };
                tracing::debug!(%key, %value, "assignment");
                env.set_var(key.as_str(), value.as_str());
                if descriptor.is_piped {
                    // The next stage reads from a pipe nobody writes to.
                    let (reader, _) = os_pipe::pipe().map_err(SetupError::Pipe)?;
                    inbound = Some(reader);
                }
                continue;
            }

            let input_file = match &descriptor.input_path {
                Some(target) => Some(open_input(target, env)?),
                None => None,
            };
            let pipe_in = inbound.take();
            let pipe_out = if descriptor.is_piped {
                let (reader, writer) = os_pipe::pipe().map_err(SetupError::Pipe)?;
                inbound = Some(reader);
                Some(writer)
            } else {
                None
            };
            let output_file = match &descriptor.output_path {
                Some(target) => Some(open_output(target, descriptor.append, env)?),
                None => None,
            };

            let name = descriptor.command_name().unwrap_or_default().to_string();
            let stage = match self.resolver.resolve(&descriptor, env) {
                Err(err) => {
                    eprintln!("{}", err);
                    Stage::Finished(EXIT_NOT_FOUND)
                }
                Ok(unit) if unit.terminates_session() => {
                    if Some(index) != last_invocation {
                        tracing::debug!("skipping exit inside a pipeline");
                        Stage::Skipped
                    } else if input_file.is_some() {
                        Stage::Exit(None)
                    } else {
                        Stage::Exit(pipe_in)
                    }
                }
                Ok(unit) => {
                    let stdin: Box<dyn Stdin> = match (input_file, pipe_in) {
                        (Some(file), _) => Box::new(file),
                        (None, Some(pipe)) => Box::new(pipe),
                        (None, None) => self.streams.input(),
                    };
                    let stdout: Box<dyn Stdout> = match (output_file, pipe_out) {
                        (Some(file), _) => Box::new(file),
                        (None, Some(pipe)) => Box::new(pipe),
                        (None, None) => self.streams.output(),
                    };
                    Stage::Ready(ReadyStage {
                        name,
                        unit,
                        stdin,
                        stdout,
                        env: env.clone(),
                    })
                }
            };
            stages.push(stage);
        }
        Ok(stages)
    }

    /// Starts every ready stage on its own thread and waits for all of them.
    fn run(&self, stages: Vec<Stage>, last_status: ExitCode) -> Outcome {
        match start(stages) {
            Ok(running) => finish(running, last_status),
            Err(err) => {
                eprintln!("{}", err);
                Outcome::code(EXIT_FAILURE)
            }
        }
    }
}

/// Spawns the stage threads behind a gate so none of them runs unless all
/// were spawned.
fn start(stages: Vec<Stage>) -> Result<Vec<Running>, SetupError> {
    let mut running = Vec::with_capacity(stages.len());
    let mut gates = Vec::new();
    for stage in stages {
        let spawned = match stage {
            Stage::Ready(stage) => {
                let name = stage.name.clone();
                spawn_gated(name, &mut gates, move || run_stage(stage)).map(Running::Thread)
            }
            // The terminal `exit` keeps reading so its predecessor can finish writing.
            Stage::Exit(Some(mut pipe)) => spawn_gated("exit".to_string(), &mut gates, move || {
                let _ = io::copy(&mut pipe, &mut io::sink());
                0
            })
            .map(|handle| Running::Exit(Some(handle))),
            Stage::Exit(None) => Ok(Running::Exit(None)),
            Stage::Finished(code) => Ok(Running::Finished(code)),
            Stage::Skipped => Ok(Running::Skipped),
        };
        match spawned {
            Ok(entry) => running.push(entry),
            Err(err) => {
                // Closing the gates releases the spawned threads unrun.
                drop(gates);
                for entry in running {
                    if let Running::Thread(handle) | Running::Exit(Some(handle)) = entry {
                        let _ = handle.join();
                    }
                }
                return Err(err);
            }
        }
    }
    for gate in gates {
        let _ = gate.send(());
    }
    Ok(running)
}

fn spawn_gated(
    name: String,
    gates: &mut Vec<mpsc::Sender<()>>,
    body: impl FnOnce() -> ExitCode + Send + 'static,
) -> Result<JoinHandle<ExitCode>, SetupError> {
    let (gate, opened) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name(format!("stage-{}", name))
        .spawn(move || match opened.recv() {
            Ok(()) => body(),
            Err(_) => EXIT_FAILURE,
        })
        .map_err(|source| SetupError::Thread { name, source })?;
    gates.push(gate);
    Ok(handle)
}

/// Joins every stage in order. The last stage's status is the pipeline's.
fn finish(running: Vec<Running>, last_status: ExitCode) -> Outcome {
    let mut previous: Option<ExitCode> = None;
    let mut outcome = Outcome::code(last_status);
    for entry in running {
        outcome = match entry {
            Running::Thread(handle) => Outcome::code(join(handle)),
            Running::Finished(code) => Outcome::code(code),
            Running::Skipped => continue,
            Running::Exit(drain) => {
                if let Some(handle) = drain {
                    join(handle);
                }
                Outcome::terminate(previous.unwrap_or(last_status))
            }
        };
        previous = Some(outcome.code);
    }
    outcome
}

fn join(handle: JoinHandle<ExitCode>) -> ExitCode {
    handle.join().unwrap_or_else(|_| {
        tracing::error!("pipeline stage panicked");
        EXIT_FAILURE
    })
}

fn run_stage(stage: ReadyStage) -> ExitCode {
    let ReadyStage {
        name,
        unit,
        stdin,
        stdout,
        env,
    } = stage;
    tracing::trace!(%name, "stage started");
    let code = match unit.execute(stdin, stdout, &env) {
        Ok(outcome) => outcome.code,
        Err(err) => report_failure(&name, err),
    };
    tracing::trace!(%name, code, "stage finished");
    code
}

/// Prints the diagnostic of a failed stage and picks its status.
fn report_failure(name: &str, err: anyhow::Error) -> ExitCode {
    if let Some(err) = err.downcast_ref::<ResolveError>() {
        eprintln!("{}", err);
        return EXIT_NOT_FOUND;
    }
    let broken_pipe = err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    });
    if broken_pipe {
        tracing::debug!(%name, "output closed by reader");
    } else {
        eprintln!("{}: {:#}", name, err);
    }
    EXIT_FAILURE
}

fn open_input(target: &RedirectTarget, env: &Environment) -> Result<File, SetupError> {
    File::open(env.current_dir.join(&target.path)).map_err(|source| SetupError::OpenInput {
        path: target.path.clone(),
        source,
    })
}

fn open_output(
    target: &RedirectTarget,
    append: bool,
    env: &Environment,
) -> Result<File, SetupError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(env.current_dir.join(&target.path))
        .map_err(|source| SetupError::OpenOutput {
            path: target.path.clone(),
            source,
        })
}
