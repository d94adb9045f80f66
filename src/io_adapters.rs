//! Stream adapters plugged into pipeline stages.
//!
//! OS-backed streams (files, pipe ends, the process stdio) can be handed to a
//! spawned process directly. Memory-backed ones cannot, and hand themselves back
//! from `stdio()` so the caller relays the bytes.

use crate::command::{Stdin, Stdout};
use std::fs::File;
use std::io::{self, Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

/// Memory-backed reader.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Stdin for MemReader {
    fn stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Read + Send>> {
        Err(self)
    }
}

/// Memory-backed writer for capturing output.
///
/// Clones of the handle returned by [`MemWriter::with_handle`] see every byte
/// written, also after the writer moved to another thread.
#[derive(Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: create writer and return (writer, shared handle).
    pub fn with_handle() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let mw = MemWriter::new();
        let handle = mw.buf.clone();
        (mw, handle)
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {
    fn stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Write + Send>> {
        Err(self)
    }
}

/// Streams that convert into a [`Stdio`] without any relaying.
macro_rules! os_backed {
    ($trait:ident, $io:ident: $($ty:ty),+) => {
        $(
            impl $trait for $ty {
                fn stdio(self: Box<Self>) -> Result<Stdio, Box<dyn $io + Send>> {
                    Ok(Stdio::from(*self))
                }
            }
        )+
    };
}

os_backed!(Stdin, Read: File, os_pipe::PipeReader);
os_backed!(Stdout, Write: File, os_pipe::PipeWriter);

/// The process standard input, shared with the terminal.
pub struct InheritedStdin(pub io::Stdin);

impl Read for InheritedStdin {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.0.read(out)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Read + Send>> {
        Ok(Stdio::inherit())
    }
}

/// The process standard output.
pub struct InheritedStdout(pub io::Stdout);

impl Write for InheritedStdout {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.0.write(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStdout {
    fn stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Write + Send>> {
        // Anything a builtin wrote must land before the child starts writing.
        let _ = self.0.lock().flush();
        Ok(Stdio::inherit())
    }
}

/// Where the first stage of a pipeline reads from and the last one writes to,
/// unless redirected.
pub trait SessionStreams {
    fn input(&self) -> Box<dyn Stdin>;
    fn output(&self) -> Box<dyn Stdout>;
}

/// The process standard input and output.
#[derive(Debug, Default, Clone, Copy)]
pub struct InheritedStreams;

impl SessionStreams for InheritedStreams {
    fn input(&self) -> Box<dyn Stdin> {
        Box::new(InheritedStdin(io::stdin()))
    }

    fn output(&self) -> Box<dyn Stdout> {
        Box::new(InheritedStdout(io::stdout()))
    }
}

/// Fixed input and captured output, for embedding the shell and for tests.
///
/// Every pipeline reads the same input from the start. Output of all pipelines
/// accumulates and can be inspected through any clone.
#[derive(Debug, Clone, Default)]
pub struct CapturedStreams {
    input: Arc<Vec<u8>>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl CapturedStreams {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: Arc::new(input.into()),
            output: Arc::default(),
        }
    }

    /// Everything written so far, decoded lossily.
    pub fn captured(&self) -> String {
        let output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&output).into_owned()
    }
}

impl SessionStreams for CapturedStreams {
    fn input(&self) -> Box<dyn Stdin> {
        Box::new(MemReader::new(self.input.as_slice()))
    }

    fn output(&self) -> Box<dyn Stdout> {
        Box::new(MemWriter {
            buf: self.output.clone(),
        })
    }
}
