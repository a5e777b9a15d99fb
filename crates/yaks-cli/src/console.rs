//! User facing output
//!
//! Notices, step banners, streamed test logs and the final summary are written
//! through a [`Console`] handed to each component. Diagnostics go through
//! `tracing` instead.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Cloneable handle on the output and error streams
#[derive(Clone)]
pub struct Console {
    out: Sink,
    err: Sink,
}

impl Console {
    /// Console writing to the process stdout and stderr
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            err: Arc::new(Mutex::new(Box::new(err))),
        }
    }

    /// Console capturing both streams into one in-memory buffer
    pub fn captured() -> (Self, CapturedOutput) {
        let buffer = CapturedOutput::default();
        (Self::new(buffer.clone(), buffer.clone()), buffer)
    }

    /// Write a line to the output stream
    pub fn println(&self, line: impl Display) {
        let mut out = lock(&self.out);
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }

    /// Write text to the output stream as is
    pub fn print(&self, text: &str) {
        let mut out = lock(&self.out);
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    /// Write a line to the error stream
    pub fn eprintln(&self, line: impl Display) {
        let mut err = lock(&self.err);
        let _ = writeln!(err, "{}", line);
        let _ = err.flush();
    }
}

fn lock(sink: &Sink) -> MutexGuard<'_, Box<dyn Write + Send>> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory sink shared between a [`Console`] and its reader
#[derive(Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    pub fn contents(&self) -> String {
        let bytes = self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
