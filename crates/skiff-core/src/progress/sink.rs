//! Line-atomic output shared by concurrent stage renderers.

use std::io::{self, Write};
use std::sync::Mutex;

/// A writer that emits whole lines under a lock, so lines written from
/// different stage tasks never interleave.
#[derive(Debug)]
pub struct LineSink<W> {
    inner: Mutex<W>,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Write `line` exactly as given (no newline is added) and flush.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("progress sink lock poisoned"))?;
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }

    /// Recover the writer, e.g. to inspect captured output.
    pub fn into_inner(self) -> io::Result<W> {
        self.inner
            .into_inner()
            .map_err(|_| io::Error::other("progress sink lock poisoned"))
    }
}

impl LineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}
