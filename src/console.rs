//! Serialized status output shared by all watch tasks.
//!
//! Every user-facing status line goes through one mutex-guarded writer so
//! concurrent tasks never interleave output mid-line. Diagnostics go through
//! `tracing` instead and are not part of this gate.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Shared, clonable gate around the status writer.
#[derive(Clone)]
pub struct Console {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    /// Console writing to the process's stdout.
    pub fn stdout() -> Self {
        Self::with_sink(Box::new(std::io::stdout()))
    }

    /// Console writing to an arbitrary sink; used by tests to capture output.
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Emit one task-prefixed status line: `[name] msg`.
    ///
    /// Write failures are ignored; losing a status line must never take a
    /// watcher down.
    pub fn line(&self, name: &str, msg: &str) {
        let mut sink = self.sink.lock().unwrap();
        let _ = writeln!(sink, "[{name}] {msg}");
        let _ = sink.flush();
    }

    /// Emit one unprefixed line (program-level announcements).
    pub fn note(&self, msg: &str) {
        let mut sink = self.sink.lock().unwrap();
        let _ = writeln!(sink, "{msg}");
        let _ = sink.flush();
    }
}
