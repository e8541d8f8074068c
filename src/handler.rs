use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;
use crate::record::LogRecord;

/// Receives streamed records, errors, and the end-of-stream signal.
///
/// `on_log` and `on_error` may be invoked concurrently from many workers;
/// implementations synchronize their own state. `on_end` is invoked at most
/// once per streamer, after every other callback.
pub trait LogHandler: Send + Sync {
    /// Called once for each assembled, formatted record.
    fn on_log(&self, record: LogRecord);

    /// Called when a worker hits a transient or permanent error.
    fn on_error(&self, error: StreamError);

    /// Called exactly once after all workers have drained.
    fn on_end(&self);
}

impl<H: LogHandler + ?Sized> LogHandler for Arc<H> {
    fn on_log(&self, record: LogRecord) {
        (**self).on_log(record)
    }

    fn on_error(&self, error: StreamError) {
        (**self).on_error(error)
    }

    fn on_end(&self) {
        (**self).on_end()
    }
}

/// Writes record messages to an output writer and errors to an error
/// writer, one line each, guarded by a mutex per writer.
pub struct ConsoleHandler {
    out: Mutex<Box<dyn Write + Send>>,
    err_out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleHandler {
    /// Handler writing to stdout and stderr.
    pub fn new() -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Handler writing to the given writers.
    pub fn with_writers(out: Box<dyn Write + Send>, err_out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            err_out: Mutex::new(err_out),
        }
    }
}

impl Default for ConsoleHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl LogHandler for ConsoleHandler {
    fn on_log(&self, record: LogRecord) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{}", record.message);
    }

    fn on_error(&self, error: StreamError) {
        let mut err_out = self.err_out.lock();
        let _ = writeln!(err_out, "Error: {error}");
    }

    fn on_end(&self) {}
}
