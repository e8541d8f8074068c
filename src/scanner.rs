use std::io;

use futures::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// A single line produced by [`LineScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScannedLine {
    /// Decoded text with the trailing newline stripped
    pub text: String,
    /// Original bytes of the line, newline stripped
    pub raw: Vec<u8>,
}

impl ScannedLine {
    fn from_raw(raw: Vec<u8>) -> Self {
        Self {
            text: String::from_utf8_lossy(&raw).into_owned(),
            raw,
        }
    }
}

/// Incremental line reader over an arbitrary byte stream.
///
/// Bytes following a newline are carried over to the next call, so nothing
/// is lost between lines. A line longer than the read chunk keeps
/// accumulating until a newline or the end of the stream arrives; a final
/// line without a trailing newline is still yielded.
pub(crate) struct LineScanner<R> {
    reader: R,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Reads the next complete line.
    ///
    /// `Ok(None)` signals a clean end of stream; any other I/O failure is
    /// surfaced with its cause.
    pub async fn next_line(&mut self) -> io::Result<Option<ScannedLine>> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let mut raw: Vec<u8> = self.pending.drain(..=pos).collect();
                raw.pop();
                return Ok(Some(ScannedLine::from_raw(raw)));
            }

            if self.eof {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let raw = std::mem::take(&mut self.pending);
                return Ok(Some(ScannedLine::from_raw(raw)));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.pending.extend_from_slice(&chunk[..n]);
            }
        }
    }
}
