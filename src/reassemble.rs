use crate::matcher::MultilineMatcher;
use crate::scanner::ScannedLine;

/// Default bound on the number of lines merged into one record.
pub const DEFAULT_MAX_MULTILINES: usize = 500;

/// An assembled, possibly multi-line record before identification and
/// formatting are attached.
#[derive(Debug)]
pub(crate) struct AssembledRecord {
    pub message: String,
    pub raw: Vec<u8>,
}

/// Buffers scanned lines and assembles them into records using a merge
/// predicate.
///
/// Without a matcher every line is its own record. A buffer flushes when the
/// predicate declines the next line, when it reaches `max_lines`, and at
/// stream end via [`finish`](Self::finish).
pub(crate) struct Reassembler {
    matcher: Option<Box<dyn MultilineMatcher>>,
    max_lines: usize,
    pending: Vec<ScannedLine>,
    last_text: String,
}

impl Reassembler {
    pub fn new(matcher: Option<Box<dyn MultilineMatcher>>, max_lines: usize) -> Self {
        Self {
            matcher,
            max_lines: max_lines.max(1),
            pending: Vec::new(),
            last_text: String::new(),
        }
    }

    /// Feeds one line; returns a record when the previous buffer flushed.
    pub fn push(&mut self, line: ScannedLine) -> Option<AssembledRecord> {
        if self.pending.is_empty() {
            self.last_text = line.text.clone();
            self.pending.push(line);
            return None;
        }

        let merge = match self.matcher.as_mut() {
            Some(matcher) => matcher.should_merge(&self.last_text, &line.text),
            None => false,
        };

        if merge {
            self.last_text = line.text.clone();
            self.pending.push(line);
            if self.pending.len() >= self.max_lines {
                return self.flush();
            }
            None
        } else {
            let flushed = self.flush();
            self.last_text = line.text.clone();
            self.pending.push(line);
            flushed
        }
    }

    /// Flushes whatever is buffered; called at stream end.
    pub fn finish(&mut self) -> Option<AssembledRecord> {
        self.flush()
    }

    fn flush(&mut self) -> Option<AssembledRecord> {
        if self.pending.is_empty() {
            return None;
        }
        let lines = std::mem::take(&mut self.pending);
        let mut message = String::new();
        let mut raw = Vec::new();
        for (i, line) in lines.into_iter().enumerate() {
            if i > 0 {
                message.push('\n');
                raw.push(b'\n');
            }
            message.push_str(&line.text);
            raw.extend_from_slice(&line.raw);
        }
        Some(AssembledRecord { message, raw })
    }
}
