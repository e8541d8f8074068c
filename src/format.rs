//! Formatters applied to records immediately before handler handoff.

use chrono::SecondsFormat;
use serde::Serialize;

use crate::record::LogRecord;

/// Renders a record's display string; the result replaces the record's
/// `message` before it reaches the handler.
///
/// Any `Fn(&LogRecord) -> String` closure is a formatter.
pub trait LogFormatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> String;
}

impl<F> LogFormatter for F
where
    F: Fn(&LogRecord) -> String + Send + Sync,
{
    fn format(&self, record: &LogRecord) -> String {
        self(record)
    }
}

/// Passes the assembled message through unchanged; the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFormatter;

impl LogFormatter for PassthroughFormatter {
    fn format(&self, record: &LogRecord) -> String {
        record.message.clone()
    }
}

const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Prefixes messages with timestamp, namespace, and pod/container identity.
///
/// Output shape: `2024-01-15T10:30:00Z [default] web-1/app: message`, with
/// each prefix element individually toggleable and optional ANSI coloring.
#[derive(Debug, Clone)]
pub struct TextFormatter {
    pub show_timestamp: bool,
    pub show_namespace: bool,
    pub show_pod_name: bool,
    pub show_container_name: bool,
    pub color_output: bool,
}

impl TextFormatter {
    /// All prefix elements on, colored.
    pub fn new() -> Self {
        Self {
            show_timestamp: true,
            show_namespace: true,
            show_pod_name: true,
            show_container_name: true,
            color_output: true,
        }
    }

    /// All prefix elements on, no color codes.
    pub fn plain() -> Self {
        Self {
            color_output: false,
            ..Self::new()
        }
    }
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFormatter for TextFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let mut prefix = String::new();

        if self.show_timestamp {
            prefix.push_str(&record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true));
            prefix.push(' ');
        }
        if self.show_namespace {
            prefix.push('[');
            prefix.push_str(&record.namespace);
            prefix.push_str("] ");
        }
        if self.show_pod_name {
            prefix.push_str(&record.pod_name);
        }
        if self.show_container_name {
            prefix.push('/');
            prefix.push_str(&record.container_name);
        }

        if prefix.is_empty() {
            return record.message.clone();
        }
        if self.color_output {
            format!("{CYAN}{prefix}{RESET}: {}", record.message)
        } else {
            format!("{prefix}: {}", record.message)
        }
    }
}

/// Serializes records as single-line JSON objects.
///
/// Falls back to the bare message if serialization fails.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    pub include_timestamp: bool,
    pub include_namespace: bool,
    pub include_pod_name: bool,
    pub include_container_name: bool,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pod_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_name: Option<&'a str>,
    message: &'a str,
}

impl JsonFormatter {
    /// All identity fields included.
    pub fn new() -> Self {
        Self {
            include_timestamp: true,
            include_namespace: true,
            include_pod_name: true,
            include_container_name: true,
        }
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFormatter for JsonFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let entry = JsonEntry {
            timestamp: self
                .include_timestamp
                .then(|| record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
            namespace: self.include_namespace.then_some(record.namespace.as_str()),
            pod_name: self.include_pod_name.then_some(record.pod_name.as_str()),
            container_name: self
                .include_container_name
                .then_some(record.container_name.as_str()),
            message: &record.message,
        };
        serde_json::to_string(&entry).unwrap_or_else(|_| record.message.clone())
    }
}
