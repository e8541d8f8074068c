use chrono::{DateTime, Utc};

/// A fully assembled log record from a single container.
///
/// For multi-line records the constituent lines are joined by `\n` in both
/// `message` and `raw`. The timestamp is taken at assembly time; per-line
/// timestamps from the server are not parsed.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Kubernetes namespace of the pod
    pub namespace: String,
    /// Name of the pod
    pub pod_name: String,
    /// Name of the container within the pod
    pub container_name: String,
    /// Time the record was assembled
    pub timestamp: DateTime<Utc>,
    /// Assembled log content
    pub message: String,
    /// Original bytes of the log content
    pub raw: Vec<u8>,
}

impl LogRecord {
    pub(crate) fn new(
        namespace: String,
        pod_name: String,
        container_name: String,
        message: String,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            namespace,
            pod_name,
            container_name,
            timestamp: Utc::now(),
            message,
            raw,
        }
    }
}
