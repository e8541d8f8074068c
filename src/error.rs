//! Error types and streaming error classification.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from building or validating a [`LogFilter`](crate::LogFilter).
#[derive(Debug, Error)]
pub enum FilterError {
    /// No filter criteria were provided at all
    #[error("at least one filter criterion must be specified")]
    Empty,

    /// The namespace list is empty
    #[error("no namespace specified")]
    NoNamespace,

    /// A namespace entry is an empty string
    #[error("namespace must not be an empty string")]
    EmptyNamespace,

    /// A regex pattern failed to compile
    #[error("invalid regular expression pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// The container state is not one of the allowed values
    #[error("invalid container state {0:?}: must be \"all\", \"running\" or \"terminated\"")]
    InvalidContainerState(String),

    /// The since time lies in the future
    #[error("since time cannot be in the future")]
    SinceInFuture,
}

/// Errors returned by [`ClusterClient`](crate::ClusterClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The Kubernetes API rejected or failed the request
    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),

    /// Reading from an open stream failed
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The watch channel delivered an error event
    #[error("watch error: {message} (code {code})")]
    WatchEvent { message: String, code: u16 },
}

/// Errors from building or starting a [`Streamer`](crate::Streamer).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("a log filter is required")]
    MissingFilter,

    #[error("a log handler is required")]
    MissingHandler,

    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(&'static str),

    #[error("kubeconfig file not found at {0}")]
    KubeconfigNotFound(PathBuf),

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer kubernetes client configuration: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("failed to create kubernetes client: {0}")]
    Client(#[from] kube::Error),

    /// The initial pod listing failed; returned synchronously from `start`
    #[error("failed to list pods in namespace {namespace}: {source}")]
    InitialList {
        namespace: String,
        #[source]
        source: ClientError,
    },

    #[error("streamer already started")]
    AlreadyStarted,

    #[error("streamer is stopped")]
    Stopped,
}

/// An error surfaced through [`LogHandler::on_error`](crate::LogHandler::on_error)
/// while streaming.
///
/// Permanent errors end the affected worker; transient errors are followed
/// by a backoff and reconnect.
#[derive(Debug)]
pub struct StreamError {
    reason: String,
    permanent: bool,
    source: Option<ClientError>,
}

impl StreamError {
    pub(crate) fn transient(reason: impl Into<String>, source: Option<ClientError>) -> Self {
        Self {
            reason: reason.into(),
            permanent: false,
            source,
        }
    }

    pub(crate) fn permanent(reason: impl Into<String>, source: Option<ClientError>) -> Self {
        Self {
            reason: reason.into(),
            permanent: true,
            source,
        }
    }

    /// True when the affected worker gave up; no further retries follow.
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Human-readable description of what the worker was doing.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.reason, source),
            None => f.write_str(&self.reason),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Classifies streaming errors into recovery categories.
///
/// The default implementation matches the error text against the messages
/// Kubernetes emits when a followed container goes away; a custom classifier
/// can be installed through the [`StreamerBuilder`](crate::StreamerBuilder)
/// when a cluster speaks differently.
pub trait ErrorClassifier: Send + Sync {
    /// True when the error indicates normal container or pod termination.
    fn is_pod_gone(&self, err: &ClientError) -> bool;

    /// True when retrying cannot succeed.
    fn is_permanent(&self, err: &ClientError) -> bool;
}

/// Messages servers emit when a followed container or pod is gone.
const POD_GONE_TOKENS: &[&str] = &[
    "container not found",
    "pod not found",
    "has been terminated",
    "has been deleted",
];

/// Default [`ErrorClassifier`]: substring matching for pod-gone, HTTP
/// 401/403 for permanent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn is_pod_gone(&self, err: &ClientError) -> bool {
        if let ClientError::Io(io_err) = err {
            if io_err.kind() == io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        let text = err.to_string();
        POD_GONE_TOKENS.iter().any(|token| text.contains(token))
    }

    fn is_permanent(&self, err: &ClientError) -> bool {
        match err {
            ClientError::Api(kube::Error::Api(response)) => {
                response.code == 401 || response.code == 403
            }
            ClientError::WatchEvent { code, .. } => *code == 401 || *code == 403,
            _ => false,
        }
    }
}
