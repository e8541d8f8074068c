//! In-memory fake cluster and recording handler shared by the integration
//! tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::{AsyncRead, Cursor};
use futures::stream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus};
use kube::core::ObjectMeta;
use parking_lot::Mutex;

use kubemux::{
    ClientError, ClusterClient, LogHandler, LogRecord, LogStream, PodEvent, PodEventStream,
    StreamError,
};

/// Surfaces engine traces in test output when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a pod with the given containers.
pub fn pod(namespace: &str, name: &str, containers: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|container| Container {
                    name: container.to_string(),
                    ..Container::default()
                })
                .collect(),
            ..PodSpec::default()
        }),
        status: None,
    }
}

/// Builds a pod carrying a phase, for exercising terminal-phase handling.
pub fn pod_with_phase(namespace: &str, name: &str, containers: &[&str], phase: &str) -> Pod {
    let mut pod = pod(namespace, name, containers);
    pod.status = Some(PodStatus {
        phase: Some(phase.to_string()),
        ..PodStatus::default()
    });
    pod
}

/// One scripted answer to a `follow_logs` call.
pub enum LogSession {
    /// Yields the bytes, then a clean end of stream.
    Finite(Vec<u8>),
    /// Yields the bytes, then stays open forever.
    Hanging(Vec<u8>),
    /// Yields the bytes, then fails the read with this message.
    ErrorAfter(Vec<u8>, String),
    /// The open call itself fails with this message.
    OpenError(String),
}

/// Reader that serves its bytes and then never completes another read.
struct HangingReader {
    data: Vec<u8>,
    pos: usize,
}

impl AsyncRead for HangingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if self.pos < self.data.len() {
            let n = (self.data.len() - self.pos).min(buf.len());
            let pos = self.pos;
            buf[..n].copy_from_slice(&self.data[pos..pos + n]);
            self.pos += n;
            Poll::Ready(Ok(n))
        } else {
            // Only cancellation wakes the caller; that is the point.
            Poll::Pending
        }
    }
}

/// Reader that serves its bytes and then fails.
struct ErrorAfterReader {
    data: Vec<u8>,
    pos: usize,
    message: String,
}

impl AsyncRead for ErrorAfterReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if self.pos < self.data.len() {
            let n = (self.data.len() - self.pos).min(buf.len());
            let pos = self.pos;
            buf[..n].copy_from_slice(&self.data[pos..pos + n]);
            self.pos += n;
            Poll::Ready(Ok(n))
        } else {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                self.message.clone(),
            )))
        }
    }
}

/// Scripted in-memory [`ClusterClient`].
///
/// Listing returns the configured pods per namespace; the first watch call
/// replays the scripted events and then stays open; `follow_logs` pops one
/// scripted session per call and serves a clean EOF once the script runs
/// out.
#[derive(Default)]
pub struct FakeCluster {
    pods: Vec<Pod>,
    watch_events: Mutex<Vec<PodEvent>>,
    sessions: Mutex<HashMap<String, VecDeque<LogSession>>>,
    open_counts: Mutex<HashMap<String, u32>>,
    last_list_selector: Mutex<Option<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_watch_event(self, event: PodEvent) -> Self {
        self.watch_events.lock().push(event);
        self
    }

    pub fn with_session(self, pod: &str, container: &str, session: LogSession) -> Self {
        self.sessions
            .lock()
            .entry(key(pod, container))
            .or_default()
            .push_back(session);
        self
    }

    /// How many times `follow_logs` was called for this container.
    pub fn open_count(&self, pod: &str, container: &str) -> u32 {
        self.open_counts
            .lock()
            .get(&key(pod, container))
            .copied()
            .unwrap_or(0)
    }

    /// The label selector the last `list_pods` call carried.
    pub fn last_list_selector(&self) -> Option<String> {
        self.last_list_selector.lock().clone()
    }
}

fn key(pod: &str, container: &str) -> String {
    format!("{pod}/{container}")
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClientError> {
        *self.last_list_selector.lock() = label_selector.map(str::to_string);
        Ok(self
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn watch_pods(
        &self,
        _namespace: &str,
        _label_selector: Option<&str>,
        _resource_version: &str,
    ) -> Result<PodEventStream, ClientError> {
        let events: Vec<PodEvent> = self.watch_events.lock().drain(..).collect();
        Ok(stream::iter(events.into_iter().map(Ok::<PodEvent, ClientError>))
            .chain(stream::pending())
            .boxed())
    }

    async fn follow_logs(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<LogStream, ClientError> {
        let key = key(pod, container);
        *self.open_counts.lock().entry(key.clone()).or_insert(0) += 1;

        let session = self
            .sessions
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(LogSession::Finite(Vec::new()));

        match session {
            LogSession::Finite(data) => Ok(Box::pin(Cursor::new(data))),
            LogSession::Hanging(data) => Ok(Box::pin(HangingReader { data, pos: 0 })),
            LogSession::ErrorAfter(data, message) => Ok(Box::pin(ErrorAfterReader {
                data,
                pos: 0,
                message,
            })),
            LogSession::OpenError(message) => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::Other,
                message,
            ))),
        }
    }
}

/// Handler that records everything it receives.
#[derive(Default)]
pub struct RecordingHandler {
    records: Mutex<Vec<LogRecord>>,
    errors: Mutex<Vec<StreamError>>,
    ends: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|record| record.message.clone())
            .collect()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// (display, is_permanent) for every error seen.
    pub fn errors(&self) -> Vec<(String, bool)> {
        self.errors
            .lock()
            .iter()
            .map(|error| (error.to_string(), error.is_permanent()))
            .collect()
    }

    pub fn end_count(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }

    /// Polls until at least `n` records arrived; false on timeout.
    pub async fn wait_for_records(&self, n: usize) -> bool {
        wait_until(|| self.records.lock().len() >= n).await
    }

    /// Polls until at least `n` errors arrived; false on timeout.
    pub async fn wait_for_errors(&self, n: usize) -> bool {
        wait_until(|| self.errors.lock().len() >= n).await
    }
}

impl LogHandler for RecordingHandler {
    fn on_log(&self, record: LogRecord) {
        self.records.lock().push(record);
    }

    fn on_error(&self, error: StreamError) {
        self.errors.lock().push(error);
    }

    fn on_end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
