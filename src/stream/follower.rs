use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

use super::WorkerContext;
use crate::client::LogStream;
use crate::error::{ClientError, StreamError};
use crate::reassemble::{AssembledRecord, Reassembler};
use crate::record::LogRecord;
use crate::retry::Backoff;
use crate::scanner::LineScanner;

/// Marks the pod active and spawns one follower per matching container.
pub(crate) fn spawn_for_pod(cx: &Arc<WorkerContext>, namespace: &str, pod: &Pod) {
    let Some(pod_name) = pod.metadata.name.clone() else {
        return;
    };
    if !cx.filter.matches_pod(&pod_name) {
        return;
    }
    let Some(spec) = &pod.spec else {
        return;
    };

    cx.active.insert(&pod_name);

    for container in &spec.containers {
        if !cx.filter.matches_container(&container.name) {
            continue;
        }
        let follower = Follower {
            cx: Arc::clone(cx),
            namespace: namespace.to_string(),
            pod_name: pod_name.clone(),
            container_name: container.name.clone(),
        };
        cx.tracker.spawn(follower.run());
    }
}

/// How one pass over an open log stream ended.
enum StreamOutcome {
    Cancelled,
    PodGone,
    Transient(ClientError),
    Permanent(ClientError),
}

/// Follows one container's log stream until the pod goes away, an
/// unrecoverable error occurs, or the streamer shuts down.
struct Follower {
    cx: Arc<WorkerContext>,
    namespace: String,
    pod_name: String,
    container_name: String,
}

impl Follower {
    async fn run(self) {
        let mut backoff = Backoff::new(&self.cx.retry);
        let mut open_failures: u32 = 0;

        debug!(
            namespace = %self.namespace,
            pod = %self.pod_name,
            container = %self.container_name,
            "starting log follower"
        );

        loop {
            if self.cx.cancel.is_cancelled() {
                return;
            }
            // The watcher retires pods by dropping them from the active set.
            if !self.cx.active.contains(&self.pod_name) {
                return;
            }

            let opened = tokio::select! {
                _ = self.cx.cancel.cancelled() => return,
                opened = self.cx.client.follow_logs(
                    &self.namespace,
                    &self.pod_name,
                    &self.container_name,
                    self.cx.filter.since,
                ) => opened,
            };

            let stream = match opened {
                Ok(stream) => stream,
                Err(err) => {
                    if self.cx.classifier.is_pod_gone(&err) {
                        self.cx.active.remove(&self.pod_name);
                        return;
                    }
                    if self.cx.classifier.is_permanent(&err) {
                        self.report_permanent("failed to stream logs", Some(err));
                        return;
                    }
                    self.cx.handler.on_error(StreamError::transient(
                        self.describe("failed to stream logs"),
                        Some(err),
                    ));
                    open_failures += 1;
                    if open_failures > self.cx.retry.max_retries {
                        self.cx.handler.on_error(StreamError::permanent(
                            self.describe("log stream retries exceeded"),
                            None,
                        ));
                        return;
                    }
                    if !self.sleep(&mut backoff).await {
                        return;
                    }
                    continue;
                }
            };

            open_failures = 0;
            backoff.reset();

            match self.pump(stream).await {
                StreamOutcome::Cancelled => return,
                StreamOutcome::PodGone => {
                    debug!(
                        pod = %self.pod_name,
                        container = %self.container_name,
                        "container gone, follower exiting"
                    );
                    self.cx.active.remove(&self.pod_name);
                    return;
                }
                StreamOutcome::Permanent(err) => {
                    self.report_permanent("log stream read error", Some(err));
                    return;
                }
                StreamOutcome::Transient(err) => {
                    self.cx.handler.on_error(StreamError::transient(
                        self.describe("log stream read error"),
                        Some(err),
                    ));
                    if !self.sleep(&mut backoff).await {
                        return;
                    }
                }
            }
        }
    }

    /// Drives scanner and reassembler over one open stream, delivering
    /// records until it terminates.
    async fn pump(&self, stream: LogStream) -> StreamOutcome {
        let mut scanner = LineScanner::new(stream);
        let mut reassembler = Reassembler::new(
            self.cx.matcher.as_ref().map(|factory| factory.make()),
            self.cx.max_multilines,
        );

        loop {
            let next = tokio::select! {
                _ = self.cx.cancel.cancelled() => return StreamOutcome::Cancelled,
                next = scanner.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    if let Some(record) = reassembler.push(line) {
                        self.deliver(record);
                    }
                }
                Ok(None) => {
                    // Stream end means the container is gone; flush first.
                    if let Some(record) = reassembler.finish() {
                        self.deliver(record);
                    }
                    return StreamOutcome::PodGone;
                }
                Err(err) => {
                    if let Some(record) = reassembler.finish() {
                        self.deliver(record);
                    }
                    let err = ClientError::Io(err);
                    if self.cx.classifier.is_pod_gone(&err) {
                        return StreamOutcome::PodGone;
                    }
                    if self.cx.classifier.is_permanent(&err) {
                        return StreamOutcome::Permanent(err);
                    }
                    return StreamOutcome::Transient(err);
                }
            }
        }
    }

    /// Applies the include filter and formatter, then hands the record off.
    fn deliver(&self, assembled: AssembledRecord) {
        if !self.cx.filter.matches_record(&assembled.message) {
            return;
        }
        let mut record = LogRecord::new(
            self.namespace.clone(),
            self.pod_name.clone(),
            self.container_name.clone(),
            assembled.message,
            assembled.raw,
        );
        record.message = self.cx.formatter.format(&record);
        self.cx.handler.on_log(record);
    }

    /// Backoff sleep; false when cancelled.
    async fn sleep(&self, backoff: &mut Backoff) -> bool {
        let delay = backoff.next_delay();
        tokio::select! {
            _ = self.cx.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn report_permanent(&self, what: &str, source: Option<ClientError>) {
        warn!(
            pod = %self.pod_name,
            container = %self.container_name,
            "follower hit a permanent error"
        );
        self.cx
            .handler
            .on_error(StreamError::permanent(self.describe(what), source));
    }

    fn describe(&self, what: &str) -> String {
        format!(
            "{what} for pod {} container {}",
            self.pod_name, self.container_name
        )
    }
}
