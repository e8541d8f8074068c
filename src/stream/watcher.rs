use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

use super::{follower, WorkerContext};
use crate::client::PodEvent;
use crate::error::StreamError;
use crate::retry::Backoff;

const PHASE_SUCCEEDED: &str = "Succeeded";
const PHASE_FAILED: &str = "Failed";

/// Maintains the set of followed pods for one namespace.
///
/// Listens to the pod watch from resource version `"0"`, spawning followers
/// for newly matching pods and retiring finished or deleted ones. A closed
/// watch (the server's bounded timeout) is reopened; open failures back off
/// like a follower's and eventually end this watcher alone.
pub(crate) struct PodWatcher {
    cx: Arc<WorkerContext>,
    namespace: String,
}

impl PodWatcher {
    pub fn new(cx: Arc<WorkerContext>, namespace: String) -> Self {
        Self { cx, namespace }
    }

    pub async fn run(self) {
        let mut backoff = Backoff::new(&self.cx.retry);
        let mut open_failures: u32 = 0;

        loop {
            if self.cx.cancel.is_cancelled() {
                return;
            }

            let watch = tokio::select! {
                _ = self.cx.cancel.cancelled() => return,
                watch = self.cx.client.watch_pods(
                    &self.namespace,
                    self.cx.filter.label_selector.as_deref(),
                    "0",
                ) => watch,
            };

            let mut events = match watch {
                Ok(events) => events,
                Err(err) => {
                    if self.cx.classifier.is_permanent(&err) {
                        warn!(namespace = %self.namespace, error = %err, "pod watch failed permanently");
                        self.cx.handler.on_error(StreamError::permanent(
                            format!("failed to watch pods in namespace {}", self.namespace),
                            Some(err),
                        ));
                        return;
                    }
                    self.cx.handler.on_error(StreamError::transient(
                        format!("failed to watch pods in namespace {}", self.namespace),
                        Some(err),
                    ));
                    open_failures += 1;
                    if open_failures > self.cx.retry.max_retries {
                        self.cx.handler.on_error(StreamError::permanent(
                            format!("pod watch retries exceeded for namespace {}", self.namespace),
                            None,
                        ));
                        return;
                    }
                    let delay = backoff.next_delay();
                    tokio::select! {
                        _ = self.cx.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };

            open_failures = 0;
            backoff.reset();

            loop {
                let event = tokio::select! {
                    _ = self.cx.cancel.cancelled() => return,
                    event = events.next() => event,
                };
                match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(err)) => {
                        debug!(namespace = %self.namespace, error = %err, "pod watch stream error, reopening");
                        break;
                    }
                    None => {
                        debug!(namespace = %self.namespace, "pod watch closed, reopening");
                        break;
                    }
                }
            }
        }
    }

    fn handle_event(&self, event: PodEvent) {
        match event {
            PodEvent::Added(pod) | PodEvent::Modified(pod) => {
                let Some(name) = pod.metadata.name.clone() else {
                    return;
                };
                // The active set makes duplicate events idempotent.
                if self.cx.filter.matches_pod(&name) && !self.cx.active.contains(&name) {
                    follower::spawn_for_pod(&self.cx, &self.namespace, &pod);
                }
                if pod_finished(&pod) {
                    self.cx.active.remove(&name);
                }
            }
            PodEvent::Deleted(pod) => {
                if let Some(name) = &pod.metadata.name {
                    debug!(namespace = %self.namespace, pod = %name, "pod deleted");
                    self.cx.active.remove(name);
                }
            }
        }
    }
}

/// True when the pod reached a phase that produces no further logs.
fn pod_finished(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .map(|phase| phase == PHASE_SUCCEEDED || phase == PHASE_FAILED)
        .unwrap_or(false)
}
