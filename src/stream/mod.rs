//! The streaming engine: lifecycle coordination, per-namespace pod watchers,
//! and per-container log followers.

mod follower;
mod watcher;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::client::ClusterClient;
use crate::error::{Error, ErrorClassifier};
use crate::filter::LogFilter;
use crate::format::LogFormatter;
use crate::handler::LogHandler;
use crate::matcher::MatcherFactory;
use crate::retry::RetryPolicy;

use watcher::PodWatcher;

/// Pods currently being followed, keyed by pod name.
///
/// Watchers insert on discovery and remove on deletion or terminal phase;
/// followers remove when the server reports the container gone. Scoped to
/// one [`Streamer`] instance.
#[derive(Default)]
pub(crate) struct ActivePods {
    pods: DashMap<String, ()>,
}

impl ActivePods {
    pub fn insert(&self, pod_name: &str) {
        self.pods.insert(pod_name.to_string(), ());
    }

    pub fn remove(&self, pod_name: &str) {
        self.pods.remove(pod_name);
    }

    pub fn contains(&self, pod_name: &str) -> bool {
        self.pods.contains_key(pod_name)
    }
}

/// Everything a worker needs, shared across watchers and followers.
pub(crate) struct WorkerContext {
    pub client: Arc<dyn ClusterClient>,
    pub filter: Arc<LogFilter>,
    pub handler: Arc<dyn LogHandler>,
    pub formatter: Arc<dyn LogFormatter>,
    pub matcher: Option<Arc<dyn MatcherFactory>>,
    pub classifier: Arc<dyn ErrorClassifier>,
    pub retry: RetryPolicy,
    pub max_multilines: usize,
    pub active: ActivePods,
    pub tracker: TaskTracker,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamerState {
    Ready,
    Running,
    Stopped,
}

/// Multiplexes container log streams from matching pods into the handler.
///
/// Built by [`StreamerBuilder`](crate::StreamerBuilder). `start` may be
/// called once per instance; `stop` any number of times. Dropping a running
/// streamer without calling `stop` cancels its workers but skips the drain
/// and the `on_end` callback.
pub struct Streamer {
    context: Arc<WorkerContext>,
    state: Mutex<StreamerState>,
}

impl Streamer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client: Arc<dyn ClusterClient>,
        filter: LogFilter,
        handler: Arc<dyn LogHandler>,
        formatter: Arc<dyn LogFormatter>,
        matcher: Option<Arc<dyn MatcherFactory>>,
        classifier: Arc<dyn ErrorClassifier>,
        retry: RetryPolicy,
        max_multilines: usize,
    ) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                client,
                filter: Arc::new(filter),
                handler,
                formatter,
                matcher,
                classifier,
                retry,
                max_multilines,
                active: ActivePods::default(),
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
            state: Mutex::new(StreamerState::Ready),
        }
    }

    /// Launches one watcher per namespace plus followers for the pods that
    /// already match.
    ///
    /// Every namespace is listed before anything is spawned, so a listing
    /// failure is returned synchronously with nothing left running.
    /// Cancelling `ctx` stops all workers; call [`stop`](Self::stop) to
    /// drain them and fire `on_end`.
    pub async fn start(&self, ctx: &CancellationToken) -> Result<(), Error> {
        {
            let mut state = self.state.lock().await;
            match *state {
                StreamerState::Ready => *state = StreamerState::Running,
                StreamerState::Running => return Err(Error::AlreadyStarted),
                StreamerState::Stopped => return Err(Error::Stopped),
            }
        }

        let cx = &self.context;

        // Fail fast: list every namespace before launching anything.
        let mut initial = Vec::new();
        for namespace in &cx.filter.namespaces {
            let pods = match cx
                .client
                .list_pods(namespace, cx.filter.label_selector.as_deref())
                .await
            {
                Ok(pods) => pods,
                Err(source) => {
                    // Nothing was spawned; the instance stays usable.
                    *self.state.lock().await = StreamerState::Ready;
                    return Err(Error::InitialList {
                        namespace: namespace.clone(),
                        source,
                    });
                }
            };
            initial.push((namespace.clone(), pods));
        }

        // Link the caller's cancellation to the internal stop signal.
        let caller = ctx.clone();
        let shutdown = cx.cancel.clone();
        cx.tracker.spawn(async move {
            tokio::select! {
                _ = caller.cancelled() => shutdown.cancel(),
                _ = shutdown.cancelled() => {}
            }
        });

        for (namespace, pods) in initial {
            debug!(namespace = %namespace, pods = pods.len(), "starting namespace watch");
            for pod in &pods {
                follower::spawn_for_pod(cx, &namespace, pod);
            }
            cx.tracker.spawn(PodWatcher::new(Arc::clone(cx), namespace).run());
        }
        Ok(())
    }

    /// Stops all workers, waits for them to drain, then fires `on_end`.
    ///
    /// Idempotent: only the first call does the work, and `on_end` fires
    /// exactly once. Stopping a never-started streamer transitions it
    /// straight to stopped and still fires `on_end`. Once `stop` returns no
    /// further handler callbacks occur.
    pub async fn stop(&self) {
        // The state lock is held across the drain so concurrent stops
        // cannot return before on_end has fired.
        let mut state = self.state.lock().await;
        if *state == StreamerState::Stopped {
            return;
        }
        *state = StreamerState::Stopped;

        let cx = &self.context;
        cx.cancel.cancel();
        cx.tracker.close();
        cx.tracker.wait().await;
        cx.handler.on_end();
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.context.cancel.cancel();
    }
}
