//! Cluster access: the client trait the engine consumes and its kube-backed
//! implementation, plus client configuration discovery.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::AsyncRead;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::WatchEvent;

use crate::error::{ClientError, Error};

/// Seconds before the server closes a single pod watch; bounded so workers
/// re-check cancellation even on quiet namespaces.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// A pod lifecycle event observed while watching a namespace.
#[derive(Debug)]
pub enum PodEvent {
    Added(Pod),
    Modified(Pod),
    Deleted(Pod),
}

/// Byte stream of a followed container log.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Stream of pod events for one namespace.
pub type PodEventStream = BoxStream<'static, Result<PodEvent, ClientError>>;

/// Cluster operations the streaming engine needs.
///
/// Implementations never retry; backoff and reconnection are the caller's
/// concern. A fake implementation is all the engine needs for testing.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lists pods in a namespace, optionally restricted by a label selector.
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClientError>;

    /// Watches pods in a namespace starting from the given resource version.
    async fn watch_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        resource_version: &str,
    ) -> Result<PodEventStream, ClientError>;

    /// Opens a follow-mode log stream for one container.
    async fn follow_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<LogStream, ClientError>;
}

/// [`ClusterClient`] backed by a real `kube::Client`.
pub struct KubeClusterClient {
    client: kube::Client,
}

impl KubeClusterClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClientError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self.pods(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn watch_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        resource_version: &str,
    ) -> Result<PodEventStream, ClientError> {
        let mut params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let events = self.pods(namespace).watch(&params, resource_version).await?;
        let stream = events.filter_map(|event| async move {
            match event {
                Ok(WatchEvent::Added(pod)) => Some(Ok(PodEvent::Added(pod))),
                Ok(WatchEvent::Modified(pod)) => Some(Ok(PodEvent::Modified(pod))),
                Ok(WatchEvent::Deleted(pod)) => Some(Ok(PodEvent::Deleted(pod))),
                Ok(WatchEvent::Bookmark(_)) => None,
                Ok(WatchEvent::Error(status)) => Some(Err(ClientError::WatchEvent {
                    message: status.message,
                    code: status.code,
                })),
                Err(err) => Some(Err(ClientError::Api(err))),
            }
        });
        Ok(stream.boxed())
    }

    async fn follow_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<LogStream, ClientError> {
        let params = LogParams {
            follow: true,
            container: Some(container.to_string()),
            since_time: since,
            ..LogParams::default()
        };
        let stream = self.pods(namespace).log_stream(pod, &params).await?;
        Ok(Box::pin(stream))
    }
}

/// Resolves a `kube::Client` from explicit configuration, an explicit
/// kubeconfig path, or the ambient environment.
///
/// Precedence: explicit `kube::Config` > explicit kubeconfig path >
/// in-cluster configuration > the default kubeconfig. A context override
/// applies to every kubeconfig-based source.
#[derive(Default)]
pub struct ClientProvider {
    config: Option<kube::Config>,
    kubeconfig_path: Option<PathBuf>,
    context: Option<String>,
}

impl ClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses this configuration directly, skipping discovery.
    pub fn with_config(mut self, config: kube::Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads configuration from this kubeconfig file.
    pub fn with_kubeconfig_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig_path = Some(path.into());
        self
    }

    /// Overrides the kubeconfig context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Builds the client according to the precedence above.
    pub async fn build(self) -> Result<kube::Client, Error> {
        if let Some(config) = self.config {
            return Ok(kube::Client::try_from(config)?);
        }

        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..KubeConfigOptions::default()
        };

        if let Some(path) = self.kubeconfig_path {
            if !path.exists() {
                return Err(Error::KubeconfigNotFound(path));
            }
            let kubeconfig = Kubeconfig::read_from(&path)?;
            let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
            return Ok(kube::Client::try_from(config)?);
        }

        if self.context.is_some() {
            // A context override implies the kubeconfig, not in-cluster.
            let config = kube::Config::from_kubeconfig(&options).await?;
            return Ok(kube::Client::try_from(config)?);
        }

        let config = kube::Config::infer().await?;
        Ok(kube::Client::try_from(config)?)
    }
}
