use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{ClientProvider, ClusterClient, KubeClusterClient};
use crate::error::{DefaultClassifier, Error, ErrorClassifier};
use crate::filter::LogFilter;
use crate::format::{LogFormatter, PassthroughFormatter};
use crate::handler::LogHandler;
use crate::matcher::MatcherFactory;
use crate::reassemble::DEFAULT_MAX_MULTILINES;
use crate::retry::RetryPolicy;
use crate::stream::Streamer;

/// Fluent builder for [`Streamer`].
///
/// A filter and a handler are required; everything else has defaults:
/// identity formatting, single-line records, the default retry policy, the
/// default error classifier, and client configuration discovered from the
/// environment.
#[derive(Default)]
pub struct StreamerBuilder {
    provider: ClientProvider,
    client: Option<Arc<dyn ClusterClient>>,
    filter: Option<LogFilter>,
    handler: Option<Arc<dyn LogHandler>>,
    formatter: Option<Arc<dyn LogFormatter>>,
    matcher: Option<Arc<dyn MatcherFactory>>,
    retry: Option<RetryPolicy>,
    max_multilines: Option<usize>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
}

impl StreamerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses this Kubernetes client configuration directly.
    pub fn kube_config(mut self, config: kube::Config) -> Self {
        self.provider = self.provider.with_config(config);
        self
    }

    /// Loads client configuration from this kubeconfig file.
    pub fn kubeconfig_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.provider = self.provider.with_kubeconfig_path(path);
        self
    }

    /// Overrides the kubeconfig context.
    pub fn kube_context(mut self, context: impl Into<String>) -> Self {
        self.provider = self.provider.with_context(context);
        self
    }

    /// Uses an already constructed `kube::Client`.
    pub fn kube_client(mut self, client: kube::Client) -> Self {
        self.client = Some(Arc::new(KubeClusterClient::new(client)));
        self
    }

    /// Injects a cluster client; useful for testing with a fake.
    pub fn cluster_client(mut self, client: Arc<dyn ClusterClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the pod/container/record filter (required).
    pub fn filter(mut self, filter: LogFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the record handler (required).
    pub fn handler(mut self, handler: impl LogHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sets the formatter applied to each record before handoff.
    pub fn formatter(mut self, formatter: impl LogFormatter + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Enables multi-line reassembly with this matcher factory, e.g.
    /// `JavaStackMatcher::new` or `|| JsonObjectMatcher::new()`.
    pub fn matcher(mut self, factory: impl MatcherFactory + 'static) -> Self {
        self.matcher = Some(Arc::new(factory));
        self
    }

    /// Overrides the retry policy for watchers and followers.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Bounds the number of lines merged into one record; zero selects the
    /// default of [`DEFAULT_MAX_MULTILINES`].
    pub fn max_multilines(mut self, max: usize) -> Self {
        self.max_multilines = Some(max);
        self
    }

    /// Overrides pod-gone / permanent error classification.
    pub fn classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Validates the configuration, resolves the cluster client, and
    /// assembles a ready streamer.
    pub async fn build(self) -> Result<Streamer, Error> {
        let filter = self.filter.ok_or(Error::MissingFilter)?;
        filter.validate()?;
        let handler = self.handler.ok_or(Error::MissingHandler)?;

        let retry = self.retry.unwrap_or_default();
        retry.validate()?;

        let client = match self.client {
            Some(client) => client,
            None => {
                let kube_client = self.provider.build().await?;
                Arc::new(KubeClusterClient::new(kube_client)) as Arc<dyn ClusterClient>
            }
        };

        let formatter = self
            .formatter
            .unwrap_or_else(|| Arc::new(PassthroughFormatter));
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(DefaultClassifier));
        let max_multilines = match self.max_multilines {
            Some(0) | None => DEFAULT_MAX_MULTILINES,
            Some(max) => max,
        };

        Ok(Streamer::new(
            client,
            filter,
            handler,
            formatter,
            self.matcher,
            classifier,
            retry,
            max_multilines,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ConsoleHandler;

    #[tokio::test]
    async fn missing_filter_is_rejected() {
        let result = StreamerBuilder::new()
            .handler(ConsoleHandler::new())
            .build()
            .await;
        assert!(matches!(result, Err(Error::MissingFilter)));
    }

    #[tokio::test]
    async fn missing_handler_is_rejected() {
        let filter = LogFilter::builder().namespace("default").build().unwrap();
        let result = StreamerBuilder::new().filter(filter).build().await;
        assert!(matches!(result, Err(Error::MissingHandler)));
    }

    #[tokio::test]
    async fn bad_retry_policy_is_rejected() {
        let filter = LogFilter::builder().namespace("default").build().unwrap();
        let result = StreamerBuilder::new()
            .filter(filter)
            .handler(ConsoleHandler::new())
            .retry_policy(RetryPolicy {
                multiplier: 0.1,
                ..RetryPolicy::default()
            })
            .build()
            .await;
        assert!(matches!(result, Err(Error::InvalidRetryPolicy(_))));
    }
}
