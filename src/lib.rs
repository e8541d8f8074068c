//! Multiplexed Kubernetes container log streaming.
//!
//! `kubemux` discovers pods matching a declarative filter across one or more
//! namespaces, follows every matching container's log stream, optionally
//! reassembles multi-line records (stack traces, pretty-printed JSON), and
//! delivers each record to a user-supplied handler with retry and graceful
//! shutdown semantics.
//!
//! Pods are tracked continuously: a watcher per namespace converges the set
//! of followed containers as pods appear, finish, and disappear, while each
//! follower reconnects with exponential backoff on transient failures and
//! exits quietly when its container is gone.
//!
//! # Example
//!
//! ```no_run
//! use kubemux::{JavaStackMatcher, ConsoleHandler, LogFilter, StreamerBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), kubemux::Error> {
//! let filter = LogFilter::builder()
//!     .namespace("default")
//!     .pod_regex("^api-")
//!     .include("ERROR")
//!     .build()?;
//!
//! let streamer = StreamerBuilder::new()
//!     .filter(filter)
//!     .handler(ConsoleHandler::new())
//!     .matcher(JavaStackMatcher::new)
//!     .build()
//!     .await?;
//!
//! let ctx = CancellationToken::new();
//! streamer.start(&ctx).await?;
//! // ... later
//! streamer.stop().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
mod error;
mod filter;
mod format;
mod handler;
mod matcher;
mod reassemble;
mod record;
mod retry;
mod scanner;
mod stream;

pub use builder::StreamerBuilder;
pub use client::{
    ClientProvider, ClusterClient, KubeClusterClient, LogStream, PodEvent, PodEventStream,
};
pub use error::{
    ClientError, DefaultClassifier, Error, ErrorClassifier, FilterError, StreamError,
};
pub use filter::{ContainerState, FilterBuilder, LogFilter};
pub use format::{JsonFormatter, LogFormatter, PassthroughFormatter, TextFormatter};
pub use handler::{ConsoleHandler, LogHandler};
pub use matcher::{JavaStackMatcher, JsonObjectMatcher, MatcherFactory, MultilineMatcher};
pub use reassemble::DEFAULT_MAX_MULTILINES;
pub use record::LogRecord;
pub use retry::RetryPolicy;
pub use stream::Streamer;
