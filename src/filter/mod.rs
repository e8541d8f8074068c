//! Declarative selection of which pods, containers, and records are streamed.

mod builder;

pub use builder::FilterBuilder;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::FilterError;

/// Which container states are followed.
///
/// Accepted and validated; the streaming engine currently follows matching
/// containers regardless of state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerState {
    /// Follow containers in any state
    #[default]
    All,
    /// Only containers currently running
    Running,
    /// Only containers that have terminated
    Terminated,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::All => "all",
            ContainerState::Running => "running",
            ContainerState::Terminated => "terminated",
        }
    }
}

impl FromStr for ContainerState {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ContainerState::All),
            "running" => Ok(ContainerState::Running),
            "terminated" => Ok(ContainerState::Terminated),
            other => Err(FilterError::InvalidContainerState(other.to_string())),
        }
    }
}

/// Filtering criteria for streamed logs.
///
/// Immutable once built; construct through [`FilterBuilder`]. Label
/// filtering is delegated to the API server via the selector expression,
/// name filtering happens client-side through the regexes, and the include
/// regex is applied to fully assembled records only.
#[derive(Debug, Clone)]
pub struct LogFilter {
    /// Namespaces to stream from; at least one is required
    pub namespaces: Vec<String>,
    /// Pods must match this name regex when set
    pub pod_regex: Option<Regex>,
    /// Containers must match this name regex when set
    pub container_regex: Option<Regex>,
    /// Label selector expression passed to the API server
    pub label_selector: Option<String>,
    /// Only records whose assembled message matches are delivered
    pub include_regex: Option<Regex>,
    /// Only stream logs newer than this instant
    pub since: Option<DateTime<Utc>>,
    /// Container state restriction
    pub container_state: ContainerState,
}

impl LogFilter {
    pub fn builder() -> FilterBuilder {
        FilterBuilder::new()
    }

    fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
            && self.pod_regex.is_none()
            && self.container_regex.is_none()
            && self.label_selector.is_none()
            && self.include_regex.is_none()
            && self.since.is_none()
            && self.container_state == ContainerState::All
    }

    /// Checks the filter invariants, failing with a distinct error for each
    /// violation.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.is_empty() {
            return Err(FilterError::Empty);
        }
        if self.namespaces.is_empty() {
            return Err(FilterError::NoNamespace);
        }
        if self.namespaces.iter().any(|ns| ns.is_empty()) {
            return Err(FilterError::EmptyNamespace);
        }
        if let Some(since) = self.since {
            if since > Utc::now() {
                return Err(FilterError::SinceInFuture);
            }
        }
        Ok(())
    }

    /// True when the pod name passes the pod regex.
    pub fn matches_pod(&self, pod_name: &str) -> bool {
        self.pod_regex
            .as_ref()
            .map_or(true, |re| re.is_match(pod_name))
    }

    /// True when the container name passes the container regex.
    pub fn matches_container(&self, container_name: &str) -> bool {
        self.container_regex
            .as_ref()
            .map_or(true, |re| re.is_match(container_name))
    }

    /// True when an assembled record's message passes the include regex.
    pub fn matches_record(&self, message: &str) -> bool {
        self.include_regex
            .as_ref()
            .map_or(true, |re| re.is_match(message))
    }
}
