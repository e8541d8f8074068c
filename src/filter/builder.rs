use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::{ContainerState, LogFilter};
use crate::error::FilterError;

/// Fluent builder for [`LogFilter`].
///
/// Regex patterns are compiled at [`build`](Self::build); the first invalid
/// pattern fails the build with [`FilterError::InvalidRegex`].
#[derive(Debug, Default)]
pub struct FilterBuilder {
    namespaces: Vec<String>,
    pod_pattern: Option<String>,
    container_pattern: Option<String>,
    include_pattern: Option<String>,
    labels: Vec<(String, String)>,
    label_selector: Option<String>,
    since: Option<DateTime<Utc>>,
    container_state: ContainerState,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a namespace to stream from.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    /// Restricts pods to names matching this regex.
    pub fn pod_regex(mut self, pattern: impl Into<String>) -> Self {
        self.pod_pattern = Some(pattern.into());
        self
    }

    /// Restricts containers to names matching this regex.
    pub fn container_regex(mut self, pattern: impl Into<String>) -> Self {
        self.container_pattern = Some(pattern.into());
        self
    }

    /// Only delivers records whose assembled message matches this regex.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_pattern = Some(pattern.into());
        self
    }

    /// Adds an equality label requirement; requirements join with `,`.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Sets a raw label selector expression in kubectl syntax
    /// (e.g. `app=web,env=prod`); takes precedence over [`label`](Self::label).
    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    /// Only streams logs newer than this instant.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Only streams logs newer than `ago` before now.
    pub fn since_ago(self, ago: Duration) -> Self {
        match chrono::Duration::from_std(ago) {
            Ok(delta) => match Utc::now().checked_sub_signed(delta) {
                Some(instant) => self.since(instant),
                None => self,
            },
            Err(_) => self,
        }
    }

    /// Restricts which container states are followed.
    pub fn container_state(mut self, state: ContainerState) -> Self {
        self.container_state = state;
        self
    }

    /// Compiles the patterns, assembles the filter, and validates it.
    pub fn build(self) -> Result<LogFilter, FilterError> {
        let label_selector = self.label_selector.or_else(|| {
            if self.labels.is_empty() {
                None
            } else {
                Some(
                    self.labels
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(","),
                )
            }
        });

        let filter = LogFilter {
            namespaces: self.namespaces,
            pod_regex: compile(self.pod_pattern)?,
            container_regex: compile(self.container_pattern)?,
            label_selector,
            include_regex: compile(self.include_pattern)?,
            since: self.since,
            container_state: self.container_state,
        };
        filter.validate()?;
        Ok(filter)
    }
}

fn compile(pattern: Option<String>) -> Result<Option<Regex>, FilterError> {
    match pattern {
        Some(pattern) if !pattern.is_empty() => Ok(Some(Regex::new(&pattern)?)),
        _ => Ok(None),
    }
}
