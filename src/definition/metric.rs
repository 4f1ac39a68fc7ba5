//! Metric - trackable event counter, locally defined or remote-backed

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Definition;
use crate::adapter::Adapter;
use crate::id::normalize;
use crate::Result;

/// Where a metric's definition comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetricSource {
    /// Declared by a definition file.
    Local,
    /// Declared in configuration and bound to a remote URL.
    Remote {
        /// Remote endpoint the metric is bound to.
        url: String,
    },
}

/// Metric definition.
///
/// Tracking always goes through the datastore adapter; for remote metrics
/// the URL is carried for collaborators that pull or push remote values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metric {
    id: String,
    name: String,
    description: Option<String>,
    source: MetricSource,
}

impl Metric {
    /// Create a local metric, deriving the id from `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        MetricBuilder::new(name).build()
    }

    /// Create a builder for constructing a metric with optional fields.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> MetricBuilder {
        MetricBuilder::new(name)
    }

    /// Create a metric bound to a remote URL.
    #[must_use]
    pub fn remote(id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        MetricBuilder::new(id.clone())
            .id(id)
            .source(MetricSource::Remote { url: url.into() })
            .build()
    }

    /// Get the metric description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Where the metric was declared.
    #[must_use]
    pub const fn source(&self) -> &MetricSource {
        &self.source
    }

    /// Remote URL, for remote-backed metrics.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            MetricSource::Remote { url } => Some(url),
            MetricSource::Local => None,
        }
    }

    /// Track `count` occurrences now.
    ///
    /// # Errors
    /// Returns adapter errors
    pub fn track(&self, adapter: &dyn Adapter, count: i64) -> Result<()> {
        self.track_at(adapter, Utc::now(), None, &[count])
    }

    /// Track `values` at `timestamp` on behalf of `identity`.
    ///
    /// # Errors
    /// Returns adapter errors
    pub fn track_at(
        &self,
        adapter: &dyn Adapter,
        timestamp: DateTime<Utc>,
        identity: Option<&str>,
        values: &[i64],
    ) -> Result<()> {
        adapter.metric_track(&self.id, timestamp, identity, values)
    }

    /// Daily totals for `from..=to`.
    ///
    /// # Errors
    /// Returns adapter errors
    pub fn values(&self, adapter: &dyn Adapter, from: NaiveDate, to: NaiveDate) -> Result<Vec<i64>> {
        adapter.metric_values(&self.id, from, to)
    }
}

impl Definition for Metric {
    const KIND: &'static str = "metric";

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for `Metric`.
#[derive(Debug)]
pub struct MetricBuilder {
    id: Option<String>,
    name: String,
    description: Option<String>,
    source: MetricSource,
}

impl MetricBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            source: MetricSource::Local,
        }
    }

    /// Use an explicit id instead of deriving one from the name.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the source.
    #[must_use]
    pub fn source(mut self, source: MetricSource) -> Self {
        self.source = source;
        self
    }

    /// Build the `Metric`.
    #[must_use]
    pub fn build(self) -> Metric {
        Metric {
            id: self.id.unwrap_or_else(|| normalize(&self.name)),
            name: self.name,
            description: self.description,
            source: self.source,
        }
    }
}
