//! Experiment - A/B test definition with ordered alternatives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Definition;
use crate::adapter::Adapter;
use crate::id::normalize;
use crate::{Error, Result};

/// One alternative of an experiment, addressed by its position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alternative {
    index: usize,
    value: Value,
}

impl Alternative {
    /// Create an alternative at `index`.
    #[must_use]
    pub fn new(index: usize, value: impl Into<Value>) -> Self {
        Self {
            index,
            value: value.into(),
        }
    }

    /// Position within the experiment.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Alternative value (any JSON value: `false`, `"red"`, `9.99`, ...).
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }
}

/// Experiment definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    id: String,
    name: String,
    description: Option<String>,
    alternatives: Vec<Alternative>,
    metrics: Vec<String>,
    created_at: DateTime<Utc>,
}

impl Experiment {
    /// Create an A/B experiment with the default `[false, true]` alternatives.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ExperimentBuilder::new(name).build()
    }

    /// Create a builder for constructing an experiment with optional fields.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(name)
    }

    /// Get the experiment description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Alternatives in index order.
    #[must_use]
    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    /// Alternative at `index`, if in range.
    #[must_use]
    pub fn alternative(&self, index: usize) -> Option<&Alternative> {
        self.alternatives.get(index)
    }

    /// Ids of the metrics this experiment measures.
    #[must_use]
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Persist the experiment's creation time in the datastore.
    ///
    /// # Errors
    /// Returns adapter errors
    pub fn save(&self, adapter: &dyn Adapter) -> Result<()> {
        adapter.set_experiment_created_at(&self.id, self.created_at)
    }

    /// Record `identity` as a participant of the alternative at `index`.
    ///
    /// # Errors
    /// Returns error if `index` is out of range, or adapter errors
    pub fn add_participant(&self, adapter: &dyn Adapter, identity: &str, index: usize) -> Result<()> {
        if index >= self.alternatives.len() {
            return Err(Error::Other(format!(
                "Experiment {} has no alternative {index}",
                self.id
            )));
        }
        adapter.ab_add_participant(&self.id, index, identity)
    }
}

impl Definition for Experiment {
    const KIND: &'static str = "experiment";

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: Option<String>,
    name: String,
    description: Option<String>,
    alternatives: Vec<Value>,
    metrics: Vec<String>,
    created_at: DateTime<Utc>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            alternatives: vec![Value::Bool(false), Value::Bool(true)],
            metrics: Vec::new(),
            created_at: Utc::now(),
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

    /// Replace the alternatives.
    #[must_use]
    pub fn alternatives<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.alternatives = values.into_iter().map(Into::into).collect();
        self
    }

    /// Add a measured metric id.
    #[must_use]
    pub fn metric(mut self, id: impl Into<String>) -> Self {
        self.metrics.push(id.into());
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the `Experiment`.
    #[must_use]
    pub fn build(self) -> Experiment {
        Experiment {
            id: self.id.unwrap_or_else(|| normalize(&self.name)),
            name: self.name,
            description: self.description,
            alternatives: self
                .alternatives
                .into_iter()
                .enumerate()
                .map(|(index, value)| Alternative::new(index, value))
                .collect(),
            metrics: self.metrics,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;
    use serde_json::json;

    #[test]
    fn test_experiment_defaults() {
        let experiment = Experiment::new("Price Test");
        assert_eq!(experiment.id(), "price_test");
        assert_eq!(experiment.name(), "Price Test");
        assert_eq!(experiment.alternatives()[0].value(), &json!(false));
        assert_eq!(experiment.alternatives()[1].value(), &json!(true));
        assert!(experiment.description().is_none());
    }

    #[test]
    fn test_experiment_builder() {
        let experiment = Experiment::builder("Price Test")
            .id("pricing")
            .description("Which price converts best")
            .alternatives([9.99, 14.99, 19.99])
            .metric("sales")
            .build();

        assert_eq!(experiment.id(), "pricing");
        assert_eq!(experiment.alternative(2).unwrap().index(), 2);
        assert!(experiment.alternative(3).is_none());
        assert_eq!(experiment.metrics(), ["sales".to_string()]);
    }

    #[test]
    fn test_add_participant_validates_index() {
        let adapter = MockAdapter::default();
        let experiment = Experiment::new("exp");

        experiment.add_participant(&adapter, "alice", 1).unwrap();
        assert_eq!(adapter.ab_assigned("exp", "alice").unwrap(), Some(1));

        let err = experiment.add_participant(&adapter, "bob", 5).unwrap_err();
        assert!(err.to_string().contains("no alternative 5"));
    }

    #[test]
    fn test_save_persists() {
        let adapter = MockAdapter::default();
        let experiment = Experiment::new("exp");
        experiment.save(&adapter).unwrap();
        assert!(adapter.experiment_persisted("exp").unwrap());
    }
}
