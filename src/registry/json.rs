//! Built-in JSON definition format
//!
//! Experiments live in `<load_path>/*.json`, metrics in
//! `<load_path>/metrics/*.json`. A file holds one definition object or an
//! array of them:
//!
//! ```json
//! {
//!   "name": "Checkout Button",
//!   "description": "Button color on the checkout page",
//!   "alternatives": ["red", "green"],
//!   "metrics": ["signups"]
//! }
//! ```
//!
//! Without a `name`, a single-object file takes its id from the file stem.
//! Metric ids listed by an experiment are resolved through the playground,
//! which loads the metrics registry if needed.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{DefinitionLoader, LoadContext};
use crate::definition::{Definition, Experiment, Metric};
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

#[derive(Debug, Deserialize)]
struct ExperimentEntry {
    name: Option<String>,
    description: Option<String>,
    alternatives: Option<Vec<Value>>,
    #[serde(default)]
    metrics: Vec<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MetricEntry {
    name: Option<String>,
    description: Option<String>,
}

/// `(name, explicit id, entry)` triples of one file.
type Entries<T> = Vec<(String, Option<String>, T)>;

fn read_entries<D, T>(ctx: &LoadContext<'_, D>) -> Result<Entries<T>>
where
    D: Definition,
    T: DeserializeOwned + Named,
{
    let text = std::fs::read_to_string(ctx.path())?;
    let parsed: OneOrMany<T> =
        serde_json::from_str(&text).map_err(|e| ctx.error(e.to_string()))?;

    match parsed {
        OneOrMany::One(entry) => {
            let name = entry.name().map_or_else(|| ctx.file_id(), str::to_string);
            let id = entry.name().is_none().then(|| ctx.file_id());
            Ok(vec![(name, id, entry)])
        }
        OneOrMany::Many(entries) => entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| {
                let name = entry
                    .name()
                    .map(str::to_string)
                    .ok_or_else(|| ctx.error(format!("entry {position} has no name")))?;
                Ok((name, None, entry))
            })
            .collect(),
    }
}

trait Named {
    fn name(&self) -> Option<&str>;
}

impl Named for ExperimentEntry {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Named for MetricEntry {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Loads experiments from JSON files.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExperimentLoader;

impl DefinitionLoader<Experiment> for JsonExperimentLoader {
    fn load(&self, ctx: &LoadContext<'_, Experiment>) -> Result<()> {
        for (name, id, entry) in read_entries::<Experiment, ExperimentEntry>(ctx)? {
            let mut builder = Experiment::builder(name);
            if let Some(id) = id {
                builder = builder.id(id);
            }
            if let Some(description) = entry.description {
                builder = builder.description(description);
            }
            if let Some(alternatives) = entry.alternatives {
                if alternatives.is_empty() {
                    return Err(ctx.error("an experiment needs at least one alternative"));
                }
                builder = builder.alternatives(alternatives);
            }
            if let Some(created_at) = entry.created_at {
                builder = builder.created_at(created_at);
            }
            for metric_id in entry.metrics {
                let metric = ctx
                    .playground()
                    .metric(&metric_id)
                    .map_err(|e| ctx.error(e.to_string()))?;
                builder = builder.metric(metric.id());
            }
            ctx.register(builder.build());
        }
        Ok(())
    }
}

/// Loads metrics from JSON files.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMetricLoader;

impl DefinitionLoader<Metric> for JsonMetricLoader {
    fn load(&self, ctx: &LoadContext<'_, Metric>) -> Result<()> {
        for (name, id, entry) in read_entries::<Metric, MetricEntry>(ctx)? {
            let mut builder = Metric::builder(name);
            if let Some(id) = id {
                builder = builder.id(id);
            }
            if let Some(description) = entry.description {
                builder = builder.description(description);
            }
            ctx.register(builder.build());
        }
        Ok(())
    }
}
