//! Experiment and metric definitions
//!
//! Both kinds are keyed by a canonical id derived from their human name
//! (see [`crate::id::normalize`]). Records are immutable once registered;
//! participant and tracking state lives in the datastore behind the adapter.
//!
//! ## Usage
//!
//! ```rust
//! use trueno_ab::definition::{Definition, Experiment, Metric};
//!
//! let experiment = Experiment::builder("Checkout Button")
//!     .alternatives(["red", "green"])
//!     .metric("signups")
//!     .build();
//! assert_eq!(experiment.id(), "checkout_button");
//! assert_eq!(experiment.alternatives().len(), 2);
//!
//! let metric = Metric::new("Signups");
//! assert_eq!(metric.id(), "signups");
//! ```

mod experiment;
mod metric;

pub use experiment::{Alternative, Experiment, ExperimentBuilder};
pub use metric::{Metric, MetricBuilder, MetricSource};

/// A record a [`Registry`](crate::registry::Registry) can hold.
pub trait Definition: Send + Sync + 'static {
    /// Kind name used in log lines and errors ("experiment", "metric").
    const KIND: &'static str;

    /// Canonical identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;
}
