//! Datastore adapters
//!
//! The playground never talks to a datastore directly. It asks an
//! [`AdapterRegistry`] for a factory keyed by the `adapter` option and drives
//! the resulting [`Adapter`] through this capability trait.
//!
//! # Example
//!
//! ```rust
//! use trueno_ab::adapter::AdapterRegistry;
//! use trueno_ab::connection::ConnectionOptions;
//!
//! # fn example() -> trueno_ab::Result<()> {
//! let registry = AdapterRegistry::default();
//! let adapter = registry.create(&ConnectionOptions::for_adapter("mock"))?;
//! assert!(adapter.is_active());
//! adapter.disconnect();
//! assert!(!adapter.is_active());
//! # Ok(())
//! # }
//! ```

mod mock;

pub use mock::MockAdapter;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::connection::ConnectionOptions;
use crate::{Error, Result};

/// Capability contract of a live datastore connection.
///
/// Implementations must be cheap to share (`Arc<dyn Adapter>`) and must make
/// `is_active` infallible.
pub trait Adapter: Send + Sync {
    /// Adapter name as registered (e.g. `"mock"`, `"redis"`).
    fn name(&self) -> &str;

    /// Whether the connection is usable.
    fn is_active(&self) -> bool;

    /// Close the connection. Idempotent.
    fn disconnect(&self);

    /// Whether the experiment has been persisted.
    ///
    /// # Errors
    /// Returns error if the datastore is unreachable
    fn experiment_persisted(&self, experiment: &str) -> Result<bool>;

    /// Persist the experiment creation time.
    ///
    /// # Errors
    /// Returns error if the datastore is unreachable
    fn set_experiment_created_at(&self, experiment: &str, at: DateTime<Utc>) -> Result<()>;

    /// Record that `identity` participates in `experiment` with `alternative`.
    ///
    /// # Errors
    /// Returns error if the datastore is unreachable
    fn ab_add_participant(&self, experiment: &str, alternative: usize, identity: &str)
        -> Result<()>;

    /// Alternative index assigned to `identity`, if any.
    ///
    /// # Errors
    /// Returns error if the datastore is unreachable
    fn ab_assigned(&self, experiment: &str, identity: &str) -> Result<Option<usize>>;

    /// Add `values` to the metric's bucket for the day of `timestamp`.
    ///
    /// # Errors
    /// Returns error if the datastore is unreachable
    fn metric_track(
        &self,
        metric: &str,
        timestamp: DateTime<Utc>,
        identity: Option<&str>,
        values: &[i64],
    ) -> Result<()>;

    /// Daily totals (first value) for each day in `from..=to`.
    ///
    /// # Errors
    /// Returns error if the datastore is unreachable
    fn metric_values(&self, metric: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<i64>>;
}

/// Constructs an adapter from canonical options.
pub type AdapterFactory =
    Arc<dyn Fn(&ConnectionOptions) -> Result<Arc<dyn Adapter>> + Send + Sync>;

/// Table of adapter factories keyed by adapter name.
///
/// `BTreeMap` keeps `names()` in a stable order for error messages.
#[derive(Clone)]
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// Registry without any factories.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory under `name`.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateDefinition`] if `name` is already registered
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&ConnectionOptions) -> Result<Arc<dyn Adapter>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::DuplicateDefinition {
                kind: "adapter",
                id: name,
            });
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn replace<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectionOptions) -> Result<Arc<dyn Adapter>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Whether a factory exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered adapter names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build an adapter for `options`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the options name no adapter and
    /// [`Error::Adapter`] if no factory is registered or the factory fails
    pub fn create(&self, options: &ConnectionOptions) -> Result<Arc<dyn Adapter>> {
        let name = options.adapter().ok_or_else(|| {
            Error::Configuration("Connection options do not name an adapter".to_string())
        })?;
        let factory = self.factories.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.names().collect();
            Error::Adapter(format!(
                "No adapter registered for {name} (known: {})",
                known.join(", ")
            ))
        })?;
        factory(options)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.replace("mock", |options| {
            Ok(Arc::new(MockAdapter::new(options.clone())) as Arc<dyn Adapter>)
        });
        registry
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
