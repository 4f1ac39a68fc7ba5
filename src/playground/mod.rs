//! Playground - composition root
//!
//! Owns the merged configuration, the [`ConnectionManager`], the experiments
//! and metrics registries, the shared [`LoadingGuard`] and the failure hooks.
//! All datastore access goes through [`Playground::connection`].
//!
//! ## Usage
//!
//! ```rust
//! use trueno_ab::Playground;
//!
//! # fn example() -> trueno_ab::Result<()> {
//! let playground = Playground::builder()
//!     .environment("test")
//!     .load_path("experiments")
//!     .connection("mock://localhost")
//!     .autoconnect(true)
//!     .build()?;
//!
//! assert!(playground.is_connected());
//! # Ok(())
//! # }
//! ```

mod builder;
mod global;

pub use builder::{HostFramework, PlaygroundBuilder};
pub use global::{playground, set_playground};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::Level;

use crate::adapter::Adapter;
use crate::config::{ConfigFile, PlaygroundConfig};
use crate::connection::{ConnectionManager, ConnectionSpec};
use crate::definition::{Alternative, Definition, Experiment, Metric};
use crate::hooks::{
    default_datastore_error, default_request_filter, DatastoreErrorHook, FailureHooks, LogSink,
    Request, RequestFilter,
};
use crate::id::normalize;
use crate::registry::{DefinitionMap, LoadingGuard, Registry};
use crate::{Error, Result};

/// One experiment a participant takes part in, with the alternative shown.
pub type Participation = (Arc<Experiment>, Alternative);

/// Experiment/metric registries plus the active datastore connection.
pub struct Playground {
    config: PlaygroundConfig,
    environment: String,
    config_file: Option<ConfigFile>,
    load_path: RwLock<PathBuf>,
    add_participant_path: RwLock<String>,
    logger: RwLock<Arc<dyn LogSink>>,
    collecting: AtomicBool,
    failover_on_datastore_error: AtomicBool,
    use_js: AtomicBool,
    hooks: FailureHooks,
    connection: ConnectionManager,
    loading: LoadingGuard,
    experiments: Registry<Experiment>,
    metrics: Registry<Metric>,
}

impl Playground {
    /// Create a new playground builder.
    #[must_use]
    pub fn builder() -> PlaygroundBuilder {
        PlaygroundBuilder::default()
    }

    /// Build from the process environment and `config/` in the working directory.
    ///
    /// # Errors
    /// Returns error if a config file is malformed or auto-connect fails
    pub fn from_env() -> Result<Self> {
        Self::builder().config_dir("config").build()
    }

    /// Environment selected at build time.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Configuration merged at build time.
    #[must_use]
    pub const fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// Config file the playground was built with.
    #[must_use]
    pub const fn config_file(&self) -> Option<&ConfigFile> {
        self.config_file.as_ref()
    }

    // ------------------------------------------------------------------
    // Settable fields
    // ------------------------------------------------------------------

    /// Directory scanned for definitions.
    #[must_use]
    pub fn load_path(&self) -> PathBuf {
        self.load_path.read().clone()
    }

    /// Change the definitions directory; takes effect on the next load.
    pub fn set_load_path(&self, path: impl AsRef<Path>) {
        *self.load_path.write() = path.as_ref().to_path_buf();
    }

    /// Current logger.
    #[must_use]
    pub fn logger(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.logger.read())
    }

    /// Replace the logger.
    pub fn set_logger(&self, logger: Arc<dyn LogSink>) {
        *self.logger.write() = logger;
    }

    /// Route for client-side participant registration.
    #[must_use]
    pub fn add_participant_path(&self) -> String {
        self.add_participant_path.read().clone()
    }

    /// Change the participant registration route.
    pub fn set_add_participant_path(&self, path: impl Into<String>) {
        *self.add_participant_path.write() = path.into();
    }

    /// Whether participants and conversions are recorded.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Relaxed)
    }

    /// Turn collection on or off.
    pub fn set_collecting(&self, enabled: bool) {
        self.collecting.store(enabled, Ordering::Relaxed);
    }

    /// Whether datastore errors are routed to the failover hook.
    #[must_use]
    pub fn failover_on_datastore_error(&self) -> bool {
        self.failover_on_datastore_error.load(Ordering::Relaxed)
    }

    /// Turn failover mode on or off.
    pub fn set_failover_on_datastore_error(&self, enabled: bool) {
        self.failover_on_datastore_error
            .store(enabled, Ordering::Relaxed);
    }

    /// Register participants client-side from now on.
    pub fn use_js(&self) {
        self.use_js.store(true, Ordering::Relaxed);
    }

    /// Whether participants are registered client-side.
    #[must_use]
    pub fn is_using_js(&self) -> bool {
        self.use_js.load(Ordering::Relaxed)
    }

    pub(crate) fn log(&self, level: Level, message: &str) {
        self.logger().log(level, message);
    }

    // ------------------------------------------------------------------
    // Failure hooks
    // ------------------------------------------------------------------

    /// Datastore-error hook, falling back to a line on the current logger.
    #[must_use]
    pub fn on_datastore_error(&self) -> DatastoreErrorHook {
        self.hooks.on_datastore_error().unwrap_or_else(|| {
            let logger = self.logger();
            Arc::new(move |error: &Error, component: &str, method: &str, args: &[Value]| {
                default_datastore_error(&*logger, error, component, method, args);
            })
        })
    }

    /// Set (or with `None`, reset to default) the datastore-error hook.
    pub fn set_on_datastore_error(&self, hook: Option<DatastoreErrorHook>) {
        self.hooks.set_on_datastore_error(hook);
    }

    /// Request filter, falling back to the user-agent bot heuristic.
    #[must_use]
    pub fn request_filter(&self) -> RequestFilter {
        self.hooks
            .request_filter()
            .unwrap_or_else(|| Arc::new(default_request_filter))
    }

    /// Set (or with `None`, reset to default) the request filter.
    pub fn set_request_filter(&self, filter: Option<RequestFilter>) {
        self.hooks.set_request_filter(filter);
    }

    /// Whether `request` should be ignored (not recorded).
    #[must_use]
    pub fn ignores(&self, request: Option<&Request>) -> bool {
        (self.request_filter())(request)
    }

    /// Call-site policy for a failed datastore operation.
    ///
    /// In failover mode the hook is invoked and the error is suppressed;
    /// otherwise the error is returned unchanged.
    ///
    /// # Errors
    /// Returns `error` when failover mode is off
    pub fn handle_datastore_error(
        &self,
        error: Error,
        component: &str,
        method: &str,
        args: &[Value],
    ) -> Result<()> {
        if !self.failover_on_datastore_error() {
            return Err(error);
        }
        (self.on_datastore_error())(&error, component, method, args);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Current adapter, connecting with the default spec if disconnected.
    ///
    /// # Errors
    /// Returns resolution or adapter errors from the implicit connect
    pub fn connection(&self) -> Result<Arc<dyn Adapter>> {
        self.connection.connection()
    }

    /// Replace the connection with one built from `spec`.
    ///
    /// # Errors
    /// Returns resolution or adapter errors
    pub fn establish_connection(&self, spec: ConnectionSpec) -> Result<Arc<dyn Adapter>> {
        self.connection.establish(spec)
    }

    /// Connected and the adapter is active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Close the connection.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Re-establish the last connection spec.
    ///
    /// # Errors
    /// Returns resolution or adapter errors
    pub fn reconnect(&self) -> Result<Arc<dyn Adapter>> {
        self.connection.reconnect()
    }

    /// Lifecycle manager behind the connection accessors.
    #[must_use]
    pub const fn connection_manager(&self) -> &ConnectionManager {
        &self.connection
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    /// Shared in-progress set used while loading definition files.
    #[must_use]
    pub const fn loading_guard(&self) -> &LoadingGuard {
        &self.loading
    }

    /// All experiments, loading them on first access.
    ///
    /// # Errors
    /// Returns loading errors
    pub fn experiments(&self) -> Result<BTreeMap<String, Arc<Experiment>>> {
        self.experiments.all(self)
    }

    /// Experiment by name or id.
    ///
    /// The name is normalized to an id first; a deprecation warning is logged
    /// when the caller did not pass the id itself.
    ///
    /// # Errors
    /// Returns [`Error::NoExperiment`] if absent, or loading errors
    pub fn experiment(&self, name: &str) -> Result<Arc<Experiment>> {
        let id = normalize(name);
        if id != name {
            self.log(
                Level::WARN,
                &format!(
                    "Deprecated: please call experiment method with experiment identifier ({id:?} instead of {name:?})"
                ),
            );
        }
        self.experiments.get(self, &id).map_err(|err| match err {
            Error::NotFound { .. } => Error::NoExperiment(id),
            other => other,
        })
    }

    /// All metrics, loading them on first access.
    ///
    /// # Errors
    /// Returns loading errors
    pub fn metrics(&self) -> Result<BTreeMap<String, Arc<Metric>>> {
        self.metrics.all(self)
    }

    /// Metric by id.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if absent, or loading errors
    pub fn metric(&self, id: &str) -> Result<Arc<Metric>> {
        self.metrics.get(self, id)
    }

    /// Track `count` occurrences of metric `id`.
    ///
    /// No-op (after checking the metric exists) when not collecting.
    ///
    /// # Errors
    /// Returns lookup errors, and datastore errors unless failover is on
    pub fn track(&self, id: &str, count: i64) -> Result<()> {
        let metric = self.metric(id)?;
        if !self.is_collecting() {
            return Ok(());
        }
        self.connection()
            .and_then(|adapter| metric.track(&*adapter, count))
            .or_else(|err| self.handle_datastore_error(err, "Metric", "track", &[json!(id), json!(count)]))
    }

    /// Experiments `participant` takes part in, with the alternative shown,
    /// ordered by experiment name (then id).
    ///
    /// # Errors
    /// Returns loading errors, and datastore errors unless failover is on
    pub fn participant_info(&self, participant: &str) -> Result<Vec<Participation>> {
        let mut experiments: Vec<Arc<Experiment>> = self.experiments()?.into_values().collect();
        experiments.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));

        let args = [json!(participant)];
        let adapter = match self.connection() {
            Ok(adapter) => adapter,
            Err(err) => {
                self.handle_datastore_error(err, "Playground", "participant_info", &args)?;
                return Ok(Vec::new());
            }
        };

        let mut participations = Vec::new();
        for experiment in experiments {
            let assigned = match adapter.ab_assigned(experiment.id(), participant) {
                Ok(assigned) => assigned,
                Err(err) => {
                    self.handle_datastore_error(err, "Playground", "participant_info", &args)?;
                    None
                }
            };
            let Some(index) = assigned else { continue };
            match experiment.alternative(index) {
                Some(alternative) => {
                    let alternative = alternative.clone();
                    participations.push((experiment, alternative));
                }
                None => self.log(
                    Level::WARN,
                    &format!(
                        "Participant {participant} assigned to missing alternative {index} of {}",
                        experiment.id()
                    ),
                ),
            }
        }
        Ok(participations)
    }

    /// Whether every experiment has been persisted in the datastore.
    ///
    /// # Errors
    /// Returns loading or datastore errors
    pub fn experiments_persisted(&self) -> Result<bool> {
        let experiments = self.experiments()?;
        let adapter = self.connection()?;
        for id in experiments.keys() {
            if !adapter.experiment_persisted(id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Load both registries (no-op for a loaded registry).
    ///
    /// # Errors
    /// Returns loading errors
    pub fn load(&self) -> Result<()> {
        self.experiments.load(self)?;
        self.metrics.load(self)
    }

    /// Forget all definitions and load them again. The connection is untouched.
    ///
    /// Readers on other threads wait until the reload has finished.
    ///
    /// # Errors
    /// Returns loading errors
    pub fn reload(&self) -> Result<()> {
        let _loading = self.loading.exclusive();
        self.experiments.reset();
        self.metrics.reset();
        self.load()
    }

    /// Whether the experiments registry is loaded.
    #[must_use]
    pub fn experiments_loaded(&self) -> bool {
        self.experiments.is_loaded()
    }

    /// Whether the metrics registry is loaded.
    #[must_use]
    pub fn metrics_loaded(&self) -> bool {
        self.metrics.is_loaded()
    }
}

/// Adds the config file's remote metrics, rejecting ids already loaded.
fn merge_remote_metrics(playground: &Playground, metrics: &DefinitionMap<Metric>) -> Result<()> {
    let Some(config) = playground.config_file() else {
        return Ok(());
    };
    for (id, url) in config.remote_metrics()? {
        if metrics.contains_key(&id) {
            return Err(Error::DuplicateDefinition {
                kind: Metric::KIND,
                id,
            });
        }
        metrics.insert(id.clone(), Arc::new(Metric::remote(id, url)));
    }
    Ok(())
}

impl fmt::Debug for Playground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playground")
            .field("environment", &self.environment)
            .field("load_path", &self.load_path())
            .field("collecting", &self.is_collecting())
            .field("connection", &self.connection)
            .field("experiments", &self.experiments)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
