//! Playground construction and configuration layering

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tracing::Level;

use super::{merge_remote_metrics, Playground};
use crate::adapter::{Adapter, AdapterRegistry};
use crate::config::{
    active_environment, ConfigFile, PlaygroundConfig, CONFIG_FILE_NAME, LEGACY_CONFIG_FILE_NAME,
};
use crate::connection::{ConnectionManager, ConnectionOptions, ConnectionResolver, ConnectionSpec};
use crate::definition::{Experiment, Metric};
use crate::hooks::{FailureHooks, LogSink, TracingSink};
use crate::registry::{
    DefinitionLoader, JsonExperimentLoader, JsonMetricLoader, LoadingGuard, Registry,
};
use crate::Result;

/// Adapter name used for legacy `host`/`port`/`db` options.
const LEGACY_ADAPTER: &str = "redis";

/// Web framework hosting the playground.
///
/// When present, its defaults sit between the built-in defaults and the
/// config file: collection is on only in `production`, and the framework's
/// logger is used unless one is set explicitly.
#[derive(Clone)]
pub struct HostFramework {
    name: String,
    logger: Option<Arc<dyn LogSink>>,
}

impl HostFramework {
    /// Framework without its own logger.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logger: None,
        }
    }

    /// Use the framework's logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Framework name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn defaults(environment: &str) -> Map<String, Value> {
        let mut layer = Map::new();
        layer.insert("collecting".to_string(), json!(environment == "production"));
        layer
    }
}

impl fmt::Debug for HostFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFramework")
            .field("name", &self.name)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Builder for [`Playground`].
#[derive(Default)]
pub struct PlaygroundBuilder {
    environment: Option<String>,
    config_file: Option<ConfigFile>,
    legacy_config_file: Option<ConfigFile>,
    config_dir: Option<PathBuf>,
    options: Map<String, Value>,
    adapter: Option<Arc<dyn Adapter>>,
    connection: Option<ConnectionSpec>,
    adapters: Option<AdapterRegistry>,
    host: Option<HostFramework>,
    logger: Option<Arc<dyn LogSink>>,
    experiment_loader: Option<Arc<dyn DefinitionLoader<Experiment>>>,
    metric_loader: Option<Arc<dyn DefinitionLoader<Metric>>>,
}

impl PlaygroundBuilder {
    /// Pin the environment instead of reading `RACK_ENV`/`RAILS_ENV`.
    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Use an already-parsed config file.
    #[must_use]
    pub fn config_file(mut self, config: ConfigFile) -> Self {
        self.config_file = Some(config);
        self
    }

    /// Use an already-parsed legacy redis config file.
    #[must_use]
    pub fn legacy_config_file(mut self, config: ConfigFile) -> Self {
        self.legacy_config_file = Some(config);
        self
    }

    /// Read `trueno_ab.json` and `redis.json` from `dir` at build time, when present.
    ///
    /// Files passed through [`config_file`](Self::config_file) and
    /// [`legacy_config_file`](Self::legacy_config_file) take precedence.
    #[must_use]
    pub fn config_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Explicit option; highest-priority configuration layer.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Directory scanned for definitions.
    #[must_use]
    pub fn load_path(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.option("load_path", path)
    }

    /// Record participants and conversions.
    #[must_use]
    pub fn collecting(self, enabled: bool) -> Self {
        self.option("collecting", enabled)
    }

    /// Route datastore errors to the failover hook.
    #[must_use]
    pub fn failover_on_datastore_error(self, enabled: bool) -> Self {
        self.option("failover_on_datastore_error", enabled)
    }

    /// Connect while building.
    #[must_use]
    pub fn autoconnect(self, enabled: bool) -> Self {
        self.option("autoconnect", enabled)
    }

    /// Load both registries while building.
    #[must_use]
    pub fn load_on_build(self, enabled: bool) -> Self {
        self.option("load_on_build", enabled)
    }

    /// Live adapter adopted by auto-connect.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Connection spec used by auto-connect.
    #[must_use]
    pub fn connection(mut self, spec: impl Into<ConnectionSpec>) -> Self {
        self.connection = Some(spec.into());
        self
    }

    /// Adapter factories (defaults to the built-in `mock`).
    #[must_use]
    pub fn adapter_registry(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Apply the defaults of a hosting web framework.
    #[must_use]
    pub fn hosted_by(mut self, host: HostFramework) -> Self {
        self.host = Some(host);
        self
    }

    /// Logger used for playground messages.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Loader for experiment files.
    #[must_use]
    pub fn experiment_loader(mut self, loader: Arc<dyn DefinitionLoader<Experiment>>) -> Self {
        self.experiment_loader = Some(loader);
        self
    }

    /// Loader for metric files.
    #[must_use]
    pub fn metric_loader(mut self, loader: Arc<dyn DefinitionLoader<Metric>>) -> Self {
        self.metric_loader = Some(loader);
        self
    }

    /// Merge configuration, then connect and load as configured.
    ///
    /// # Errors
    /// Returns error if a config file is malformed, an option has the wrong
    /// type, or auto-connect or eager loading fails
    pub fn build(self) -> Result<Playground> {
        let environment = self.environment.unwrap_or_else(active_environment);

        let (config_file, legacy_config_file) = match &self.config_dir {
            Some(dir) => (
                match self.config_file {
                    Some(file) => Some(file),
                    None => ConfigFile::load_if_exists(dir.join(CONFIG_FILE_NAME))?,
                },
                match self.legacy_config_file {
                    Some(file) => Some(file),
                    None => ConfigFile::load_if_exists(dir.join(LEGACY_CONFIG_FILE_NAME))?,
                },
            ),
            None => (self.config_file, self.legacy_config_file),
        };

        let mut layers = Vec::new();
        if self.host.is_some() {
            layers.push(HostFramework::defaults(&environment));
        }
        if let Some(Value::Object(section)) = config_file
            .as_ref()
            .and_then(|file| file.environment(&environment))
        {
            layers.push(section.clone());
        }
        layers.push(self.options.clone());
        let config = PlaygroundConfig::merge(&layers)?;

        let logger: Arc<dyn LogSink> = self
            .logger
            .or_else(|| self.host.as_ref().and_then(|host| host.logger.clone()))
            .unwrap_or_else(|| Arc::new(TracingSink));

        let resolver = ConnectionResolver::new()
            .with_environment(environment.clone())
            .with_config_file(config_file.clone())
            .with_legacy_config_file(legacy_config_file);
        let connection =
            ConnectionManager::new(resolver, self.adapters.unwrap_or_default());

        let experiment_loader = self
            .experiment_loader
            .unwrap_or_else(|| Arc::new(JsonExperimentLoader));
        let metric_loader = self
            .metric_loader
            .unwrap_or_else(|| Arc::new(JsonMetricLoader));

        let playground = Playground {
            environment,
            config_file,
            load_path: RwLock::new(config.load_path.clone()),
            add_participant_path: RwLock::new(config.add_participant_path.clone()),
            logger: RwLock::new(logger),
            collecting: AtomicBool::new(config.collecting),
            failover_on_datastore_error: AtomicBool::new(config.failover_on_datastore_error),
            use_js: AtomicBool::new(config.use_js),
            hooks: FailureHooks::new(),
            connection,
            loading: LoadingGuard::new(),
            experiments: Registry::new(experiment_loader),
            metrics: Registry::new(metric_loader)
                .in_subdirectory("metrics")
                .after_load(merge_remote_metrics),
            config,
        };

        if playground.config.autoconnect {
            let legacy = legacy_connection(&self.options);
            if self.adapter.is_none() && legacy.is_some() {
                playground.log(
                    Level::WARN,
                    "Deprecated: please use the connection option instead of host, port and db",
                );
            }
            autoconnect(&playground, self.adapter, legacy, self.connection)?;
        }

        if playground.config.load_on_build {
            playground.load()?;
        }

        tracing::debug!(
            environment = %playground.environment,
            connected = playground.is_connected(),
            "playground built"
        );
        Ok(playground)
    }
}

/// Connect in priority order: live adapter, legacy options, explicit spec,
/// configured spec, then configuration lookup.
fn autoconnect(
    playground: &Playground,
    adapter: Option<Arc<dyn Adapter>>,
    legacy: Option<ConnectionOptions>,
    explicit: Option<ConnectionSpec>,
) -> Result<()> {
    if let Some(adapter) = adapter {
        playground.connection.adopt(adapter);
        return Ok(());
    }
    let spec = match (legacy, explicit, &playground.config.connection) {
        (Some(options), _, _) => ConnectionSpec::Options(options),
        (None, Some(spec), _) => spec,
        (None, None, Some(value)) => ConnectionSpec::from_value(value)?,
        (None, None, None) => ConnectionSpec::Absent,
    };
    playground.establish_connection(spec).map(|_| ())
}

/// `{adapter: "redis", host, port, database}` from legacy explicit options.
fn legacy_connection(options: &Map<String, Value>) -> Option<ConnectionOptions> {
    let keys = [("host", "host"), ("port", "port"), ("db", "database")];
    if !keys.iter().any(|(key, _)| options.contains_key(*key)) {
        return None;
    }
    let mut connection = ConnectionOptions::for_adapter(LEGACY_ADAPTER);
    for (key, target) in keys {
        if let Some(value) = options.get(key) {
            connection.insert(target, value.clone());
        }
    }
    Some(connection)
}

impl fmt::Debug for PlaygroundBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaygroundBuilder")
            .field("environment", &self.environment)
            .field("config_dir", &self.config_dir)
            .field("options", &self.options)
            .field("connection", &self.connection)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
