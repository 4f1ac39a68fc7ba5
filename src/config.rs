//! Configuration layers
//!
//! Three layers are merged shallowly, later layers winning:
//!
//! ```text
//! built-in defaults  <  config file section for the active environment  <  explicit options
//! ```
//!
//! The config file itself is treated as an opaque nested mapping: environment
//! name to either a connection string or an options mapping, plus an optional
//! top-level `metrics` mapping of metric id to URL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Environment variable consulted first for the active environment.
pub const RACK_ENV: &str = "RACK_ENV";

/// Environment variable consulted second (host web framework).
pub const FRAMEWORK_ENV: &str = "RAILS_ENV";

/// Environment used when neither variable is set.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Name of the playground config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "trueno_ab.json";

/// Name of the legacy redis-only config file inside the config directory.
pub const LEGACY_CONFIG_FILE_NAME: &str = "redis.json";

/// Default directory scanned for definition files.
pub const DEFAULT_LOAD_PATH: &str = "experiments";

/// Default route used by the client-side participant registration.
pub const DEFAULT_ADD_PARTICIPANT_PATH: &str = "/ab/add_participant";

/// Determine the active environment from the process environment.
///
/// First of `RACK_ENV`, `RAILS_ENV`, else `"development"`. Empty values are
/// treated as unset.
#[must_use]
pub fn active_environment() -> String {
    [RACK_ENV, FRAMEWORK_ENV]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

/// Parsed config file contents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    root: Value,
}

impl ConfigFile {
    /// Wrap an already-parsed mapping.
    #[must_use]
    pub const fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Read and parse a JSON config file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let root: Value = serde_json::from_str(&text)?;
        Ok(Self { root })
    }

    /// Read `path` if it exists, `None` otherwise.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be parsed
    pub fn load_if_exists<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if path.is_file() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Entry for the named environment, ignoring explicit nulls.
    #[must_use]
    pub fn environment(&self, env: &str) -> Option<&Value> {
        self.root.get(env).filter(|value| !value.is_null())
    }

    /// Remote metric declarations (`metrics` mapping of id to URL).
    ///
    /// # Errors
    /// Returns error if `metrics` is not a mapping of strings
    pub fn remote_metrics(&self) -> Result<BTreeMap<String, String>> {
        let Some(metrics) = self.root.get("metrics").filter(|v| !v.is_null()) else {
            return Ok(BTreeMap::new());
        };
        let Some(entries) = metrics.as_object() else {
            return Err(Error::Configuration(
                "`metrics` must map metric ids to URLs".to_string(),
            ));
        };
        entries
            .iter()
            .map(|(id, url)| match url.as_str() {
                Some(url) => Ok((id.clone(), url.to_string())),
                None => Err(Error::Configuration(format!(
                    "Remote metric {id} must be declared with a URL string"
                ))),
            })
            .collect()
    }

    /// Raw parsed contents.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.root
    }
}

/// Merged playground configuration.
///
/// Only the fields below are interpreted; unknown keys in any layer are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    /// Record participants and conversions.
    pub collecting: bool,
    /// Directory scanned for experiment definitions (`metrics/` beneath it).
    pub load_path: PathBuf,
    /// Route for client-side participant registration.
    pub add_participant_path: String,
    /// Route datastore errors to the failover hook instead of propagating.
    pub failover_on_datastore_error: bool,
    /// Register participants client-side.
    pub use_js: bool,
    /// Connect while building the playground.
    pub autoconnect: bool,
    /// Load both registries while building the playground.
    pub load_on_build: bool,
    /// Newly created experiments start enabled.
    pub experiments_start_enabled: bool,
    /// Cookie carrying the participant identity.
    pub cookie_name: String,
    /// Connection string or options mapping used by auto-connect.
    pub connection: Option<Value>,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            collecting: true,
            load_path: PathBuf::from(DEFAULT_LOAD_PATH),
            add_participant_path: DEFAULT_ADD_PARTICIPANT_PATH.to_string(),
            failover_on_datastore_error: false,
            use_js: false,
            autoconnect: false,
            load_on_build: false,
            experiments_start_enabled: true,
            cookie_name: "ab_id".to_string(),
            connection: None,
        }
    }
}

impl PlaygroundConfig {
    /// Merge layers over the built-in defaults, later layers winning.
    ///
    /// # Errors
    /// Returns error if a merged value has the wrong type for its field
    pub fn merge<'a, I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Map<String, Value>>,
    {
        let mut merged = match serde_json::to_value(Self::default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for layer in layers {
            merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        serde_json::from_value(Value::Object(merged))
            .map_err(|e| Error::Configuration(format!("Invalid playground option: {e}")))
    }
}
