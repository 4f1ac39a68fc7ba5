//! Adapter lifecycle
//!
//! ```text
//!                establish(spec)
//! Disconnected ─────────────────> Connected { adapter, options }
//!      ^                               │
//!      └──────── disconnect() ─────────┘
//! ```
//!
//! Every transition happens under the state write lock, so at most one
//! adapter is alive at any time. Steady-state `connection()` calls take only
//! the read lock.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{ConnectionOptions, ConnectionResolver, ConnectionSpec};
use crate::adapter::{Adapter, AdapterRegistry};
use crate::Result;

enum State {
    Disconnected,
    Connected {
        adapter: Arc<dyn Adapter>,
        options: ConnectionOptions,
    },
}

/// Owns the single active adapter.
pub struct ConnectionManager {
    resolver: ConnectionResolver,
    adapters: AdapterRegistry,
    state: RwLock<State>,
    last_spec: Mutex<ConnectionSpec>,
}

impl ConnectionManager {
    /// Create a disconnected manager.
    #[must_use]
    pub fn new(resolver: ConnectionResolver, adapters: AdapterRegistry) -> Self {
        Self {
            resolver,
            adapters,
            state: RwLock::new(State::Disconnected),
            last_spec: Mutex::new(ConnectionSpec::Absent),
        }
    }

    /// Resolver used by `establish`.
    #[must_use]
    pub const fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    /// Replace the current adapter with one built from `spec`.
    ///
    /// `spec` is remembered for [`reconnect`](Self::reconnect) before it is
    /// resolved, and the previous adapter is torn down before the new one is
    /// built. If resolution or construction fails the manager is left
    /// disconnected.
    ///
    /// # Errors
    /// Returns resolution errors and adapter factory errors
    pub fn establish(&self, spec: ConnectionSpec) -> Result<Arc<dyn Adapter>> {
        let mut state = self.state.write();
        self.establish_locked(&mut state, spec)
    }

    fn establish_locked(&self, state: &mut State, spec: ConnectionSpec) -> Result<Arc<dyn Adapter>> {
        (*self.last_spec.lock()).clone_from(&spec);

        if let State::Connected { adapter, .. } = std::mem::replace(state, State::Disconnected) {
            tracing::debug!(adapter = adapter.name(), "disconnecting before re-establish");
            adapter.disconnect();
        }

        let options = self.resolver.resolve(&spec)?;
        let adapter = self.adapters.create(&options)?;
        tracing::info!(adapter = adapter.name(), "datastore connection established");

        *state = State::Connected {
            adapter: Arc::clone(&adapter),
            options,
        };
        Ok(adapter)
    }

    /// Current adapter, establishing the default connection if disconnected.
    ///
    /// # Errors
    /// Returns errors from the implicit `establish(Absent)`
    pub fn connection(&self) -> Result<Arc<dyn Adapter>> {
        if let State::Connected { adapter, .. } = &*self.state.read() {
            return Ok(Arc::clone(adapter));
        }
        let mut state = self.state.write();
        if let State::Connected { adapter, .. } = &*state {
            return Ok(Arc::clone(adapter));
        }
        self.establish_locked(&mut state, ConnectionSpec::Absent)
    }

    /// Connected and the adapter reports itself active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        match &*self.state.read() {
            State::Connected { adapter, .. } => adapter.is_active(),
            State::Disconnected => false,
        }
    }

    /// Disconnect the adapter; no-op when already disconnected.
    pub fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), State::Disconnected);
        if let State::Connected { adapter, .. } = previous {
            tracing::info!(adapter = adapter.name(), "datastore connection closed");
            adapter.disconnect();
        }
    }

    /// Re-establish using the last spec passed to `establish`.
    ///
    /// # Errors
    /// Same as [`establish`](Self::establish)
    pub fn reconnect(&self) -> Result<Arc<dyn Adapter>> {
        let spec = self.last_spec.lock().clone();
        self.establish(spec)
    }

    /// Seed the manager with an already-live adapter.
    pub fn adopt(&self, adapter: Arc<dyn Adapter>) {
        let mut state = self.state.write();
        if let State::Connected { adapter: previous, .. } = &*state {
            if !Arc::ptr_eq(previous, &adapter) {
                previous.disconnect();
            }
        }
        let options = ConnectionOptions::for_adapter(adapter.name());
        *state = State::Connected { adapter, options };
    }

    /// Options that produced the current adapter.
    #[must_use]
    pub fn options(&self) -> Option<ConnectionOptions> {
        match &*self.state.read() {
            State::Connected { options, .. } => Some(options.clone()),
            State::Disconnected => None,
        }
    }

    /// Spec most recently passed to `establish`.
    #[must_use]
    pub fn last_spec(&self) -> ConnectionSpec {
        self.last_spec.lock().clone()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected", &self.is_connected())
            .field("options", &self.options())
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use serde_json::json;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            ConnectionResolver::new().with_environment("test"),
            AdapterRegistry::default(),
        )
    }

    fn mock_spec() -> ConnectionSpec {
        ConnectionSpec::Url("mock://localhost:6379/0".to_string())
    }

    #[test]
    fn test_initially_disconnected() {
        let manager = manager();
        assert!(!manager.is_connected());
        assert!(manager.options().is_none());
        assert_eq!(manager.last_spec(), ConnectionSpec::Absent);
    }

    #[test]
    fn test_establish_keeps_one_live_adapter() {
        let manager = manager();
        let adapters: Vec<_> = (0..5)
            .map(|_| manager.establish(mock_spec()).unwrap())
            .collect();

        let active = adapters.iter().filter(|a| a.is_active()).count();
        assert_eq!(active, 1);
        assert!(adapters.last().unwrap().is_active());
        assert!(manager.is_connected());
    }

    #[test]
    fn test_reconnect_restores_same_options() {
        let manager = manager();
        manager.establish(mock_spec()).unwrap();
        let before = manager.options().unwrap();

        manager.disconnect();
        assert!(!manager.is_connected());

        manager.reconnect().unwrap();
        assert_eq!(manager.options().unwrap(), before);
        assert_eq!(manager.last_spec(), mock_spec());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let manager = manager();
        manager.disconnect();
        let adapter = manager.establish(mock_spec()).unwrap();
        manager.disconnect();
        manager.disconnect();
        assert!(!adapter.is_active());
    }

    #[test]
    fn test_failed_establish_remembers_spec_and_disconnects() {
        let manager = manager();
        let first = manager.establish(mock_spec()).unwrap();

        let bad = ConnectionSpec::Url("redis://nowhere:1".to_string());
        assert!(manager.establish(bad.clone()).is_err());

        assert!(!first.is_active());
        assert!(!manager.is_connected());
        assert_eq!(manager.last_spec(), bad);
    }

    #[test]
    fn test_connection_establishes_default_on_demand() {
        let manager = ConnectionManager::new(
            ConnectionResolver::new()
                .with_environment("test")
                .with_config_file(Some(ConfigFile::from_value(json!({
                    "test": {"adapter": "mock", "host": "localhost", "port": 6379}
                })))),
            AdapterRegistry::default(),
        );

        let adapter = manager.connection().unwrap();
        let again = manager.connection().unwrap();

        assert!(Arc::ptr_eq(&adapter, &again));
        assert_eq!(
            manager.options().unwrap(),
            ConnectionOptions::for_adapter("mock")
                .with("host", "localhost")
                .with("port", 6379)
        );
    }

    #[test]
    fn test_is_connected_tracks_adapter_liveness() {
        let manager = manager();
        let adapter = manager.establish(mock_spec()).unwrap();
        adapter.disconnect();
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_adopt_replaces_previous_adapter() {
        let manager = manager();
        let first = manager.establish(mock_spec()).unwrap();
        let seeded: Arc<dyn Adapter> = Arc::new(crate::adapter::MockAdapter::default());

        manager.adopt(Arc::clone(&seeded));

        assert!(!first.is_active());
        assert!(Arc::ptr_eq(&manager.connection().unwrap(), &seeded));
        assert_eq!(manager.options().unwrap().adapter(), Some("mock"));
    }
}
