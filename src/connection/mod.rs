//! Connection specification and adapter lifecycle.
//!
//! ## Usage
//!
//! ```rust
//! use trueno_ab::adapter::AdapterRegistry;
//! use trueno_ab::connection::{ConnectionManager, ConnectionResolver, ConnectionSpec};
//!
//! # fn example() -> trueno_ab::Result<()> {
//! let manager = ConnectionManager::new(ConnectionResolver::new(), AdapterRegistry::default());
//! manager.establish(ConnectionSpec::Url("mock://localhost:6379/0".into()))?;
//! assert!(manager.is_connected());
//!
//! manager.disconnect();
//! manager.reconnect()?;
//! assert!(manager.is_connected());
//! # Ok(())
//! # }
//! ```

mod manager;
mod spec;

pub use manager::ConnectionManager;
pub use spec::{ConnectionOptions, ConnectionResolver, ConnectionSpec, DEFAULT_ADAPTER};
