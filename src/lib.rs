//! # Trueno-AB: Embedded A/B Testing Playground
//!
//! **Version**: 0.1.0
//!
//! Trueno-AB is the core of an A/B testing framework: it turns connection
//! specifications into a live datastore adapter, lazily loads experiment and
//! metric definitions from disk, and exposes them through a single
//! [`Playground`].
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Muda elimination**: Definitions are loaded once and memoized until reload
//! - **Poka-Yoke safety**: A shared loading guard stops definition files from
//!   loading themselves recursively
//! - **Genchi Genbutsu**: Connection options are derived from the config file
//!   actually on disk for the active environment
//! - **Jidoka**: Datastore failures stop the caller unless failover is enabled
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trueno_ab::definition::Definition;
//! use trueno_ab::Playground;
//!
//! let playground = Playground::builder()
//!     .config_dir("config")
//!     .load_path("experiments")
//!     .autoconnect(true)
//!     .build()?;
//!
//! playground.track("signups", 1)?;
//! for (experiment, alternative) in playground.participant_info("visitor-42")? {
//!     println!("{}: {}", experiment.name(), alternative.value());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod adapter;
pub mod config;
pub mod connection;
pub mod context;
pub mod definition;
pub mod error;
pub mod hooks;
pub mod id;
pub mod playground;
pub mod registry;

pub use error::{Error, Result};
pub use playground::{playground, set_playground, HostFramework, Playground, PlaygroundBuilder};
