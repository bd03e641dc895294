//! Host-side event pipeline for a browser end-to-end test runner.
//!
//! The runner executes test code inside a sandboxed browser context. Anything
//! that context cannot do itself (querying a database, checking the local
//! filesystem, shaping browser launch flags, transforming spec files) is
//! delegated to the host process through a small set of lifecycle hooks.
//!
//! # Main Types
//!
//! - [`Host`] - composed config plus the `task`, `file:preprocessor` and
//!   `before:browser:launch` handlers
//! - [`TaskBridge`] - named async task handlers, dispatched one at a time
//! - [`PluginChain`] - ordered file preprocessor built by [`build_pipeline`]
//! - [`EffectiveConfig`] - static settings merged with runtime overrides
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cuke::{Host, PgConnector, Project, env};
//!
//! let project = Project::detect()?;
//! let vars = env::capture(project.root())?;
//! let host = Host::load(project, &vars, Arc::new(PgConnector))?;
//! let rows = host.task(cuke_protocol::TaskRequest::new("connectDB", "SELECT 1")).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod env;
pub mod error;
pub mod gateway;
mod host;
pub mod launch;
pub mod preprocess;
pub mod project;

pub use bridge::{Gateways, TaskBridge, register_builtin_tasks};
pub use config::{EffectiveConfig, StaticConfig, compose};
pub use env::{ConnectionConfig, HostEnv, RuntimeEnv};
pub use error::{ConfigError, Error, GatewayError, Result, TaskError, TransformError};
pub use gateway::{Connection, Connector, PgConnector, Query};
pub use host::Host;
pub use launch::customize;
pub use preprocess::{Plugin, PluginChain, Unit, build_pipeline};
pub use project::Project;
