//! Wire types for the cuke host boundary.
//!
//! The sandboxed test context and the host process talk exclusively in the
//! shapes defined here. Types in this crate are pure data: no I/O, no
//! behaviour beyond serialization and a few constructors.
//!
//! # Main Types
//!
//! - [`HostRequest`] / [`HostResponse`] - one request per line, one response per line
//! - [`TaskRequest`] - named task with an arbitrary JSON payload
//! - [`BrowserDescriptor`] / [`LaunchOptions`] - browser-launch hook arguments

pub mod browser;
pub mod message;
pub mod task;

pub use browser::*;
pub use message::*;
pub use task::*;
