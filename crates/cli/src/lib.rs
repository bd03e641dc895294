//! `cuke` command-line host.
//!
//! `cuke serve` is what the test runner spawns; the other subcommands run a
//! single hook once for scripting and debugging.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
