//! Narrow wrappers around the privileged resources tasks may touch.
//!
//! Gateways hold no state between calls. The database side is split into a
//! [`Connector`] trait and a scope function so tests can swap in a fake.

mod db;
mod fs;
mod postgres;

#[cfg(test)]
pub(crate) use db::testing;
pub use db::{Connection, Connector, Query, Row, with_connection};
pub use fs::file_exists;
pub use postgres::PgConnector;
