use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::env::ConnectionConfig;
use crate::error::GatewayError;

/// One result row: column name to JSON value, in column order.
pub type Row = serde_json::Map<String, Value>;

/// Query accepted by the `connectDB` task.
///
/// A bare string, or `{ "text": ..., "values": [...] }` with positional
/// parameters bound as `$1`, `$2`, ...
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Query {
	Text(String),
	Parameterized {
		text: String,
		#[serde(default)]
		values: Vec<Value>,
	},
}

impl Query {
	pub fn text(&self) -> &str {
		match self {
			Query::Text(text) | Query::Parameterized { text, .. } => text,
		}
	}

	pub fn params(&self) -> &[Value] {
		match self {
			Query::Text(_) => &[],
			Query::Parameterized { values, .. } => values,
		}
	}
}

/// Opens database connections.
#[async_trait]
pub trait Connector: Send + Sync {
	async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>, GatewayError>;
}

/// A live connection, owned by exactly one [`with_connection`] scope.
#[async_trait]
pub trait Connection: Send {
	async fn query(&mut self, query: &Query) -> Result<Vec<Row>, GatewayError>;

	async fn close(self: Box<Self>) -> Result<(), GatewayError>;
}

/// Opens a connection, runs `body` against it, and closes it.
///
/// The close runs whether `body` succeeds or fails. A body error takes
/// precedence over a close error; the close error is then only logged.
pub async fn with_connection<T, F>(
	connector: &dyn Connector,
	config: &ConnectionConfig,
	body: F,
) -> Result<T, GatewayError>
where
	F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, Result<T, GatewayError>>,
{
	let mut conn = connector.connect(config).await?;
	debug!(target = "cuke.task", host = %config.host, port = config.port, database = %config.database, "connection opened");

	let outcome = body(conn.as_mut()).await;
	let closed = conn.close().await;
	debug!(target = "cuke.task", ok = closed.is_ok(), "connection closed");

	match (outcome, closed) {
		(Ok(value), Ok(())) => Ok(value),
		(Ok(_), Err(close_err)) => Err(close_err),
		(Err(err), Ok(())) => Err(err),
		(Err(err), Err(close_err)) => {
			warn!(target = "cuke.task", error = %close_err, "close failed after query error");
			Err(err)
		}
	}
}
