use std::sync::Arc;

use cuke::env;
use cuke::{Host, PgConnector, Project};
use cuke_protocol::TaskRequest;
use serde_json::Value;

use crate::error::Result;

pub async fn execute(project: Project, name: &str, payload: Option<&str>) -> Result<Value> {
	let vars = env::capture(project.root())?;
	let host = Host::load(project, &vars, Arc::new(PgConnector))?;
	Ok(host.task(TaskRequest::new(name, parse_payload(payload))).await?)
}

/// JSON when it parses, otherwise the raw text as a string.
fn parse_payload(raw: Option<&str>) -> Value {
	match raw {
		None => Value::Null,
		Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
	}
}
