//! Task bridge: named async handlers the sandboxed context can invoke.
//!
//! Handlers are stored in an [`IndexMap`] keyed by task name so listing
//! keeps registration order. Dispatch holds an async mutex for the whole
//! invocation, so at most one task runs at a time and results come back in
//! request order.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use cuke_protocol::{CONNECT_DB, FILE_EXISTS, TaskResult};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::env::ConnectionConfig;
use crate::error::TaskError;
use crate::gateway::{self, Connector, Query};

/// Boxed task future.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<TaskResult, TaskError>> + Send>>;

/// Task handler: JSON payload → async result.
pub type TaskFn = Arc<dyn Fn(Value) -> TaskFuture + Send + Sync>;

/// Registry of task handlers.
pub struct TaskBridge {
	handlers: IndexMap<String, TaskFn>,
	in_flight: Mutex<()>,
}

impl Default for TaskBridge {
	fn default() -> Self {
		Self::new()
	}
}

impl TaskBridge {
	pub fn new() -> Self {
		Self {
			handlers: IndexMap::new(),
			in_flight: Mutex::new(()),
		}
	}

	/// Registers `handler` under `name`, replacing any previous handler.
	pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
	where
		F: Fn(Value) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<TaskResult, TaskError>> + Send + 'static,
	{
		let name = name.into();
		let erased: TaskFn = Arc::new(move |payload| -> TaskFuture { Box::pin(handler(payload)) });
		if self.handlers.insert(name.clone(), erased).is_some() {
			warn!(target = "cuke.task", task = %name, "task handler replaced");
		} else {
			debug!(target = "cuke.task", task = %name, "task handler registered");
		}
	}

	pub fn contains(&self, name: &str) -> bool {
		self.handlers.contains_key(name)
	}

	/// Registered task names, in registration order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.handlers.keys().map(String::as_str)
	}

	/// Runs the handler registered under `name`.
	///
	/// An unknown name is a contract violation on the caller's side and is
	/// always returned as [`TaskError::UnknownTask`].
	pub async fn dispatch(&self, name: &str, payload: Value) -> Result<TaskResult, TaskError> {
		let Some(handler) = self.handlers.get(name).cloned() else {
			error!(target = "cuke.task", task = name, "no handler registered for task");
			return Err(TaskError::UnknownTask(name.to_string()));
		};

		let _serialized = self.in_flight.lock().await;
		let started = Instant::now();
		let result = handler(payload).await;
		let elapsed_ms = started.elapsed().as_millis() as u64;

		match &result {
			Ok(_) => debug!(target = "cuke.task", task = name, elapsed_ms, "task completed"),
			Err(err) => warn!(target = "cuke.task", task = name, elapsed_ms, code = err.code(), error = %err, "task failed"),
		}
		result
	}
}

impl std::fmt::Debug for TaskBridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TaskBridge")
			.field("tasks", &self.handlers.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Resources the built-in tasks are allowed to reach.
#[derive(Clone)]
pub struct Gateways {
	pub connector: Arc<dyn Connector>,
	pub connection: Arc<ConnectionConfig>,
	/// Root for relative `fileExists` paths
	pub root: PathBuf,
}

/// Registers `connectDB` and `fileExists`.
pub fn register_builtin_tasks(bridge: &mut TaskBridge, gateways: Gateways) {
	let Gateways {
		connector,
		connection,
		root,
	} = gateways;

	bridge.register(CONNECT_DB, move |payload| {
		let connector = Arc::clone(&connector);
		let connection = Arc::clone(&connection);
		async move {
			let query: Query = serde_json::from_value(payload).map_err(|e| TaskError::InvalidPayload {
				task: CONNECT_DB,
				message: format!("expected a SQL string or {{\"text\", \"values\"}} object ({e})"),
			})?;
			let rows = gateway::with_connection(connector.as_ref(), &connection, move |conn| {
				Box::pin(async move { conn.query(&query).await })
			})
			.await?;
			Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
		}
	});

	bridge.register(FILE_EXISTS, move |payload| {
		let root = root.clone();
		async move {
			let path = match payload {
				Value::String(path) => path,
				other => {
					return Err(TaskError::InvalidPayload {
						task: FILE_EXISTS,
						message: format!("expected a path string, got {other}"),
					});
				}
			};
			if path.is_empty() {
				return Ok(Value::Bool(false));
			}
			let resolved = root.join(&path);
			Ok(Value::Bool(gateway::file_exists(&resolved).await))
		}
	});
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use serde_json::json;
	use tempfile::TempDir;

	use super::*;
	use crate::gateway::testing::{FAIL_MARKER, FakeConnector, config};

	fn bridge_with(connector: FakeConnector, root: PathBuf) -> TaskBridge {
		let mut bridge = TaskBridge::new();
		register_builtin_tasks(
			&mut bridge,
			Gateways {
				connector: Arc::new(connector),
				connection: Arc::new(config()),
				root,
			},
		);
		bridge
	}

	#[test]
	fn builtin_names_in_registration_order() {
		let bridge = bridge_with(FakeConnector::default(), PathBuf::from("."));
		assert_eq!(bridge.names().collect::<Vec<_>>(), vec![CONNECT_DB, FILE_EXISTS]);
		assert!(bridge.contains(FILE_EXISTS));
		assert!(!bridge.contains("seedUsers"));
	}

	#[tokio::test]
	async fn unknown_task_is_rejected() {
		let bridge = bridge_with(FakeConnector::default(), PathBuf::from("."));
		let err = bridge.dispatch("seedUsers", Value::Null).await.unwrap_err();
		assert!(matches!(err, TaskError::UnknownTask(ref name) if name == "seedUsers"));
	}

	#[tokio::test]
	async fn connect_db_returns_rows() {
		let bridge = bridge_with(FakeConnector::default(), PathBuf::from("."));
		let rows = bridge.dispatch(CONNECT_DB, json!("SELECT 1")).await.unwrap();
		assert_eq!(rows, json!([{ "query": "SELECT 1", "params": [] }]));
	}

	#[tokio::test]
	async fn connect_db_accepts_parameterized_payload() {
		let bridge = bridge_with(FakeConnector::default(), PathBuf::from("."));
		let rows = bridge
			.dispatch(CONNECT_DB, json!({ "text": "SELECT $1", "values": ["ada"] }))
			.await
			.unwrap();
		assert_eq!(rows[0]["params"], json!(["ada"]));
	}

	#[tokio::test]
	async fn connect_db_rejects_non_query_payload() {
		let bridge = bridge_with(FakeConnector::default(), PathBuf::from("."));
		let err = bridge.dispatch(CONNECT_DB, json!(12)).await.unwrap_err();
		assert_eq!(err.code(), "INVALID_PAYLOAD");
	}

	#[tokio::test]
	async fn no_connection_leaks_after_mixed_calls() {
		let connector = FakeConnector::default();
		let counters = Arc::clone(&connector.counters);
		let bridge = bridge_with(connector, PathBuf::from("."));

		let failing = format!("SELECT {FAIL_MARKER}");
		let queries = ["SELECT 1", failing.as_str(), "SELECT 2", "SELECT 3"];
		let mut failures = 0;
		for sql in queries {
			if bridge.dispatch(CONNECT_DB, json!(sql)).await.is_err() {
				failures += 1;
			}
		}

		assert_eq!(failures, 1);
		assert_eq!(counters.opened.load(Ordering::SeqCst), 4);
		assert_eq!(counters.open_now(), 0);
	}

	#[tokio::test]
	async fn query_failure_carries_cause() {
		let bridge = bridge_with(FakeConnector::default(), PathBuf::from("."));
		let err = bridge.dispatch(CONNECT_DB, json!(format!("SELECT {FAIL_MARKER}"))).await.unwrap_err();
		assert_eq!(err.code(), "QUERY_FAILED");
		assert!(err.to_string().contains("syntax error"));
	}

	#[tokio::test]
	async fn unreachable_database_is_connection_failure() {
		let connector = FakeConnector {
			refuse: true,
			..Default::default()
		};
		let bridge = bridge_with(connector, PathBuf::from("."));
		let err = bridge.dispatch(CONNECT_DB, json!("SELECT 1")).await.unwrap_err();
		assert_eq!(err.code(), "CONNECTION_FAILED");
	}

	#[tokio::test]
	async fn file_exists_resolves_relative_to_root() {
		let temp = TempDir::new().unwrap();
		std::fs::create_dir_all(temp.path().join("cypress/downloads")).unwrap();
		std::fs::write(temp.path().join("cypress/downloads/report.pdf"), b"%PDF").unwrap();
		let bridge = bridge_with(FakeConnector::default(), temp.path().to_path_buf());

		assert_eq!(bridge.dispatch(FILE_EXISTS, json!("cypress/downloads/report.pdf")).await.unwrap(), json!(true));
		assert_eq!(bridge.dispatch(FILE_EXISTS, json!("cypress/downloads/missing.pdf")).await.unwrap(), json!(false));
		assert_eq!(bridge.dispatch(FILE_EXISTS, json!("/no/such/file")).await.unwrap(), json!(false));
		assert_eq!(bridge.dispatch(FILE_EXISTS, json!("")).await.unwrap(), json!(false));
	}

	#[tokio::test]
	async fn file_exists_requires_string_payload() {
		let bridge = bridge_with(FakeConnector::default(), PathBuf::from("."));
		let err = bridge.dispatch(FILE_EXISTS, json!({ "path": "a" })).await.unwrap_err();
		assert_eq!(err.code(), "INVALID_PAYLOAD");
	}

	#[tokio::test]
	async fn dispatch_is_serialized() {
		let active = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));
		let mut bridge = TaskBridge::new();
		{
			let active = Arc::clone(&active);
			let peak = Arc::clone(&peak);
			bridge.register("slow", move |_| {
				let active = Arc::clone(&active);
				let peak = Arc::clone(&peak);
				async move {
					let now = active.fetch_add(1, Ordering::SeqCst) + 1;
					peak.fetch_max(now, Ordering::SeqCst);
					tokio::time::sleep(std::time::Duration::from_millis(10)).await;
					active.fetch_sub(1, Ordering::SeqCst);
					Ok(Value::Null)
				}
			});
		}

		let bridge = Arc::new(bridge);
		let calls = (0..4).map(|_| {
			let bridge = Arc::clone(&bridge);
			tokio::spawn(async move { bridge.dispatch("slow", Value::Null).await })
		});
		for call in calls.collect::<Vec<_>>() {
			call.await.unwrap().unwrap();
		}
		assert_eq!(peak.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn later_registration_replaces_earlier() {
		let mut bridge = TaskBridge::new();
		bridge.register("echo", |_| async { Ok(json!("first")) });
		bridge.register("echo", |payload| async move { Ok(payload) });
		assert_eq!(bridge.names().count(), 1);
		assert_eq!(bridge.dispatch("echo", json!(5)).await.unwrap(), json!(5));
	}
}
