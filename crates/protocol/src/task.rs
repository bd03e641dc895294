//! Task invocation types for the `task` hook.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task name for the database query handler.
pub const CONNECT_DB: &str = "connectDB";
/// Task name for the file existence handler.
pub const FILE_EXISTS: &str = "fileExists";

/// A named request from the sandboxed context for a host-side side effect.
///
/// The payload is opaque to the bridge; each handler validates its own shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
	pub name: String,
	#[serde(default)]
	pub payload: Value,
}

impl TaskRequest {
	pub fn new(name: impl Into<String>, payload: impl Into<Value>) -> Self {
		Self {
			name: name.into(),
			payload: payload.into(),
		}
	}
}

/// Result of a task: any JSON value, never a live resource handle.
pub type TaskResult = Value;
