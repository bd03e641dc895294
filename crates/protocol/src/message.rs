//! Line-delimited host messages.
//!
//! The sandboxed context writes one [`HostMessage`] per line and reads one
//! [`HostResponse`] per line. Responses come back in request order, so the
//! optional `id` is only needed by callers that give up on a request and
//! must recognize (and drop) its late answer.
//!
//! ```json
//! {"id":1,"event":"task","name":"fileExists","payload":"cypress/fixtures/user.json"}
//! {"id":1,"ok":true,"data":true}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::browser::{BrowserDescriptor, LaunchOptions};
use crate::task::TaskRequest;

/// A request envelope: correlation id plus the hook being invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<u64>,
	#[serde(flatten)]
	pub request: HostRequest,
}

/// Hook invocations accepted by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HostRequest {
	/// Liveness check.
	#[serde(rename = "ping")]
	Ping,
	/// Effective configuration the host composed at startup.
	#[serde(rename = "config")]
	Config,
	/// Run a named task handler.
	#[serde(rename = "task")]
	Task {
		name: String,
		#[serde(default)]
		payload: Value,
	},
	/// Transform a spec file through the preprocessor chain.
	#[serde(rename = "file:preprocessor")]
	FilePreprocessor { path: String },
	/// Customize launch options before the browser process starts.
	#[serde(rename = "before:browser:launch")]
	BeforeBrowserLaunch {
		browser: BrowserDescriptor,
		#[serde(default)]
		options: LaunchOptions,
	},
}

impl HostRequest {
	/// Event name as it appears on the wire.
	pub fn event(&self) -> &'static str {
		match self {
			HostRequest::Ping => "ping",
			HostRequest::Config => "config",
			HostRequest::Task { .. } => "task",
			HostRequest::FilePreprocessor { .. } => "file:preprocessor",
			HostRequest::BeforeBrowserLaunch { .. } => "before:browser:launch",
		}
	}
}

impl From<TaskRequest> for HostRequest {
	fn from(req: TaskRequest) -> Self {
		HostRequest::Task {
			name: req.name,
			payload: req.payload,
		}
	}
}

/// Failure details carried by a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
	/// Stable SCREAMING_SNAKE_CASE code (e.g. `UNKNOWN_TASK`, `QUERY_FAILED`)
	pub code: String,
	pub message: String,
}

/// Response envelope, one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<u64>,
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<WireError>,
}

impl HostResponse {
	pub fn success(id: Option<u64>, data: Value) -> Self {
		Self {
			id,
			ok: true,
			data: Some(data),
			error: None,
		}
	}

	pub fn failure(id: Option<u64>, code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			id,
			ok: false,
			data: None,
			error: Some(WireError {
				code: code.into(),
				message: message.into(),
			}),
		}
	}
}
