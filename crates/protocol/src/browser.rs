//! Browser descriptor and launch option types for the `before:browser:launch` hook.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Browser variants the host knows how to launch.
///
/// The known set is closed; any other name the runner reports (a custom
/// entry in its browsers list) is carried as [`BrowserKind::Other`] so the
/// launch hook can still answer for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BrowserKind {
	/// Google Chrome (stable, beta, canary channels)
	Chrome,
	/// Open-source Chromium build
	Chromium,
	/// Microsoft Edge
	Edge,
	/// Electron shell bundled with the runner
	Electron,
	/// Mozilla Firefox
	Firefox,
	/// WebKit (Safari engine)
	Webkit,
	/// Any other browser, by the name the runner reported
	Other(String),
}

impl BrowserKind {
	pub const ALL: [BrowserKind; 6] = [
		BrowserKind::Chrome,
		BrowserKind::Chromium,
		BrowserKind::Edge,
		BrowserKind::Electron,
		BrowserKind::Firefox,
		BrowserKind::Webkit,
	];

	pub fn as_str(&self) -> &str {
		match self {
			BrowserKind::Chrome => "chrome",
			BrowserKind::Chromium => "chromium",
			BrowserKind::Edge => "edge",
			BrowserKind::Electron => "electron",
			BrowserKind::Firefox => "firefox",
			BrowserKind::Webkit => "webkit",
			BrowserKind::Other(name) => name,
		}
	}
}

impl std::fmt::Display for BrowserKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for BrowserKind {
	type Err = String;

	/// Known names match case-insensitively; anything else non-empty is `Other`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let name = s.trim();
		if name.is_empty() {
			return Err("browser name must not be empty".to_string());
		}
		let lower = name.to_ascii_lowercase();
		Ok(BrowserKind::ALL
			.into_iter()
			.find(|kind| kind.as_str() == lower)
			.unwrap_or_else(|| BrowserKind::Other(name.to_string())))
	}
}

impl TryFrom<String> for BrowserKind {
	type Error = String;

	fn try_from(name: String) -> Result<Self, Self::Error> {
		name.parse()
	}
}

impl From<BrowserKind> for String {
	fn from(kind: BrowserKind) -> Self {
		match kind {
			BrowserKind::Other(name) => name,
			known => known.as_str().to_string(),
		}
	}
}

/// Browser the runner is about to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserDescriptor {
	pub name: BrowserKind,
	/// Engine family reported by the runner (`chromium`, `firefox`, `webkit`)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family: Option<String>,
	/// Release channel (`stable`, `beta`, `dev`, `canary`)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub channel: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default)]
	pub is_headless: bool,
}

impl BrowserDescriptor {
	/// Creates a headed descriptor with only the browser name set.
	pub fn new(name: BrowserKind) -> Self {
		Self {
			name,
			family: None,
			channel: None,
			version: None,
			is_headless: false,
		}
	}
}

/// Launch options owned by the runner for a single browser session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
	/// Browser profile preferences keyed by dotted preference path
	#[serde(default)]
	pub preferences: Map<String, Value>,
	/// Command-line flags, in the order they are passed to the browser
	#[serde(default)]
	pub args: Vec<String>,
	/// Unpacked extension directories to load
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub extensions: Vec<String>,
	/// Extra environment variables for the browser process
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub env: BTreeMap<String, String>,
}

impl LaunchOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a flag.
	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	/// Sets a preference.
	pub fn preference(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.preferences.insert(key.into(), value.into());
		self
	}
}
