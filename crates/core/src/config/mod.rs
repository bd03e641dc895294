//! Static runner settings and the effective configuration derived from them.
//!
//! [`StaticConfig`] holds the declarative defaults (viewport, timeouts,
//! artifact folders, reporter). It loads from `cuke.config.json` at the
//! project root; every field is optional in the file and falls back to the
//! built-in default. [`compose`] merges it with the runtime environment.

mod compose;

use std::fs;
use std::path::{Path, PathBuf};

pub use compose::{EffectiveConfig, compose};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

/// Config file name looked up at the project root.
pub const CONFIG_FILE: &str = "cuke.config.json";

/// Default glob for step definition sources.
pub const DEFAULT_STEP_DEFINITIONS: &str = "cypress/support/stepDefinitions/*.{js,ts}";

/// Declarative runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticConfig {
	pub viewport_width: u32,
	pub viewport_height: u32,
	pub default_command_timeout: u64,
	pub request_timeout: u64,
	pub response_timeout: u64,
	pub page_load_timeout: u64,
	pub chrome_web_security: bool,
	pub num_tests_kept_in_memory: u32,
	pub video: bool,
	pub video_compression: bool,
	pub video_upload_on_passes: bool,
	pub videos_folder: PathBuf,
	pub screenshots_folder: PathBuf,
	pub trash_assets_before_runs: bool,
	pub reporter: String,
	pub reporter_options: ReporterOptions,
	/// Values exposed to the sandboxed test context
	pub env: Map<String, Value>,
	pub cucumber: CucumberConfig,
	pub e2e: E2eConfig,
}

impl Default for StaticConfig {
	fn default() -> Self {
		let mut env = Map::new();
		env.insert("grepFilterSpecs".into(), Value::Bool(true));

		Self {
			viewport_width: 1920,
			viewport_height: 1080,
			default_command_timeout: 60_000,
			request_timeout: 30_000,
			response_timeout: 50_000,
			page_load_timeout: 60_000,
			chrome_web_security: false,
			num_tests_kept_in_memory: 0,
			video: true,
			video_compression: false,
			video_upload_on_passes: false,
			videos_folder: PathBuf::from("cypress/videos"),
			screenshots_folder: PathBuf::from("cypress/screenshots"),
			trash_assets_before_runs: true,
			reporter: "../node_modules/mochawesome".into(),
			reporter_options: ReporterOptions::default(),
			env,
			cucumber: CucumberConfig::default(),
			e2e: E2eConfig::default(),
		}
	}
}

impl StaticConfig {
	/// Reads a config file. Missing keys take their defaults.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		debug!(target = "cuke.config", path = %path.display(), "loaded static config");
		Ok(config)
	}

	/// Loads `<root>/cuke.config.json` when present, defaults otherwise.
	pub fn discover(root: &Path) -> Result<Self, ConfigError> {
		let path = root.join(CONFIG_FILE);
		if path.is_file() {
			Self::load(&path)
		} else {
			debug!(target = "cuke.config", root = %root.display(), "no config file, using defaults");
			Ok(Self::default())
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterOptions {
	pub charts: bool,
	pub overwrite: bool,
	pub html: bool,
	pub json: bool,
	pub report_dir: PathBuf,
}

impl Default for ReporterOptions {
	fn default() -> Self {
		Self {
			charts: true,
			overwrite: false,
			html: false,
			json: true,
			report_dir: PathBuf::from("reports"),
		}
	}
}

/// Step definition lookup and tag filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CucumberConfig {
	/// Glob (brace alternatives allowed) of step definition sources
	pub step_definitions: String,
	/// Skip specs whose scenarios are all filtered out by tags
	pub filter_specs: bool,
	/// Drop filtered scenarios from the output instead of marking them skipped
	pub omit_filtered: bool,
}

impl Default for CucumberConfig {
	fn default() -> Self {
		Self {
			step_definitions: DEFAULT_STEP_DEFINITIONS.into(),
			filter_specs: true,
			omit_filtered: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct E2eConfig {
	pub base_url: String,
	pub support_file: PathBuf,
	pub spec_pattern: String,
	pub test_isolation: bool,
	pub watch_for_file_changes: bool,
}

impl Default for E2eConfig {
	fn default() -> Self {
		Self {
			base_url: "https://google.com".into(),
			support_file: PathBuf::from("./cypress/support/e2e.ts"),
			spec_pattern: "cypress/e2e/features/*.feature".into(),
			test_isolation: false,
			watch_for_file_changes: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn defaults_match_runner_settings() {
		let cfg = StaticConfig::default();
		assert_eq!((cfg.viewport_width, cfg.viewport_height), (1920, 1080));
		assert_eq!(cfg.default_command_timeout, 60_000);
		assert_eq!(cfg.e2e.spec_pattern, "cypress/e2e/features/*.feature");
		assert_eq!(cfg.env.get("grepFilterSpecs"), Some(&Value::Bool(true)));
	}

	#[test]
	fn partial_file_keeps_other_defaults() {
		let temp = TempDir::new().unwrap();
		fs::write(
			temp.path().join(CONFIG_FILE),
			r#"{ "viewportWidth": 1280, "e2e": { "baseUrl": "http://localhost:3000" } }"#,
		)
		.unwrap();

		let cfg = StaticConfig::discover(temp.path()).unwrap();
		assert_eq!(cfg.viewport_width, 1280);
		assert_eq!(cfg.viewport_height, 1080);
		assert_eq!(cfg.e2e.base_url, "http://localhost:3000");
		assert_eq!(cfg.e2e.spec_pattern, "cypress/e2e/features/*.feature");
	}

	#[test]
	fn discover_without_file_returns_defaults() {
		let temp = TempDir::new().unwrap();
		assert_eq!(StaticConfig::discover(temp.path()).unwrap(), StaticConfig::default());
	}

	#[test]
	fn malformed_file_is_a_config_error() {
		let temp = TempDir::new().unwrap();
		fs::write(temp.path().join(CONFIG_FILE), "{ viewportWidth: ").unwrap();
		let err = StaticConfig::discover(temp.path()).unwrap_err();
		assert!(matches!(err, ConfigError::Parse { .. }));
	}
}
