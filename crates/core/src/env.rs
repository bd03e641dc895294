//! Process environment read once at host startup.
//!
//! Everything here is parsed eagerly: a missing credential or a malformed
//! port fails startup instead of surfacing on the first database task.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

use tracing::debug;
use url::Url;

use crate::error::ConfigError;

pub const PG_USER: &str = "PG_USER";
pub const PG_PWD: &str = "PG_PWD";
pub const PG_HOST: &str = "PG_HOST";
pub const PG_DBNAME: &str = "PG_DBNAME";
pub const PG_PORT: &str = "PG_PORT";
pub const PG_SSL: &str = "PG_SSL";
pub const BASE_URL: &str = "BASE_URL";
pub const STEP_DEFINITIONS: &str = "CYPRESS_CUCUMBER_PREPROCESSOR_STEP_DEFINITIONS";
pub const FILTER_SPECS: &str = "CYPRESS_FILTER_SPECS";
pub const OMIT_FILTERED: &str = "CYPRESS_OMIT_FILTERED";

/// Variables with this prefix are exposed to the test context with the
/// prefix stripped, e.g. `CYPRESS_API_TOKEN` becomes `API_TOKEN`.
pub const SANDBOX_PREFIX: &str = "CYPRESS_";

/// Snapshot of environment variables, detached from the live process.
pub type Vars = BTreeMap<String, String>;

/// Captures the process environment, loading `<root>/.env` first.
///
/// Variables already set in the process take precedence over the file.
pub fn capture(root: &Path) -> Result<Vars, ConfigError> {
	let dotenv = root.join(".env");
	let mut vars = utf8_vars(std::env::vars_os());
	if dotenv.is_file() {
		let entries = dotenvy::from_path_iter(&dotenv).map_err(|source| ConfigError::DotEnv {
			path: dotenv.clone(),
			source,
		})?;
		for entry in entries {
			let (key, value) = entry.map_err(|source| ConfigError::DotEnv {
				path: dotenv.clone(),
				source,
			})?;
			vars.entry(key).or_insert(value);
		}
		debug!(target = "cuke.config", path = %dotenv.display(), "loaded .env");
	}
	Ok(vars)
}

/// Keeps the entries whose name and value are both UTF-8. Anything else
/// cannot belong to the host and is skipped.
fn utf8_vars(entries: impl IntoIterator<Item = (OsString, OsString)>) -> Vars {
	entries
		.into_iter()
		.filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
			(Ok(key), Ok(value)) => Some((key, value)),
			(key, _) => {
				debug!(target = "cuke.config", key = ?key, "skipping non-UTF-8 environment variable");
				None
			}
		})
		.collect()
}

/// Database endpoint and credentials for the `connectDB` task.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
	pub user: String,
	pub password: String,
	pub host: String,
	pub database: String,
	pub port: u16,
	pub tls: bool,
}

impl ConnectionConfig {
	pub fn from_vars(vars: &Vars) -> Result<Self, ConfigError> {
		let port_raw = required(vars, PG_PORT)?;
		let port = port_raw.trim().parse::<u16>().map_err(|source| ConfigError::InvalidPort {
			var: PG_PORT,
			value: port_raw.to_string(),
			source,
		})?;

		Ok(Self {
			user: required(vars, PG_USER)?.to_string(),
			password: required(vars, PG_PWD)?.to_string(),
			host: required(vars, PG_HOST)?.to_string(),
			database: required(vars, PG_DBNAME)?.to_string(),
			port,
			tls: flag(vars, PG_SSL)?.unwrap_or(false),
		})
	}
}

impl std::fmt::Debug for ConnectionConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectionConfig")
			.field("user", &self.user)
			.field("password", &"<redacted>")
			.field("host", &self.host)
			.field("database", &self.database)
			.field("port", &self.port)
			.field("tls", &self.tls)
			.finish()
	}
}

/// Runtime-derived overrides fed into the config composer.
///
/// `None` means "not set at runtime": the static default applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeEnv {
	/// Absolute URL, validated but kept as written
	pub base_url: Option<String>,
	pub step_definitions: Option<String>,
	pub filter_specs: Option<bool>,
	pub omit_filtered: Option<bool>,
	/// `CYPRESS_*` variables, prefix stripped, merged into the sandbox env map
	pub env: serde_json::Map<String, serde_json::Value>,
}

impl RuntimeEnv {
	pub fn from_vars(vars: &Vars) -> Result<Self, ConfigError> {
		let base_url = match non_empty(vars, BASE_URL) {
			Some(raw) => {
				Url::parse(raw).map_err(|source| ConfigError::InvalidBaseUrl {
					value: raw.to_string(),
					source,
				})?;
				Some(raw.to_string())
			}
			None => None,
		};

		Ok(Self {
			base_url,
			step_definitions: non_empty(vars, STEP_DEFINITIONS).map(str::to_string),
			filter_specs: flag(vars, FILTER_SPECS)?,
			omit_filtered: flag(vars, OMIT_FILTERED)?,
			env: sandbox_env(vars),
		})
	}
}

fn sandbox_env(vars: &Vars) -> serde_json::Map<String, serde_json::Value> {
	vars.iter()
		.filter(|(key, _)| ![STEP_DEFINITIONS, FILTER_SPECS, OMIT_FILTERED].contains(&key.as_str()))
		.filter_map(|(key, value)| {
			let name = key.strip_prefix(SANDBOX_PREFIX).filter(|name| !name.is_empty())?;
			Some((name.to_string(), serde_json::Value::String(value.clone())))
		})
		.collect()
}

/// Everything the host reads from its environment.
#[derive(Debug, Clone)]
pub struct HostEnv {
	pub connection: ConnectionConfig,
	pub runtime: RuntimeEnv,
}

impl HostEnv {
	pub fn from_vars(vars: &Vars) -> Result<Self, ConfigError> {
		Ok(Self {
			connection: ConnectionConfig::from_vars(vars)?,
			runtime: RuntimeEnv::from_vars(vars)?,
		})
	}
}

fn required<'a>(vars: &'a Vars, key: &'static str) -> Result<&'a str, ConfigError> {
	vars.get(key).map(String::as_str).ok_or(ConfigError::MissingVar(key))
}

fn non_empty<'a>(vars: &'a Vars, key: &str) -> Option<&'a str> {
	vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn flag(vars: &Vars, key: &'static str) -> Result<Option<bool>, ConfigError> {
	match non_empty(vars, key) {
		None => Ok(None),
		Some(raw) => match raw.to_ascii_lowercase().as_str() {
			"true" | "1" | "yes" => Ok(Some(true)),
			"false" | "0" | "no" => Ok(Some(false)),
			_ => Err(ConfigError::InvalidFlag {
				var: key,
				value: raw.to_string(),
			}),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> Vars {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	fn pg_vars() -> Vars {
		vars(&[
			(PG_USER, "qa"),
			(PG_PWD, "secret"),
			(PG_HOST, "localhost"),
			(PG_DBNAME, "app_test"),
			(PG_PORT, "5432"),
		])
	}

	#[test]
	fn connection_config_reads_all_fields() {
		let cfg = ConnectionConfig::from_vars(&pg_vars()).unwrap();
		assert_eq!(cfg.user, "qa");
		assert_eq!(cfg.database, "app_test");
		assert_eq!(cfg.port, 5432);
		assert!(!cfg.tls);
	}

	#[test]
	fn missing_port_is_a_config_error() {
		let mut v = pg_vars();
		v.remove(PG_PORT);
		let err = ConnectionConfig::from_vars(&v).unwrap_err();
		assert!(matches!(err, ConfigError::MissingVar(PG_PORT)));
	}

	#[test]
	fn malformed_port_is_a_config_error() {
		for bad in ["", "abc", "70000", "-1"] {
			let mut v = pg_vars();
			v.insert(PG_PORT.into(), bad.into());
			let err = ConnectionConfig::from_vars(&v).unwrap_err();
			assert!(matches!(err, ConfigError::InvalidPort { .. }), "port {bad:?} gave {err:?}");
		}
	}

	#[test]
	fn ssl_flag_is_parsed() {
		let mut v = pg_vars();
		v.insert(PG_SSL.into(), "TRUE".into());
		assert!(ConnectionConfig::from_vars(&v).unwrap().tls);

		v.insert(PG_SSL.into(), "maybe".into());
		assert!(matches!(
			ConnectionConfig::from_vars(&v),
			Err(ConfigError::InvalidFlag { var: PG_SSL, .. })
		));
	}

	#[test]
	fn debug_redacts_password() {
		let cfg = ConnectionConfig::from_vars(&pg_vars()).unwrap();
		let dbg = format!("{cfg:?}");
		assert!(!dbg.contains("secret"));
		assert!(dbg.contains("<redacted>"));
	}

	#[test]
	fn prefixed_variables_reach_the_sandbox_env() {
		let rt = RuntimeEnv::from_vars(&vars(&[
			("CYPRESS_API_TOKEN", "t0k3n"),
			("CYPRESS_", "empty name"),
			(FILTER_SPECS, "true"),
			(STEP_DEFINITIONS, "steps/*.ts"),
			(PG_USER, "qa"),
		]))
		.unwrap();
		assert_eq!(rt.env.len(), 1);
		assert_eq!(rt.env["API_TOKEN"], "t0k3n");
	}

	#[cfg(unix)]
	#[test]
	fn non_utf8_variables_are_skipped() {
		use std::os::unix::ffi::OsStringExt;

		let entries = vec![
			(OsString::from("BADVAR"), OsString::from_vec(vec![0xff])),
			(OsString::from_vec(vec![b'K', 0xfe]), OsString::from("value")),
			(OsString::from(PG_HOST), OsString::from("db.test")),
		];
		let vars = utf8_vars(entries);
		assert_eq!(vars.len(), 1);
		assert_eq!(vars[PG_HOST], "db.test");
	}

	#[test]
	fn runtime_env_absent_values_are_none() {
		let rt = RuntimeEnv::from_vars(&Vars::new()).unwrap();
		assert_eq!(rt, RuntimeEnv::default());
	}

	#[test]
	fn runtime_env_rejects_relative_base_url() {
		let err = RuntimeEnv::from_vars(&vars(&[(BASE_URL, "/login")])).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
	}

	#[test]
	fn runtime_env_reads_overrides() {
		let rt = RuntimeEnv::from_vars(&vars(&[
			(BASE_URL, "https://staging.example.com"),
			(STEP_DEFINITIONS, "e2e/steps/**/*.ts"),
			(FILTER_SPECS, "false"),
		]))
		.unwrap();
		assert_eq!(rt.base_url.as_deref(), Some("https://staging.example.com"));
		assert_eq!(rt.step_definitions.as_deref(), Some("e2e/steps/**/*.ts"));
		assert_eq!(rt.filter_specs, Some(false));
		assert_eq!(rt.omit_filtered, None);
	}

	#[test]
	fn capture_prefers_process_over_dotenv() {
		let temp = tempfile::TempDir::new().unwrap();
		std::fs::write(temp.path().join(".env"), "CUKE_TEST_ONLY_FROM_FILE=file\nPATH=from-file\n").unwrap();

		let vars = capture(temp.path()).unwrap();
		assert_eq!(vars.get("CUKE_TEST_ONLY_FROM_FILE").map(String::as_str), Some("file"));
		assert_ne!(vars.get("PATH").map(String::as_str), Some("from-file"));
	}
}
