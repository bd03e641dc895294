use serde::Serialize;
use serde_json::Value;

use super::StaticConfig;
use crate::env::{RuntimeEnv, STEP_DEFINITIONS};

/// Static settings with runtime overrides applied.
///
/// Built once at startup and shared read-only for the rest of the process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EffectiveConfig {
	settings: StaticConfig,
}

impl EffectiveConfig {
	pub fn settings(&self) -> &StaticConfig {
		&self.settings
	}

	pub fn base_url(&self) -> &str {
		&self.settings.e2e.base_url
	}

	pub fn step_definitions(&self) -> &str {
		&self.settings.cucumber.step_definitions
	}

	pub fn filter_specs(&self) -> bool {
		self.settings.cucumber.filter_specs
	}

	pub fn omit_filtered(&self) -> bool {
		self.settings.cucumber.omit_filtered
	}

	/// Values visible to the sandboxed context.
	pub fn env(&self) -> &serde_json::Map<String, Value> {
		&self.settings.env
	}
}

/// Merges runtime overrides into the static settings.
///
/// Present runtime values win; absent ones keep the static default. The
/// cucumber settings are mirrored into `env` under the keys the test-side
/// preprocessor reads, and explicit `runtime.env` entries are applied last.
pub fn compose(base: &StaticConfig, runtime: &RuntimeEnv) -> EffectiveConfig {
	let mut settings = base.clone();

	if let Some(url) = &runtime.base_url {
		settings.e2e.base_url = url.clone();
	}
	if let Some(glob) = &runtime.step_definitions {
		settings.cucumber.step_definitions = glob.clone();
	}
	settings.cucumber.filter_specs = runtime.filter_specs.unwrap_or(base.cucumber.filter_specs);
	settings.cucumber.omit_filtered = runtime.omit_filtered.unwrap_or(base.cucumber.omit_filtered);

	settings.env.insert(
		STEP_DEFINITIONS.into(),
		Value::String(settings.cucumber.step_definitions.clone()),
	);
	settings.env.insert("filterSpecs".into(), Value::Bool(settings.cucumber.filter_specs));
	settings.env.insert("omitFiltered".into(), Value::Bool(settings.cucumber.omit_filtered));
	for (key, value) in &runtime.env {
		settings.env.insert(key.clone(), value.clone());
	}

	EffectiveConfig { settings }
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::config::DEFAULT_STEP_DEFINITIONS;

	#[test]
	fn absent_runtime_values_fall_back_to_static() {
		let base = StaticConfig::default();
		let effective = compose(&base, &RuntimeEnv::default());

		assert_eq!(effective.base_url(), "https://google.com");
		assert_eq!(effective.step_definitions(), DEFAULT_STEP_DEFINITIONS);
		assert!(effective.filter_specs());
		assert!(effective.omit_filtered());
	}

	#[test]
	fn runtime_values_override_static() {
		let base = StaticConfig::default();
		let runtime = RuntimeEnv {
			base_url: Some("http://localhost:8080".into()),
			omit_filtered: Some(false),
			..Default::default()
		};
		let effective = compose(&base, &runtime);

		assert_eq!(effective.base_url(), "http://localhost:8080");
		assert!(!effective.omit_filtered());
		assert!(effective.filter_specs());
	}

	#[test]
	fn disagreeing_runtimes_compose_differently() {
		let base = StaticConfig::default();
		let a = RuntimeEnv {
			base_url: Some("https://a.example.com".into()),
			..Default::default()
		};
		let b = RuntimeEnv {
			base_url: Some("https://b.example.com".into()),
			..Default::default()
		};
		assert_ne!(compose(&base, &a), compose(&base, &b));
		assert_eq!(compose(&base, &a), compose(&base, &a));
	}

	#[test]
	fn cucumber_settings_are_mirrored_into_env() {
		let base = StaticConfig::default();
		let runtime = RuntimeEnv {
			step_definitions: Some("steps/*.ts".into()),
			filter_specs: Some(false),
			..Default::default()
		};
		let effective = compose(&base, &runtime);

		assert_eq!(effective.env()[STEP_DEFINITIONS], json!("steps/*.ts"));
		assert_eq!(effective.env()["filterSpecs"], json!(false));
		assert_eq!(effective.env()["omitFiltered"], json!(true));
		assert_eq!(effective.env()["grepFilterSpecs"], json!(true));
	}

	#[test]
	fn runtime_env_entries_win_over_static_env() {
		let mut base = StaticConfig::default();
		base.env.insert("apiUser".into(), json!("static"));
		let mut runtime = RuntimeEnv::default();
		runtime.env.insert("apiUser".into(), json!("runtime"));
		runtime.env.insert("filterSpecs".into(), json!("forced"));

		let effective = compose(&base, &runtime);
		assert_eq!(effective.env()["apiUser"], json!("runtime"));
		assert_eq!(effective.env()["filterSpecs"], json!("forced"));
	}

	#[test]
	fn serializes_as_flat_settings() {
		let effective = compose(&StaticConfig::default(), &RuntimeEnv::default());
		let json = serde_json::to_value(&effective).unwrap();
		assert_eq!(json["viewportWidth"], 1920);
		assert_eq!(json["e2e"]["baseUrl"], "https://google.com");
	}
}
