use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, trace};

use super::feature::{self, Feature};
use super::steps::{self, ResolvedStep, StepDefinition};
use super::{Module, Plugin, Unit};
use crate::config::EffectiveConfig;
use crate::error::TransformError;

/// Step resolution for `.feature` files.
#[derive(Debug, Clone)]
pub struct CucumberPlugin {
	root: PathBuf,
	step_definitions: String,
	filter_specs: bool,
	omit_filtered: bool,
}

impl CucumberPlugin {
	pub fn new(root: &Path, config: &EffectiveConfig) -> Self {
		Self {
			root: root.to_path_buf(),
			step_definitions: config.step_definitions().to_string(),
			filter_specs: config.filter_specs(),
			omit_filtered: config.omit_filtered(),
		}
	}

	fn registration(&self, uri: &Path, feature: &Feature, definitions: &[&StepDefinition], resolved: &[ResolvedStep]) -> String {
		let document = json!({
			"uri": uri,
			"feature": feature,
			"stepDefinitions": definitions,
			"steps": resolved,
			"options": {
				"filterSpecs": self.filter_specs,
				"omitFiltered": self.omit_filtered,
			},
		});
		format!(
			"(function (feature) {{\n\tvar registry = (globalThis.__cukeFeatures = globalThis.__cukeFeatures || []);\n\tregistry.push(feature);\n}})({document});\n"
		)
	}
}

#[async_trait]
impl Plugin for CucumberPlugin {
	fn name(&self) -> &'static str {
		"cucumber"
	}

	async fn transform(&self, unit: Unit) -> Result<Unit, TransformError> {
		if !unit.is_feature() {
			trace!(target = "cuke.preprocess", path = %unit.path.display(), "not a feature file, skipping step resolution");
			return Ok(unit);
		}

		let parsed = feature::parse(&unit.source).map_err(|err| TransformError::Syntax {
			path: unit.path.clone(),
			line: err.line,
			column: 1,
			message: err.message,
		})?;

		let files = steps::load_definitions(&self.root, &self.step_definitions).await?;
		let definitions: Vec<&StepDefinition> = files.iter().flat_map(|file| &file.definitions).collect();
		let concrete = parsed.concrete_steps();
		let resolved = steps::resolve(&unit.path, &concrete, &definitions)?;

		let uri = unit.path.strip_prefix(&self.root).unwrap_or(&unit.path);
		let source = self.registration(uri, &parsed, &definitions, &resolved);
		debug!(
			target = "cuke.preprocess",
			path = %uri.display(),
			scenarios = parsed.scenarios.len(),
			steps = resolved.len(),
			definitions = definitions.len(),
			"steps resolved"
		);

		let dependencies = files
			.iter()
			.map(|file| Module {
				path: file.path.clone(),
				source: file.source.clone(),
			})
			.collect();
		Ok(Unit {
			path: unit.path,
			source,
			dependencies,
		})
	}
}
