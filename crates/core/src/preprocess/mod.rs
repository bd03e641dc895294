//! File preprocessor: an ordered chain of source transforms.
//!
//! Every spec file the runner loads passes through the same [`PluginChain`].
//! Plugins take a [`Unit`] by value and hand back the transformed one, so a
//! failure anywhere aborts that file and nothing partial escapes.
//!
//! The chain built by [`build_pipeline`] has two stages:
//!
//! 1. [`CucumberPlugin`] resolves the steps of `.feature` files against the
//!    configured step definitions and replaces the file with a generated
//!    registration module. Other files pass through unchanged.
//! 2. [`Bundler`] syntax-checks the unit and its dependencies, lowers
//!    `import`/`export` and TypeScript annotations, applies the
//!    compile-time defines and wraps everything in one IIFE.

mod bundle;
mod cucumber;
pub mod feature;
mod lower;
pub mod steps;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
pub use bundle::{Bundler, SyntaxError, TARGET, scan};
pub use cucumber::CucumberPlugin;
use tracing::{info, warn};

use crate::config::EffectiveConfig;
use crate::error::TransformError;

/// A source file bundled ahead of the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
	pub path: PathBuf,
	pub source: String,
}

/// The file being transformed, plus anything it pulled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
	pub path: PathBuf,
	pub source: String,
	pub dependencies: Vec<Module>,
}

impl Unit {
	pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			source: source.into(),
			dependencies: Vec::new(),
		}
	}

	pub fn is_feature(&self) -> bool {
		self.path.extension().is_some_and(|ext| ext == "feature")
	}
}

/// One stage of the chain.
#[async_trait]
pub trait Plugin: Send + Sync {
	fn name(&self) -> &'static str;

	async fn transform(&self, unit: Unit) -> Result<Unit, TransformError>;
}

/// Immutable, cheaply cloneable sequence of plugins.
#[derive(Clone)]
pub struct PluginChain {
	plugins: Arc<[Arc<dyn Plugin>]>,
}

impl PluginChain {
	pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
		Self {
			plugins: plugins.into(),
		}
	}

	pub fn names(&self) -> Vec<&'static str> {
		self.plugins.iter().map(|p| p.name()).collect()
	}

	/// Reads `path` and runs it through every plugin.
	pub async fn run(&self, path: &Path) -> Result<String, TransformError> {
		let source = tokio::fs::read_to_string(path)
			.await
			.map_err(|source| TransformError::Read {
				path: path.to_path_buf(),
				source,
			})?;
		self.transform(Unit::new(path, source)).await
	}

	/// Runs an in-memory unit through every plugin.
	pub async fn transform(&self, unit: Unit) -> Result<String, TransformError> {
		let started = Instant::now();
		let path = unit.path.clone();
		let mut unit = unit;
		for plugin in self.plugins.iter() {
			unit = match plugin.transform(unit).await {
				Ok(unit) => unit,
				Err(err) => {
					warn!(target = "cuke.preprocess", path = %path.display(), plugin = plugin.name(), code = err.code(), error = %err, "preprocessing failed");
					return Err(err);
				}
			};
		}
		info!(
			target = "cuke.preprocess",
			path = %path.display(),
			bytes = unit.source.len(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"file preprocessed"
		);
		Ok(unit.source)
	}
}

impl std::fmt::Debug for PluginChain {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PluginChain").field("plugins", &self.names()).finish()
	}
}

/// Builds the preprocessor chain for `config`, resolving definition globs
/// against `root`.
pub fn build_pipeline(config: &EffectiveConfig, root: &Path) -> PluginChain {
	let plugins: Vec<Arc<dyn Plugin>> = vec![
		Arc::new(CucumberPlugin::new(root, config)),
		Arc::new(Bundler::new().relative_to(root)),
	];
	PluginChain::new(plugins)
}
