mod config;
mod launch;
mod preprocess;
pub mod serve;
mod task;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use cuke::config::{EffectiveConfig, StaticConfig, compose};
use cuke::env::{self, RuntimeEnv};
use cuke::Project;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::{self, ResultBuilder};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let started = Instant::now();
	let name = cli.command.name();
	let project = resolve_project(cli.root.as_deref())?;

	let data = match cli.command {
		Commands::Serve => return serve::execute(project).await,
		Commands::Config => config::execute(&project)?,
		Commands::Task { name, payload } => task::execute(project, &name, payload.as_deref()).await?,
		Commands::Launch { browser, options } => launch::execute(browser, options.as_deref())?,
		Commands::Preprocess { file } => preprocess::execute(&project, &file).await?,
	};

	let result = ResultBuilder::new(name).started_at(started).data(data).build();
	output::print_result(&result, cli.format);
	Ok(())
}

fn resolve_project(root: Option<&Path>) -> Result<Project> {
	let project = match root {
		Some(root) => Project::from_root(canonical_root(root)?),
		None => Project::detect().context("failed to read the current directory")?,
	};
	Ok(project)
}

/// Absolute, `.`/`..`-free form of `--root`, so paths derived from it
/// stay clean in bundles and logs.
fn canonical_root(root: &Path) -> Result<PathBuf> {
	let canonical = std::fs::canonicalize(root).with_context(|| format!("failed to resolve project root {}", root.display()))?;
	Ok(canonical)
}

/// Config for commands that never touch the database, so `PG_*` need not be set.
fn effective_config(project: &Project) -> Result<EffectiveConfig> {
	let vars = env::capture(project.root())?;
	let static_config = StaticConfig::discover(project.root())?;
	let runtime = RuntimeEnv::from_vars(&vars)?;
	Ok(compose(&static_config, &runtime))
}
