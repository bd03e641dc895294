//! The host: composed configuration plus the three hook handlers.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cuke_protocol::{BrowserDescriptor, HostMessage, HostRequest, HostResponse, LaunchOptions, TaskRequest, TaskResult};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::bridge::{Gateways, TaskBridge, register_builtin_tasks};
use crate::config::{EffectiveConfig, StaticConfig, compose};
use crate::env::{HostEnv, Vars};
use crate::error::{Result, TaskError, TransformError};
use crate::gateway::Connector;
use crate::launch;
use crate::preprocess::{PluginChain, build_pipeline};
use crate::project::Project;

/// Everything the runner's lifecycle hooks call into.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug)]
pub struct Host {
	config: EffectiveConfig,
	project: Project,
	pipeline: PluginChain,
	bridge: TaskBridge,
}

impl Host {
	/// Composes the effective config, builds the preprocessor chain and
	/// registers the task, file-load and browser-launch hooks.
	pub fn setup(static_config: &StaticConfig, host_env: HostEnv, project: Project, connector: Arc<dyn Connector>) -> Self {
		let config = compose(static_config, &host_env.runtime);
		info!(
			target = "cuke.config",
			root = %project.root().display(),
			base_url = config.base_url(),
			step_definitions = config.step_definitions(),
			"configuration composed"
		);

		let pipeline = build_pipeline(&config, project.root());
		info!(target = "cuke.preprocess", plugins = ?pipeline.names(), "registered file:preprocessor");
		info!(target = "cuke.launch", "registered before:browser:launch");

		let mut bridge = TaskBridge::new();
		register_builtin_tasks(
			&mut bridge,
			Gateways {
				connector,
				connection: Arc::new(host_env.connection),
				root: project.root().to_path_buf(),
			},
		);
		info!(target = "cuke.task", tasks = ?bridge.names().collect::<Vec<_>>(), "registered task");

		Self {
			config,
			project,
			pipeline,
			bridge,
		}
	}

	/// Loads the static config file and validates the environment before
	/// building the host. Any configuration error means no host.
	pub fn load(project: Project, vars: &Vars, connector: Arc<dyn Connector>) -> Result<Self> {
		let static_config = StaticConfig::discover(project.root())?;
		let host_env = HostEnv::from_vars(vars)?;
		Ok(Self::setup(&static_config, host_env, project, connector))
	}

	pub fn config(&self) -> &EffectiveConfig {
		&self.config
	}

	pub fn project(&self) -> &Project {
		&self.project
	}

	pub fn root(&self) -> &Path {
		self.project.root()
	}

	pub fn bridge(&self) -> &TaskBridge {
		&self.bridge
	}

	/// `file:preprocessor` hook. Relative paths resolve against the project root.
	pub async fn preprocess(&self, path: impl AsRef<Path>) -> std::result::Result<String, TransformError> {
		let resolved: PathBuf = self.project.resolve(path);
		debug!(target = "cuke.preprocess", path = %resolved.display(), "preprocessing");
		self.pipeline.run(&resolved).await
	}

	/// `before:browser:launch` hook.
	pub fn before_browser_launch<'a>(&self, browser: &BrowserDescriptor, options: &'a LaunchOptions) -> Cow<'a, LaunchOptions> {
		launch::customize(browser, options)
	}

	/// `task` hook.
	pub async fn task(&self, request: TaskRequest) -> std::result::Result<TaskResult, TaskError> {
		self.bridge.dispatch(&request.name, request.payload).await
	}

	/// Runs one hook request and returns its JSON result.
	pub async fn handle(&self, request: HostRequest) -> Result<Value> {
		match request {
			HostRequest::Ping => Ok(json!({ "pong": true })),
			HostRequest::Config => Ok(serde_json::to_value(&self.config)?),
			HostRequest::Task { name, payload } => Ok(self.task(TaskRequest::new(name, payload)).await?),
			HostRequest::FilePreprocessor { path } => Ok(Value::String(self.preprocess(path).await?)),
			HostRequest::BeforeBrowserLaunch { browser, options } => {
				let customized = self.before_browser_launch(&browser, &options);
				Ok(serde_json::to_value(customized.as_ref())?)
			}
		}
	}

	/// Runs `message` and wraps the outcome in a response envelope.
	pub async fn respond(&self, message: HostMessage) -> HostResponse {
		let event = message.request.event();
		match self.handle(message.request).await {
			Ok(data) => HostResponse::success(message.id, data),
			Err(err) => {
				debug!(target = "cuke.serve", event, code = err.code(), error = %err, "request failed");
				HostResponse::failure(message.id, err.code(), err.to_string())
			}
		}
	}
}
