use std::path::Path;

use cuke::{Project, build_pipeline};
use serde_json::Value;

use crate::error::Result;

pub async fn execute(project: &Project, file: &Path) -> Result<Value> {
	let config = super::effective_config(project)?;
	let pipeline = build_pipeline(&config, project.root());
	let code = pipeline.run(&project.resolve(file)).await?;
	Ok(Value::String(code))
}
