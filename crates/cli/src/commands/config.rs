use cuke::Project;
use serde_json::Value;

use crate::error::Result;

pub fn execute(project: &Project) -> Result<Value> {
	let config = super::effective_config(project)?;
	Ok(serde_json::to_value(&config)?)
}
