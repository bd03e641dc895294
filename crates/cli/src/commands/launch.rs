use cuke_protocol::{BrowserDescriptor, BrowserKind, LaunchOptions};
use serde_json::Value;

use crate::error::{CliError, Result};

pub fn execute(browser: BrowserKind, options: Option<&str>) -> Result<Value> {
	let options: LaunchOptions = match options {
		Some(raw) => serde_json::from_str(raw).map_err(|source| CliError::InvalidJson {
			what: "--options",
			source,
		})?,
		None => LaunchOptions::default(),
	};
	let customized = cuke::customize(&BrowserDescriptor::new(browser), &options);
	Ok(serde_json::to_value(customized.as_ref())?)
}
