use thiserror::Error;

use crate::output::CommandError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Host(#[from] cuke::Error),

	#[error("invalid JSON for {what}: {source}")]
	InvalidJson {
		what: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl From<cuke::ConfigError> for CliError {
	fn from(err: cuke::ConfigError) -> Self {
		CliError::Host(err.into())
	}
}

impl From<cuke::TaskError> for CliError {
	fn from(err: cuke::TaskError) -> Self {
		CliError::Host(err.into())
	}
}

impl From<cuke::TransformError> for CliError {
	fn from(err: cuke::TransformError) -> Self {
		CliError::Host(err.into())
	}
}

impl From<serde_json::Error> for CliError {
	fn from(err: serde_json::Error) -> Self {
		CliError::Host(err.into())
	}
}

impl CliError {
	pub fn code(&self) -> &'static str {
		match self {
			CliError::Host(err) => err.code(),
			CliError::InvalidJson { .. } => "INVALID_INPUT",
			CliError::Io(_) => "IO_ERROR",
			CliError::Anyhow(_) => "INTERNAL_ERROR",
		}
	}

	pub fn to_command_error(&self) -> CommandError {
		CommandError {
			code: self.code().to_string(),
			message: self.to_string(),
		}
	}
}
