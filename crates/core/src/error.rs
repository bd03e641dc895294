use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level host error. Each layer keeps its own enum; this one aggregates
/// them so hook callers get a single type with a stable wire code.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Task(#[from] TaskError),

	#[error(transparent)]
	Transform(#[from] TransformError),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn code(&self) -> &'static str {
		match self {
			Error::Config(err) => err.code(),
			Error::Task(err) => err.code(),
			Error::Transform(err) => err.code(),
			Error::Json(_) => "INVALID_JSON",
		}
	}
}

/// Missing or malformed startup configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing required environment variable {0}")]
	MissingVar(&'static str),

	#[error("invalid port in {var}: {value:?} ({source})")]
	InvalidPort {
		var: &'static str,
		value: String,
		#[source]
		source: std::num::ParseIntError,
	},

	#[error("invalid boolean in {var}: {value:?} (expected true or false)")]
	InvalidFlag { var: &'static str, value: String },

	#[error("invalid base URL {value:?}: {source}")]
	InvalidBaseUrl {
		value: String,
		#[source]
		source: url::ParseError,
	},

	#[error("failed to read config file {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to load {}: {source}", path.display())]
	DotEnv {
		path: PathBuf,
		#[source]
		source: dotenvy::Error,
	},
}

impl ConfigError {
	pub fn code(&self) -> &'static str {
		match self {
			ConfigError::MissingVar(_) => "CONFIG_MISSING",
			ConfigError::InvalidPort { .. }
			| ConfigError::InvalidFlag { .. }
			| ConfigError::InvalidBaseUrl { .. } => "CONFIG_INVALID",
			ConfigError::Read { .. } | ConfigError::Parse { .. } | ConfigError::DotEnv { .. } => {
				"CONFIG_UNREADABLE"
			}
		}
	}
}

/// Failure talking to a privileged resource.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("failed to connect to database {database} at {host}:{port}: {source}")]
	Connect {
		host: String,
		port: u16,
		database: String,
		#[source]
		source: sqlx::Error,
	},

	#[error("query failed: {0}")]
	Query(#[source] sqlx::Error),

	#[error("failed to decode column {column}: {source}")]
	Decode {
		column: String,
		#[source]
		source: sqlx::Error,
	},

	#[error("column {column} has unsupported type {type_name}")]
	UnsupportedColumn { column: String, type_name: String },

	#[error("unsupported query parameter at position {index}: {message}")]
	UnsupportedParameter { index: usize, message: String },

	#[error("failed to close database connection: {0}")]
	Close(#[source] sqlx::Error),
}

impl GatewayError {
	pub fn code(&self) -> &'static str {
		match self {
			GatewayError::Connect { .. } => "CONNECTION_FAILED",
			GatewayError::Query(_) => "QUERY_FAILED",
			GatewayError::Decode { .. } | GatewayError::UnsupportedColumn { .. } => "DECODE_FAILED",
			GatewayError::UnsupportedParameter { .. } => "INVALID_PAYLOAD",
			GatewayError::Close(_) => "CLOSE_FAILED",
		}
	}
}

/// Failure of a task bridge invocation.
#[derive(Debug, Error)]
pub enum TaskError {
	/// The sandboxed context asked for a task nobody registered.
	#[error("no handler registered for task '{0}'")]
	UnknownTask(String),

	#[error("invalid payload for task '{task}': {message}")]
	InvalidPayload { task: &'static str, message: String },

	#[error(transparent)]
	Gateway(#[from] GatewayError),
}

impl TaskError {
	pub fn code(&self) -> &'static str {
		match self {
			TaskError::UnknownTask(_) => "UNKNOWN_TASK",
			TaskError::InvalidPayload { .. } => "INVALID_PAYLOAD",
			TaskError::Gateway(err) => err.code(),
		}
	}
}

/// A step in a feature file that no definition matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedStep {
	pub line: usize,
	pub text: String,
}

fn format_unresolved(steps: &[UnresolvedStep]) -> String {
	steps
		.iter()
		.map(|step| format!("line {}: {}", step.line, step.text))
		.collect::<Vec<_>>()
		.join("; ")
}

/// Failure while preprocessing a spec file. Aborts loading of that file only.
#[derive(Debug, Error)]
pub enum TransformError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid step definition pattern {pattern:?}: {source}")]
	Pattern {
		pattern: String,
		#[source]
		source: glob::PatternError,
	},

	#[error("invalid step definition at {}:{line}: {message}", path.display())]
	Definition {
		path: PathBuf,
		line: usize,
		message: String,
	},

	#[error("{}: no step definition matches {}", path.display(), format_unresolved(steps))]
	UnresolvedSteps {
		path: PathBuf,
		steps: Vec<UnresolvedStep>,
	},

	#[error("{}:{line}: step {text:?} matches more than one definition ({})", path.display(), candidates.join(", "))]
	AmbiguousStep {
		path: PathBuf,
		line: usize,
		text: String,
		candidates: Vec<String>,
	},

	#[error("syntax error in {}:{line}:{column}: {message}", path.display())]
	Syntax {
		path: PathBuf,
		line: usize,
		column: usize,
		message: String,
	},
}

impl TransformError {
	pub fn code(&self) -> &'static str {
		match self {
			TransformError::Read { .. } => "READ_FAILED",
			TransformError::Pattern { .. } => "INVALID_PATTERN",
			TransformError::Definition { .. } => "INVALID_DEFINITION",
			TransformError::UnresolvedSteps { .. } => "UNRESOLVED_STEP",
			TransformError::AmbiguousStep { .. } => "AMBIGUOUS_STEP",
			TransformError::Syntax { .. } => "SYNTAX_ERROR",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_pass_through_aggregate() {
		let err: Error = TaskError::UnknownTask("seedUsers".into()).into();
		assert_eq!(err.code(), "UNKNOWN_TASK");
		assert_eq!(err.to_string(), "no handler registered for task 'seedUsers'");

		let err: Error = ConfigError::MissingVar("PG_PORT").into();
		assert_eq!(err.code(), "CONFIG_MISSING");
	}

	#[test]
	fn gateway_codes_surface_through_task_error() {
		let err = TaskError::from(GatewayError::Query(sqlx::Error::Protocol("relation missing".into())));
		assert_eq!(err.code(), "QUERY_FAILED");
		assert!(err.to_string().contains("relation missing"));
	}

	#[test]
	fn unresolved_steps_are_listed_in_message() {
		let err = TransformError::UnresolvedSteps {
			path: PathBuf::from("login.feature"),
			steps: vec![
				UnresolvedStep { line: 4, text: "I open the portal".into() },
				UnresolvedStep { line: 7, text: "I see a banner".into() },
			],
		};
		let msg = err.to_string();
		assert!(msg.contains("line 4: I open the portal"));
		assert!(msg.contains("line 7: I see a banner"));
		assert_eq!(err.code(), "UNRESOLVED_STEP");
	}
}
