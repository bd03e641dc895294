use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cuke_protocol::BrowserKind;

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "cuke")]
#[command(about = "Host process for cucumber browser tests: tasks, launch options, preprocessing")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format for one-shot commands: json (default) or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	/// Project root (default: nearest directory with cuke.config.json or package.json)
	#[arg(long, global = true, value_name = "DIR")]
	pub root: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Answer hook requests on stdin/stdout, one JSON object per line
	Serve,

	/// Print the effective configuration
	Config,

	/// Run one task handler
	Task {
		/// Task name (connectDB, fileExists)
		name: String,

		/// JSON payload; anything that is not valid JSON is sent as a string
		payload: Option<String>,
	},

	/// Print the launch options a browser would start with
	Launch {
		/// Browser name (chrome, chromium, edge, electron, firefox, webkit, or a custom one)
		browser: BrowserKind,

		/// Launch options to start from, as JSON
		#[arg(long, value_name = "JSON")]
		options: Option<String>,
	},

	/// Run a spec file through the preprocessor chain
	Preprocess {
		/// Spec file, relative to the project root or absolute
		file: PathBuf,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Serve => "serve",
			Commands::Config => "config",
			Commands::Task { .. } => "task",
			Commands::Launch { .. } => "launch",
			Commands::Preprocess { .. } => "preprocess",
		}
	}
}
