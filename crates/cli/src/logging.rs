use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the stderr logger. Stdout stays reserved for command output and
/// the `serve` protocol.
pub fn init_logging(verbosity: u8) {
	// 0 = warnings and errors only
	// 1 (-v) = info for the host, warn for sqlx
	// 2+ (-vv) = debug for everything
	let filter = match verbosity {
		0 => "warn,sqlx=off",
		1 => "info,sqlx=warn",
		_ => "debug",
	};

	let env_filter = EnvFilter::try_from_env("CUKE_LOG").unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
