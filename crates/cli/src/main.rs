use clap::Parser;
use cuke_cli::{
	cli::{Cli, Commands},
	commands,
	error::CliError,
	logging,
	output::{self, OutputFormat, ResultBuilder},
};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();
	let serving = matches!(cli.command, Commands::Serve);

	if let Err(err) = commands::dispatch(cli).await {
		handle_error(err, command, format, serving);
		std::process::exit(1);
	}
}

fn handle_error(err: CliError, command: &str, format: OutputFormat, serving: bool) {
	let cmd_error = err.to_command_error();

	output::print_error_stderr(&cmd_error);

	// stdout belongs to the protocol while serving
	if format == OutputFormat::Json && !serving {
		let result: output::CommandResult<()> = ResultBuilder::new(command)
			.error(cmd_error.code, cmd_error.message)
			.build();
		output::print_result(&result, format);
	}
}
