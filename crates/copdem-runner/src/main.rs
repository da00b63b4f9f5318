use clap::Parser;
use copdem_runner::{init_logging, run, Cli, ERROR_EXIT_CODE};
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(outcome) => ExitCode::from(outcome.exit_code() as u8),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(ERROR_EXIT_CODE as u8)
        }
    }
}
