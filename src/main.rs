use std::process::ExitCode;

use clap::Parser;
use refresh_token_store::cli::{self, Cli, CliError, Command};
use refresh_token_store::config::Config;
use refresh_token_store::storage::OperationContext;
use refresh_token_store::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit with 2 from here.
    let cli = Cli::parse();

    if let Err(e) = init_telemetry("token-admin") {
        eprintln!("failed to initialize telemetry: {e}");
    }

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command) -> Result<(), CliError> {
    let config = Config::load().map_err(CliError::Config)?;
    tracing::debug!(config = ?config.sanitized(), "configuration loaded");

    let service = cli::connect(&config, &command, Box::new(std::io::stderr())).await?;

    let ctx = OperationContext::default();
    let mut stdout = std::io::stdout().lock();
    cli::run(&service, &ctx, command, &mut stdout).await
}
