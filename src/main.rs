use std::process::ExitCode;

use banana_mixer::config::{GeneratorConfig, setup_logging};
use clap::Parser;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = banana_mixer::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return ExitCode::FAILURE;
    }

    let config = match GeneratorConfig::try_from(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) =
        banana_mixer::web::setup_server(&cli.listen_address, cli.port, config).await
    {
        error!("Application error: {:#}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
