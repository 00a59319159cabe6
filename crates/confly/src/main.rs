mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use confly_api::Device;

use crate::cli::Cli;
use crate::commands::Session;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let cfg = confly_config::load_config()?;
    let (connection, role) = config::resolve(&cli.global, &cfg)?;
    tracing::debug!(url = %connection.url, compliance = %connection.compliance, "connecting");

    let device = Device::connect(&connection)?;
    let session = Session::new(device, role);

    tracing::debug!(command = ?cli.command, "dispatching command");
    commands::dispatch(cli.command, &session, &cli.global).await
}
