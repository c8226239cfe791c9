use clap::Parser;
use lexchat::cli::{Cli, CliError, run};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout carries only the streamed answer.
#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
