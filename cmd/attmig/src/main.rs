mod cli;
mod networks;

use clap::Parser;
use eyre::Result;

use crate::cli::CLI;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    CLI::parse().command.run().await
}
