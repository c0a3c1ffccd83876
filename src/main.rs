mod cli;
mod config;
mod error;
mod fanout;
mod metrics;
mod model;
mod output;
mod pipeline;
mod providers;
mod server;
mod store;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting CILens Hooks - GitHub Actions webhook receiver");
    cli.execute().await?;

    Ok(())
}
