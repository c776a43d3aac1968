mod auth;
mod cli;
mod config;
mod engine;
mod error;
mod exec;
mod locate;
mod oracle;
mod outcome;
mod output;
mod pipeline;
mod repair;
mod report;
#[cfg(test)]
mod testing;
mod toolchain;
mod vcs;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting migrafix");
    cli.execute().await?;

    Ok(())
}
