mod auth;
mod cli;
mod config;
mod dispatch;
mod error;
mod hipchat;
mod output;
mod reply;
mod server;
mod teamcity;
mod watch;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting TeamCity build bot");
    cli.execute().await?;

    Ok(())
}
