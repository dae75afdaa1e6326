mod api;
mod budget;
mod cache;
mod cli;
mod config;
mod excel;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => cli::commands::import::handle_import_command(args).await,
    }
}
