pub mod commands;

use clap::{Parser, Subcommand};

use commands::import::ImportCommands;

#[derive(Parser)]
#[command(name = "budget-import")]
#[command(about = "Import budget spreadsheets into Dataverse")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more budget import jobs
    Import(ImportCommands),
}
