pub mod handler;

use clap::Args;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::UpsertStrategy;

pub use handler::handle_import_command;

#[derive(Args, Debug)]
pub struct ImportCommands {
    /// Ids of the budget import records to process, in order
    #[arg(required = true, value_name = "JOB_ID")]
    pub job_ids: Vec<Uuid>,

    /// How budget lines are written: single, batched or parallel
    #[arg(long)]
    pub strategy: Option<UpsertStrategy>,

    /// Lines per $batch request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Configuration file (defaults to budget-import/config.toml in the user config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
