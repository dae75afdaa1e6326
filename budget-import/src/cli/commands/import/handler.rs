//! Import command handler

use anyhow::{Context, Result};
use colored::*;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::ImportCommands;
use crate::api::{DataverseClient, RemoteStore};
use crate::budget::{ImportOrchestrator, ImportStatus, ReferenceDataCache};
use crate::cache::{Cache, MemoryCache};
use crate::config::Config;

/// Apply command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, args: &ImportCommands) -> Result<()> {
    if let Some(strategy) = args.strategy {
        config.import.strategy = strategy;
    }
    if let Some(batch_size) = args.batch_size {
        config.import.batch_size = batch_size;
    }
    config.import.validate()
}

/// Run each job in turn; returns how many ended in a job-level error
async fn run_jobs(orchestrator: &ImportOrchestrator, job_ids: &[Uuid]) -> usize {
    let mut errors = 0;
    for job_id in job_ids {
        let started = Instant::now();
        let outcome = orchestrator.run(*job_id).await;
        let elapsed = format!("({:.1}s)", started.elapsed().as_secs_f64()).dimmed();

        match outcome {
            Ok(ImportStatus::Succeeded) => {
                println!("{} {} {}", "✓".green().bold(), job_id, elapsed);
            }
            Ok(status) => {
                println!(
                    "{} {} {}: {}",
                    "!".yellow().bold(),
                    job_id,
                    elapsed,
                    format!("{}, see errors.xlsx on the record", status).yellow()
                );
            }
            Err(e) => {
                errors += 1;
                println!("{} {} {}: {}", "✗".red().bold(), job_id, elapsed, format!("{:#}", e).red());
            }
        }
    }
    errors
}

pub async fn handle_import_command(args: ImportCommands) -> Result<()> {
    if args.no_color {
        colored::control::set_override(false);
    }

    let mut config = Config::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args)?;
    config.dataverse.validate()?;

    let client = DataverseClient::new(
        &config.dataverse.url,
        &config.dataverse.api_version,
        config.dataverse.credentials(),
        config.retry_config(),
    )
    .context("Failed to create Dataverse client")?;
    let store: Arc<dyn RemoteStore> = Arc::new(client);

    // One cache for every job of this invocation
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let master_data = Arc::new(ReferenceDataCache::new(
        store.clone(),
        cache,
        config.import.master_data_ttl(),
    ));
    let orchestrator = ImportOrchestrator::new(store, master_data, config.import.clone());

    println!(
        "Importing {} budget job(s) into {} using the {} strategy",
        args.job_ids.len(),
        config.dataverse.url.cyan(),
        config.import.strategy.to_string().bold()
    );

    let errors = run_jobs(&orchestrator, &args.job_ids).await;
    if errors > 0 {
        anyhow::bail!("{} of {} budget imports failed", errors, args.job_ids.len());
    }
    Ok(())
}
