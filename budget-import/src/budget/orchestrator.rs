//! Budget import pipeline
//!
//! Drives one import job from `NotStarted` to `Succeeded` or `Failed`:
//! parse the attached spreadsheet, validate rows against master data, resolve
//! headers, upsert lines, reconcile header totals, and publish an annotated
//! error workbook when any row did not make it.

use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::error::ImportError;
use super::headers::{HeaderResolver, fetch_existing_headers};
use super::jobs::ImportJobRepository;
use super::lines::{LineUpsertEngine, fetch_existing_lines, match_existing_lines};
use super::master_data::ReferenceDataCache;
use super::models::{HeaderKey, HeaderRecord, ImportStatus, LineRecord, MasterData, RawRow, ResolvedRow};
use super::sheet::{SheetColumn, error_sheet_row};
use super::totals::reconcile_totals;
use super::users::UserDirectory;
use super::validation::{
    parse_fiscal_year, validate_budget_category, validate_corporation, validate_department,
    validate_total,
};
use crate::api::store::RemoteStore;
use crate::config::ImportSettings;
use crate::excel::{SheetRecord, build_workbook, read_sheet_records};

/// Summary written to a job whose rows did not all import
pub const ROW_ERRORS_SUMMARY: &str =
    "There are errors while updating budgets, download the error.xlsx file for more details";

/// Ids a row resolves to before the budget holder lookup
struct RowReferences {
    fiscal_year: i32,
    category_id: Uuid,
    corporation_id: Uuid,
    department_id: Uuid,
}

fn validate_row(row: &RawRow, master: &MasterData) -> Result<RowReferences, ImportError> {
    let category_id = validate_budget_category(&master.categories, row.budget_category.as_deref())?;
    let corporation_id = validate_corporation(
        &master.corporations,
        row.corporation.as_deref(),
        row.parent_corporation.as_deref(),
    )?;
    let department_id = validate_department(&master.departments, row.department.as_deref())?;
    validate_total(row)?;
    let fiscal_year = parse_fiscal_year(row.fiscal_year.as_deref())?;

    Ok(RowReferences {
        fiscal_year,
        category_id,
        corporation_id,
        department_id,
    })
}

fn resolved_row(position: usize, row: &RawRow, refs: RowReferences, holder_id: Uuid) -> ResolvedRow {
    ResolvedRow {
        position,
        header: HeaderRecord {
            key: HeaderKey {
                fiscal_year: refs.fiscal_year,
                corporation_id: refs.corporation_id,
                department_id: refs.department_id,
            },
            name: row.header_name(),
            budget_amount: row.total,
        },
        line: LineRecord {
            header_id: None,
            category_id: refs.category_id,
            holder_id,
            name: row.line_name(),
            q1: row.q1,
            q2: row.q2,
            q3: row.q3,
            q4: row.q4,
            total: row.total,
            existing_id: None,
        },
    }
}

pub struct ImportOrchestrator {
    store: Arc<dyn RemoteStore>,
    jobs: ImportJobRepository,
    master_data: Arc<ReferenceDataCache>,
    settings: ImportSettings,
}

impl ImportOrchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        master_data: Arc<ReferenceDataCache>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            jobs: ImportJobRepository::new(store.clone()),
            store,
            master_data,
            settings,
        }
    }

    /// Run one import job.
    ///
    /// Returns the final status when the job ran to completion (rows may still
    /// have failed). A job-level error marks the job `Failed` with the error as
    /// its summary and is then returned. A missing job or attachment is returned
    /// without touching the job.
    pub async fn run(&self, job_id: Uuid) -> Result<ImportStatus> {
        let job = self.jobs.get(job_id).await?;
        let attachment = self.jobs.attachment(job_id).await?;
        let previous = job
            .status()
            .map(|status| status.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        info!(
            "Starting budget import {} ({}), previously {}",
            job.id,
            job.name.as_deref().unwrap_or("unnamed"),
            previous
        );
        if let Some(summary) = job.error_summary.as_deref().filter(|s| !s.is_empty()) {
            debug!("Budget import {} carries an earlier error summary: {}", job_id, summary);
        }

        self.jobs.set_status(job_id, ImportStatus::InProgress).await?;

        match self.process(job_id, &attachment).await {
            Ok(status) => Ok(status),
            Err(e) => {
                error!("Budget import {} failed: {:#}", job_id, e);
                self.mark_failed(job_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Best effort; the original error is what the caller sees
    async fn mark_failed(&self, job_id: Uuid, summary: &str) {
        if let Err(e) = self.jobs.set_status(job_id, ImportStatus::Failed).await {
            warn!("Could not mark budget import {} as failed: {:#}", job_id, e);
        }
        if let Err(e) = self.jobs.set_error_summary(job_id, summary).await {
            warn!("Could not write error summary of budget import {}: {:#}", job_id, e);
        }
    }

    async fn process(&self, job_id: Uuid, attachment: &[u8]) -> Result<ImportStatus> {
        let records = read_sheet_records(attachment).map_err(|e| ImportError::InvalidSpreadsheet {
            reason: format!("{:#}", e),
        })?;
        let rows = records
            .iter()
            .map(RawRow::from_sheet_record)
            .collect::<Result<Vec<_>, ImportError>>()?;
        if rows.is_empty() {
            return Err(ImportError::EmptyInput.into());
        }
        info!("Budget import {}: {} rows to process", job_id, rows.len());

        let master = self.master_data.load().await?;
        let mut row_errors: Vec<Option<String>> = vec![None; rows.len()];

        let mut resolved = self
            .resolve_rows(&records, &rows, &master, &mut row_errors)
            .await?;

        if !resolved.is_empty() {
            let existing_headers = fetch_existing_headers(self.store.as_ref()).await?;
            HeaderResolver::new(self.store.as_ref())
                .resolve(&mut resolved, &existing_headers)
                .await?;

            let mut lines: Vec<LineRecord> = resolved.iter().map(|r| r.line.clone()).collect();
            let existing_lines = fetch_existing_lines(self.store.as_ref()).await?;
            let matched = match_existing_lines(&mut lines, &existing_lines);
            debug!("{} of {} budget lines already exist", matched, lines.len());

            let results = LineUpsertEngine::new(self.store.clone(), &self.settings)
                .upsert(&lines)
                .await;
            for result in &results {
                if let Err(message) = &result.outcome {
                    let position = resolved[result.position].position;
                    warn!("Row {}: {}", records[position].row_number, message);
                    row_errors[position] = Some(message.clone());
                }
            }

            reconcile_totals(self.store.as_ref(), &results).await?;
        }

        let failed = row_errors.iter().filter(|e| e.is_some()).count();
        if failed == 0 {
            self.jobs.set_status(job_id, ImportStatus::Succeeded).await?;
            info!("Budget import {}: all {} rows imported", job_id, rows.len());
            return Ok(ImportStatus::Succeeded);
        }

        let sheet_rows: Vec<Vec<Option<String>>> = rows
            .iter()
            .zip(&row_errors)
            .map(|(row, error)| error_sheet_row(row, error.as_deref()))
            .collect();
        let workbook = build_workbook(&SheetColumn::headers(), &sheet_rows)?;
        self.jobs.upload_error_file(job_id, workbook).await?;
        self.jobs.set_error_summary(job_id, ROW_ERRORS_SUMMARY).await?;
        self.jobs.set_status(job_id, ImportStatus::Failed).await?;

        warn!(
            "Budget import {}: {} of {} rows failed",
            job_id,
            failed,
            rows.len()
        );
        Ok(ImportStatus::Failed)
    }

    /// Validate every row and look up its budget holder. Rows that fail get
    /// their message in `row_errors`; a failed remote call aborts the job.
    async fn resolve_rows(
        &self,
        records: &[SheetRecord],
        rows: &[RawRow],
        master: &MasterData,
        row_errors: &mut [Option<String>],
    ) -> Result<Vec<ResolvedRow>> {
        let users = UserDirectory::new(self.store.clone());
        let mut resolved = Vec::with_capacity(rows.len());

        for (position, row) in rows.iter().enumerate() {
            let outcome = match validate_row(row, master) {
                Ok(refs) => users
                    .resolve(row.budget_holder.as_deref())
                    .await
                    .map_err(|e| ImportError::remote("Looking up budget holder", &e))?
                    .map(|holder_id| resolved_row(position, row, refs, holder_id)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(row) => {
                    debug!("Row {} is valid", records[position].row_number);
                    resolved.push(row);
                }
                Err(e) => {
                    warn!("Row {}: {}", records[position].row_number, e);
                    row_errors[position] = Some(e.to_string());
                }
            }
        }

        info!(
            "{} of {} rows passed validation",
            resolved.len(),
            rows.len()
        );
        Ok(resolved)
    }
}
