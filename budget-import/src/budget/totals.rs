//! Header total reconciliation

use anyhow::Result;
use log::{debug, info};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::ImportError;
use super::lines::LineWriteResult;
use super::models::{ExistingLine, decimal_value};
use crate::api::constants::{columns, entities};
use crate::api::query::{Filter, FilterValue, ListQuery};
use crate::api::store::{RemoteStore, list_all_as};

/// Sum of line totals, skipping lines without an id or an amount
pub fn sum_line_totals(lines: &[ExistingLine]) -> Decimal {
    lines
        .iter()
        .filter(|line| line.id.is_some())
        .filter_map(|line| line.total_amount)
        .sum()
}

/// Distinct header ids with at least one successful line write, in first-seen order
pub fn headers_to_reconcile(results: &[LineWriteResult]) -> Vec<Uuid> {
    let mut headers: Vec<Uuid> = Vec::new();
    for result in results.iter().filter(|r| r.is_success()) {
        if let Some(header_id) = result.header_id {
            if !headers.contains(&header_id) {
                headers.push(header_id);
            }
        }
    }
    headers
}

/// Recompute a header's budget amount from its lines and write it back
pub async fn update_header_total(store: &dyn RemoteStore, header_id: Uuid) -> Result<Decimal> {
    let query = ListQuery::new()
        .filter(Filter::eq(columns::LINE_HEADER_LOOKUP, FilterValue::Guid(header_id)))
        .select(["contoso_budgetlineid", "contoso_totalbudgetedamount"]);
    let lines: Vec<ExistingLine> = list_all_as(store, entities::BUDGET_LINES, &query)
        .await
        .map_err(|e| ImportError::remote(format!("Listing lines of budget header {}", header_id), &e))?;

    let total = sum_line_totals(&lines);
    let mut body = Map::new();
    body.insert(columns::HEADER_BUDGET_AMOUNT.to_string(), decimal_value(total));
    store
        .update(entities::BUDGET_HEADERS, header_id, Value::Object(body))
        .await
        .map_err(|e| ImportError::remote(format!("Updating total of budget header {}", header_id), &e))?;

    debug!("Budget header {} total set to {} from {} lines", header_id, total, lines.len());
    Ok(total)
}

/// Reconcile every header touched by a successful line write
pub async fn reconcile_totals(store: &dyn RemoteStore, results: &[LineWriteResult]) -> Result<usize> {
    let headers = headers_to_reconcile(results);
    for header_id in &headers {
        update_header_total(store, *header_id).await?;
    }
    info!("Reconciled totals of {} budget headers", headers.len());
    Ok(headers.len())
}
