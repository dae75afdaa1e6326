//! Budget line upserts
//!
//! Lines are matched against existing Dataverse lines on (header, category) and
//! then written one by one, in `$batch` requests, or in concurrently submitted
//! groups of batches. Every strategy reports exactly one result per line.

use anyhow::Result;
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ImportError;
use super::models::{ExistingLine, LineRecord};
use crate::api::constants::{entities, primary_id_field};
use crate::api::operations::BatchOperationResult;
use crate::api::query::ListQuery;
use crate::api::resilience::ConcurrencyLimiter;
use crate::api::store::{RemoteStore, list_all_as};
use crate::config::{ImportSettings, UpsertStrategy};

/// Outcome of writing one line
#[derive(Debug, Clone, PartialEq)]
pub struct LineWriteResult {
    /// Zero-based position of the line in the submitted list
    pub position: usize,
    pub header_id: Option<Uuid>,
    /// Id of the created or updated line, or the failure message
    pub outcome: Result<Uuid, String>,
}

impl LineWriteResult {
    fn failed(position: usize, line: &LineRecord, message: impl Into<String>) -> Self {
        Self {
            position,
            header_id: line.header_id,
            outcome: Err(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// List every budget line in Dataverse
pub async fn fetch_existing_lines(store: &dyn RemoteStore) -> Result<Vec<ExistingLine>> {
    let query = ListQuery::new().select([
        "contoso_budgetlineid",
        "_contoso_budgetcategory_value",
        "_contoso_budgetheader_value",
        "contoso_totalbudgetedamount",
    ]);
    list_all_as(store, entities::BUDGET_LINES, &query)
        .await
        .map_err(|e| ImportError::remote("Listing budget lines", &e).into())
}

/// Set `existing_id` on lines whose (header, category) already exists; returns how many matched
pub fn match_existing_lines(lines: &mut [LineRecord], existing: &[ExistingLine]) -> usize {
    let mut index: HashMap<(Uuid, Uuid), Uuid> = HashMap::new();
    for line in existing {
        if let (Some(id), Some(header_id), Some(category_id)) = (line.id, line.header_id, line.category_id) {
            index.entry((header_id, category_id)).or_insert(id);
        }
    }

    let mut matched = 0;
    for line in lines.iter_mut() {
        let existing_id = line
            .header_id
            .and_then(|header_id| index.get(&(header_id, line.category_id)).copied());
        if existing_id.is_some() {
            matched += 1;
        }
        line.existing_id = existing_id;
    }
    matched
}

/// Request body for a line whose header has been resolved
fn line_body(line: &LineRecord) -> Result<serde_json::Value, String> {
    line.header_id
        .map(|header_id| line.to_body(header_id))
        .ok_or_else(|| "Budget header was not resolved for this line".to_string())
}

pub struct LineUpsertEngine {
    store: Arc<dyn RemoteStore>,
    strategy: UpsertStrategy,
    batch_size: usize,
    group_size: usize,
    limiter: ConcurrencyLimiter,
}

impl LineUpsertEngine {
    pub fn new(store: Arc<dyn RemoteStore>, settings: &ImportSettings) -> Self {
        Self {
            store,
            strategy: settings.strategy,
            batch_size: settings.batch_size.max(1),
            group_size: settings.parallel_group_size.max(1),
            limiter: ConcurrencyLimiter::with_max(settings.max_parallel_batches),
        }
    }

    /// Write all lines with the configured strategy
    pub async fn upsert(&self, lines: &[LineRecord]) -> Vec<LineWriteResult> {
        let results = match self.strategy {
            UpsertStrategy::Single => self.upsert_single(lines).await,
            UpsertStrategy::Batched => self.upsert_batched(lines).await,
            UpsertStrategy::Parallel => self.upsert_parallel(lines).await,
        };

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            "Budget lines ({} strategy): {} written, {} failed",
            self.strategy,
            results.len() - failed,
            failed
        );
        results
    }

    /// One request per line
    pub async fn upsert_single(&self, lines: &[LineRecord]) -> Vec<LineWriteResult> {
        let mut results = Vec::with_capacity(lines.len());
        for (position, line) in lines.iter().enumerate() {
            results.push(self.write_one(position, line).await);
        }
        results
    }

    async fn write_one(&self, position: usize, line: &LineRecord) -> LineWriteResult {
        let body = match line_body(line) {
            Ok(body) => body,
            Err(message) => return LineWriteResult::failed(position, line, message),
        };

        // Create when the line is new, update by id otherwise
        let written = match line.existing_id {
            Some(id) => self.store.update(entities::BUDGET_LINES, id, body).await,
            None => self.store.create(entities::BUDGET_LINES, body).await,
        };

        let outcome = match written {
            Ok(record) => record[primary_id_field(entities::BUDGET_LINES).as_str()]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .or(line.existing_id)
                .ok_or_else(|| "Response did not contain the budget line id".to_string()),
            Err(e) => Err(format!("{:#}", e)),
        };
        if let Err(message) = &outcome {
            warn!("Budget line {} ('{}') failed: {}", position, line.name, message);
        }

        LineWriteResult {
            position,
            header_id: line.header_id,
            outcome,
        }
    }

    /// `$batch` requests of `batch_size` lines, submitted one after another
    pub async fn upsert_batched(&self, lines: &[LineRecord]) -> Vec<LineWriteResult> {
        self.batched_from(lines, 0).await
    }

    /// Batched writes for `lines`, reporting positions shifted by `offset`
    async fn batched_from(&self, lines: &[LineRecord], offset: usize) -> Vec<LineWriteResult> {
        let mut results = Vec::with_capacity(lines.len());
        for (chunk_index, chunk) in lines.chunks(self.batch_size).enumerate() {
            let start = offset + chunk_index * self.batch_size;
            results.extend(self.write_chunk(chunk, start).await);
        }
        results
    }

    async fn write_chunk(&self, chunk: &[LineRecord], start: usize) -> Vec<LineWriteResult> {
        let mut slots: Vec<Option<LineWriteResult>> = vec![None; chunk.len()];
        let mut batch = self.store.create_batch_operation();
        // Batch index -> position within the chunk
        let mut submitted: Vec<usize> = Vec::with_capacity(chunk.len());

        for (i, line) in chunk.iter().enumerate() {
            match line_body(line) {
                Ok(body) => {
                    match line.existing_id {
                        Some(id) => batch.add_update(entities::BUDGET_LINES, id, body),
                        None => batch.add_create(entities::BUDGET_LINES, body),
                    };
                    submitted.push(i);
                }
                Err(message) => slots[i] = Some(LineWriteResult::failed(start + i, line, message)),
            }
        }

        if !batch.is_empty() {
            debug!(
                "Submitting batch of {} budget lines starting at {}",
                batch.len(),
                start
            );
            match self.store.process_batch(batch).await {
                Ok(batch_results) => {
                    self.apply_batch_results(chunk, start, &submitted, batch_results, &mut slots)
                }
                Err(e) => {
                    let message = format!("Batch request failed: {:#}", e);
                    warn!("{} ({} lines starting at {})", message, submitted.len(), start);
                    for &i in &submitted {
                        slots[i] = Some(LineWriteResult::failed(start + i, &chunk[i], message.clone()));
                    }
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| {
                    LineWriteResult::failed(start + i, &chunk[i], "No response returned for batch item")
                })
            })
            .collect()
    }

    fn apply_batch_results(
        &self,
        chunk: &[LineRecord],
        start: usize,
        submitted: &[usize],
        mut batch_results: Vec<BatchOperationResult>,
        slots: &mut [Option<LineWriteResult>],
    ) {
        batch_results.sort_by_key(|r| r.index);
        for result in batch_results {
            let Some(&i) = submitted.get(result.index) else {
                warn!("Ignoring batch result with unknown index {}", result.index);
                continue;
            };
            let line = &chunk[i];
            let outcome = result.outcome.map(|reference| reference.id);
            if let Err(message) = &outcome {
                warn!("Budget line {} ('{}') failed: {}", start + i, line.name, message);
            }
            slots[i] = Some(LineWriteResult {
                position: start + i,
                header_id: line.header_id,
                outcome,
            });
        }
    }

    /// Groups of `parallel_group_size` lines, each written with the batched
    /// strategy, at most `max_parallel_batches` groups in flight
    pub async fn upsert_parallel(&self, lines: &[LineRecord]) -> Vec<LineWriteResult> {
        let tasks = lines
            .chunks(self.group_size)
            .enumerate()
            .map(|(group_index, group)| {
                let offset = group_index * self.group_size;
                async move {
                    let permit = match self.limiter.acquire().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            let message = format!("{:#}", e);
                            return group
                                .iter()
                                .enumerate()
                                .map(|(i, line)| LineWriteResult::failed(offset + i, line, message.clone()))
                                .collect();
                        }
                    };
                    let results = self.batched_from(group, offset).await;
                    drop(permit);
                    results
                }
            });

        let results: Vec<LineWriteResult> = join_all(tasks).await.into_iter().flatten().collect();
        let stats = self.limiter.stats();
        debug!(
            "Parallel upsert: {} groups, {} waited for a free slot (limit {})",
            stats.requests_acquired, stats.requests_waited, stats.max_concurrent_requests
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::time::Duration;

    fn line(header_id: Option<Uuid>, category_id: Uuid, total: i64) -> LineRecord {
        LineRecord {
            header_id,
            category_id,
            holder_id: Uuid::new_v4(),
            name: format!("line {}", total),
            q1: Some(Decimal::from(total)),
            q2: None,
            q3: None,
            q4: None,
            total: Some(Decimal::from(total)),
            existing_id: None,
        }
    }

    fn lines(count: usize) -> Vec<LineRecord> {
        let header_id = Uuid::new_v4();
        (0..count)
            .map(|i| line(Some(header_id), Uuid::new_v4(), i as i64))
            .collect()
    }

    fn engine(store: Arc<InMemoryStore>, strategy: UpsertStrategy, batch_size: usize) -> LineUpsertEngine {
        let settings = ImportSettings::builder()
            .strategy(strategy)
            .batch_size(batch_size)
            .parallel_group_size(4)
            .max_parallel_batches(2)
            .build()
            .unwrap();
        LineUpsertEngine::new(store, &settings)
    }

    fn assert_positions(results: &[LineWriteResult], count: usize) {
        let positions: Vec<usize> = results.iter().map(|r| r.position).collect();
        assert_eq!(positions, (0..count).collect::<Vec<_>>());
    }

    #[test]
    fn test_match_existing_lines() {
        let header_id = Uuid::new_v4();
        let category_id = Uuid::new_v4();
        let existing_id = Uuid::new_v4();
        let existing = vec![
            ExistingLine {
                id: Some(existing_id),
                category_id: Some(category_id),
                header_id: Some(header_id),
                total_amount: None,
            },
            ExistingLine {
                id: None,
                category_id: Some(Uuid::new_v4()),
                header_id: Some(header_id),
                total_amount: None,
            },
        ];
        let mut records = vec![
            line(Some(header_id), category_id, 1),
            line(Some(header_id), Uuid::new_v4(), 2),
            line(None, category_id, 3),
        ];

        assert_eq!(match_existing_lines(&mut records, &existing), 1);
        assert_eq!(records[0].existing_id, Some(existing_id));
        assert_eq!(records[1].existing_id, None);
        assert_eq!(records[2].existing_id, None);
    }

    #[tokio::test]
    async fn test_batched_positions_for_various_sizes() {
        for (count, batch_size) in [(1, 1), (5, 2), (6, 3), (7, 50), (10, 1)] {
            let store = Arc::new(InMemoryStore::new());
            let records = lines(count);
            let results = engine(store.clone(), UpsertStrategy::Batched, batch_size)
                .upsert(&records)
                .await;

            assert_eq!(results.len(), count);
            assert_positions(&results, count);
            assert!(results.iter().all(LineWriteResult::is_success));
            assert_eq!(store.created(entities::BUDGET_LINES), count);

            let expected_batches = count.div_ceil(batch_size);
            assert_eq!(store.batch_sizes().len(), expected_batches);
            assert!(store.batch_sizes().iter().all(|&size| size <= batch_size));
        }
    }

    #[tokio::test]
    async fn test_batch_item_failure_is_isolated() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes_where(entities::BUDGET_LINES, "contoso_totalbudgetedamount", json!(2.0));
        let records = lines(5);

        let results = engine(store.clone(), UpsertStrategy::Batched, 2).upsert(&records).await;

        assert_positions(&results, 5);
        let failed: Vec<usize> = results.iter().filter(|r| !r.is_success()).map(|r| r.position).collect();
        assert_eq!(failed, vec![2]);
        assert_eq!(results[2].header_id, records[2].header_id);
        assert_eq!(store.created(entities::BUDGET_LINES), 4);
    }

    #[tokio::test]
    async fn test_existing_lines_are_updated() {
        let store = Arc::new(InMemoryStore::new());
        let header_id = Uuid::new_v4();
        let category_id = Uuid::new_v4();
        let existing_id = store.seed(
            entities::BUDGET_LINES,
            json!({
                "_contoso_budgetheader_value": header_id.to_string(),
                "_contoso_budgetcategory_value": category_id.to_string(),
                "contoso_totalbudgetedamount": 1.0,
            }),
        );

        let mut records = vec![line(Some(header_id), category_id, 7), line(Some(header_id), Uuid::new_v4(), 8)];
        let existing = fetch_existing_lines(store.as_ref()).await.unwrap();
        match_existing_lines(&mut records, &existing);

        for strategy in [UpsertStrategy::Single, UpsertStrategy::Batched] {
            let results = engine(store.clone(), strategy, 10).upsert(&records[..1]).await;
            assert_eq!(results[0].outcome, Ok(existing_id));
        }
        assert_eq!(store.updated(entities::BUDGET_LINES), 2);
        assert_eq!(
            store.record(entities::BUDGET_LINES, existing_id).unwrap()["contoso_totalbudgetedamount"],
            json!(7.0)
        );

        let results = engine(store.clone(), UpsertStrategy::Single, 10).upsert(&records[1..]).await;
        assert!(results[0].is_success());
        assert_eq!(store.created(entities::BUDGET_LINES), 1);
    }

    #[tokio::test]
    async fn test_mixed_batch_maps_results_to_lines() {
        let store = Arc::new(InMemoryStore::new());
        let header_id = Uuid::new_v4();
        let category_id = Uuid::new_v4();
        let existing_id = store.seed(
            entities::BUDGET_LINES,
            json!({
                "_contoso_budgetheader_value": header_id.to_string(),
                "_contoso_budgetcategory_value": category_id.to_string(),
            }),
        );

        let mut records = vec![
            line(Some(header_id), Uuid::new_v4(), 1),
            line(None, Uuid::new_v4(), 2),
            line(Some(header_id), category_id, 3),
            line(Some(header_id), Uuid::new_v4(), 4),
        ];
        let existing = fetch_existing_lines(store.as_ref()).await.unwrap();
        match_existing_lines(&mut records, &existing);

        let results = engine(store.clone(), UpsertStrategy::Batched, 10).upsert(&records).await;

        assert_positions(&results, 4);
        assert_eq!(store.batch_sizes(), vec![3]);
        assert!(!results[1].is_success());
        assert_eq!(results[2].outcome, Ok(existing_id));
        assert_eq!(store.created(entities::BUDGET_LINES), 2);
        assert_eq!(store.updated(entities::BUDGET_LINES), 1);

        for i in [0, 3] {
            let id = results[i].outcome.clone().unwrap();
            assert_ne!(id, existing_id);
            let stored = store.record(entities::BUDGET_LINES, id).unwrap();
            assert_eq!(stored["contoso_totalbudgetedamount"], json!(i as f64 + 1.0));
        }
    }

    #[tokio::test]
    async fn test_single_strategy_continues_after_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes_where(entities::BUDGET_LINES, "contoso_totalbudgetedamount", json!(0.0));
        let records = lines(3);

        let results = engine(store.clone(), UpsertStrategy::Single, 10).upsert(&records).await;

        assert_positions(&results, 3);
        assert!(!results[0].is_success());
        assert!(results[1].is_success() && results[2].is_success());
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_lines_without_header_are_never_written() {
        let store = Arc::new(InMemoryStore::new());
        let mut records = lines(3);
        records[1].header_id = None;

        for strategy in [UpsertStrategy::Single, UpsertStrategy::Batched, UpsertStrategy::Parallel] {
            let results = engine(store.clone(), strategy, 2).upsert(&records).await;
            assert_positions(&results, 3);
            assert!(!results[1].is_success());
        }
        assert_eq!(store.created(entities::BUDGET_LINES), 6);
    }

    #[tokio::test]
    async fn test_parallel_matches_batched_and_respects_limit() {
        let store = Arc::new(InMemoryStore::new().with_batch_delay(Duration::from_millis(20)));
        store.fail_writes_where(entities::BUDGET_LINES, "contoso_totalbudgetedamount", json!(9.0));
        let records = lines(17);

        let results = engine(store.clone(), UpsertStrategy::Parallel, 3).upsert(&records).await;

        assert_eq!(results.len(), 17);
        assert_positions(&results, 17);
        let failed: Vec<usize> = results.iter().filter(|r| !r.is_success()).map(|r| r.position).collect();
        assert_eq!(failed, vec![9]);
        assert!(store.peak_concurrent_batches() <= 2);
        assert!(store.peak_concurrent_batches() >= 1);
        // Groups of 4 in batches of 3: 5 groups -> 4*2 + 1 batches
        assert_eq!(store.batch_sizes().len(), 9);
    }
}
