//! In-memory `RemoteStore` used by unit and pipeline tests
//!
//! Emulates the Dataverse behaviour the pipeline relies on: primary key
//! assignment, `@odata.bind` lookups surfacing as `_x_value` columns, filtered
//! and paged listing, file columns, and per-item batch failures.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::constants::primary_id_field;
use crate::api::operations::{BatchOperation, BatchOperationResult, Operation};
use crate::api::query::{ListQuery, Page, PageToken};
use crate::api::store::RemoteStore;

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Value>>,
    files: HashMap<(String, Uuid, String), (String, Vec<u8>)>,
    list_calls: HashMap<String, usize>,
    created: HashMap<String, usize>,
    updated: HashMap<String, usize>,
    batch_sizes: Vec<usize>,
    write_failures: Vec<(String, String, Value)>,
}

pub struct InMemoryStore {
    state: Mutex<State>,
    page_size: usize,
    batch_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 100,
            batch_delay: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Hold every batch for `delay` so concurrent submissions overlap
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    /// Insert a record directly, returning its (possibly assigned) primary id
    pub fn seed(&self, entity: &str, record: Value) -> Uuid {
        let mut state = self.state.lock().unwrap();
        let record = normalize(entity, record, None);
        let id = record_id(entity, &record).unwrap();
        state.tables.entry(entity.to_string()).or_default().push(record);
        id
    }

    pub fn records(&self, entity: &str) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state.tables.get(entity).cloned().unwrap_or_default()
    }

    pub fn record(&self, entity: &str, id: Uuid) -> Option<Value> {
        self.records(entity)
            .into_iter()
            .find(|r| record_id(entity, r) == Some(id))
    }

    pub fn set_file(&self, entity: &str, id: Uuid, column: &str, content: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            (entity.to_string(), id, column.to_string()),
            ("upload.xlsx".to_string(), content),
        );
    }

    /// Uploaded file as `(file name, content)`
    pub fn file(&self, entity: &str, id: Uuid, column: &str) -> Option<(String, Vec<u8>)> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(&(entity.to_string(), id, column.to_string()))
            .cloned()
    }

    /// Make every create/update of `entity` whose body has `field == value` fail
    pub fn fail_writes_where(&self, entity: &str, field: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        state
            .write_failures
            .push((entity.to_string(), field.to_string(), value));
    }

    pub fn list_calls(&self, entity: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.list_calls.get(entity).copied().unwrap_or(0)
    }

    pub fn created(&self, entity: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.created.get(entity).copied().unwrap_or(0)
    }

    pub fn updated(&self, entity: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.updated.get(entity).copied().unwrap_or(0)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().batch_sizes.clone()
    }

    pub fn peak_concurrent_batches(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn apply(&self, operation: &Operation) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        let entity = operation.entity().to_string();

        if let Some((_, field, value)) = state
            .write_failures
            .iter()
            .find(|(e, f, v)| *e == entity && operation.data().get(f.as_str()) == Some(v))
        {
            bail!("Injected failure for {} = {}", field, value);
        }

        match operation {
            Operation::Create { data, .. } => {
                let record = normalize(&entity, data.clone(), None);
                state.tables.entry(entity.clone()).or_default().push(record.clone());
                *state.created.entry(entity).or_default() += 1;
                Ok(record)
            }
            Operation::Update { id, data, .. } => {
                let table = state.tables.entry(entity.clone()).or_default();
                let existing = table
                    .iter_mut()
                    .find(|r| record_id(&entity, r) == Some(*id))
                    .ok_or_else(|| anyhow!("{} record {} not found", entity, id))?;
                let patch = normalize(&entity, data.clone(), Some(*id));
                if let (Some(target), Value::Object(fields)) = (existing.as_object_mut(), patch) {
                    for (k, v) in fields {
                        target.insert(k, v);
                    }
                }
                let updated = existing.clone();
                *state.updated.entry(entity).or_default() += 1;
                Ok(updated)
            }
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn list(&self, entity: &str, query: &ListQuery, page: Option<&PageToken>) -> Result<Page> {
        let mut state = self.state.lock().unwrap();
        *state.list_calls.entry(entity.to_string()).or_default() += 1;

        let offset = match page {
            Some(token) => token.0.parse::<usize>()?,
            None => 0,
        };
        let matching: Vec<Value> = state
            .tables
            .get(entity)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.filter.as_ref().map(|f| f.matches(r)).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let end = (offset + self.page_size).min(matching.len());
        let records = matching.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
        let next = (end < matching.len()).then(|| PageToken(end.to_string()));
        Ok(Page { records, next })
    }

    async fn retrieve(&self, entity: &str, id: Uuid) -> Result<Option<Value>> {
        Ok(self.record(entity, id))
    }

    async fn create(&self, entity: &str, body: Value) -> Result<Value> {
        self.apply(&Operation::create(entity, body))
    }

    async fn update(&self, entity: &str, id: Uuid, body: Value) -> Result<Value> {
        self.apply(&Operation::update(entity, id, body))
    }

    async fn process_batch(&self, batch: BatchOperation) -> Result<Vec<BatchOperationResult>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.batch_delay {
            tokio::time::sleep(delay).await;
        }

        self.state.lock().unwrap().batch_sizes.push(batch.len());
        let results = batch
            .operations()
            .iter()
            .enumerate()
            .map(|(index, operation)| match self.apply(operation) {
                Ok(record) => match record_id(operation.entity(), &record) {
                    Some(id) => BatchOperationResult::success(index, id),
                    None => BatchOperationResult::error(index, "missing id"),
                },
                Err(e) => BatchOperationResult::error(index, e.to_string()),
            })
            .collect();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(results)
    }

    async fn download_file(&self, entity: &str, id: Uuid, column: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.file(entity, id, column).map(|(_, content)| content))
    }

    async fn upload_file(
        &self,
        entity: &str,
        id: Uuid,
        column: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            (entity.to_string(), id, column.to_string()),
            (file_name.to_string(), content),
        );
        Ok(())
    }
}

fn record_id(entity: &str, record: &Value) -> Option<Uuid> {
    record[primary_id_field(entity).as_str()]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Turn `nav@odata.bind: "/set(id)"` into `_nav_value: "id"` and make sure the primary key is set
fn normalize(entity: &str, record: Value, id: Option<Uuid>) -> Value {
    let mut out = Map::new();
    if let Value::Object(fields) = record {
        for (key, value) in fields {
            match key.strip_suffix("@odata.bind") {
                Some(nav) => {
                    let bound = value
                        .as_str()
                        .and_then(crate::api::operations::parse_entity_id)
                        .map(|g| Value::String(g.to_string()))
                        .unwrap_or(Value::Null);
                    out.insert(format!("_{}_value", nav), bound);
                }
                None => {
                    out.insert(key, value);
                }
            }
        }
    }

    // Patches carry no primary key; creates get one assigned
    if id.is_none() {
        let pk = primary_id_field(entity);
        if !out.get(&pk).map(Value::is_string).unwrap_or(false) {
            out.insert(pk, Value::String(Uuid::new_v4().to_string()));
        }
    }
    Value::Object(out)
}
