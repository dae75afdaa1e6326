//! Dataverse `$batch` request building and response parsing
//!
//! Operations are sent as independent parts of one multipart/mixed body, without a
//! changeset, together with `Prefer: odata.continue-on-error`. A failing item
//! therefore does not roll back or stop the items around it.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use super::operation::{BatchOperationResult, Operation};

static ENTITY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})\)\s*$")
        .expect("entity id regex is valid")
});

/// Builder collecting create/update operations for one batch submission
#[derive(Debug, Clone, Default)]
pub struct BatchOperation {
    operations: Vec<Operation>,
}

impl BatchOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a create; returns the index it will be reported under
    pub fn add_create(&mut self, entity: impl Into<String>, data: serde_json::Value) -> usize {
        self.push(Operation::create(entity, data))
    }

    /// Queue an update-by-id; returns the index it will be reported under
    pub fn add_update(
        &mut self,
        entity: impl Into<String>,
        id: Uuid,
        data: serde_json::Value,
    ) -> usize {
        self.push(Operation::update(entity, id, data))
    }

    fn push(&mut self, operation: Operation) -> usize {
        self.operations.push(operation);
        self.operations.len() - 1
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}

/// A serialized multipart `$batch` request body
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub boundary: String,
    pub body: String,
}

impl BatchRequest {
    /// Serialize operations against the given service root (e.g. `https://org.crm.dynamics.com/api/data/v9.2/`)
    pub fn build(operations: &[Operation], service_root: &str) -> Self {
        let boundary = format!("batch_{}", Uuid::new_v4());
        let mut body = String::new();

        for operation in operations {
            body.push_str(&format!("--{}\r\n", boundary));
            body.push_str("Content-Type: application/http\r\n");
            body.push_str("Content-Transfer-Encoding: binary\r\n\r\n");
            body.push_str(&format!(
                "{} {}{} HTTP/1.1\r\n",
                operation.http_method(),
                service_root,
                operation.resource_path()
            ));
            body.push_str("Content-Type: application/json; type=entry\r\n");
            if matches!(operation, Operation::Update { .. }) {
                // Without If-Match a PATCH to a deleted id would silently upsert
                body.push_str("If-Match: *\r\n");
            }
            body.push_str("\r\n");
            body.push_str(&operation.data().to_string());
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", boundary));

        Self { boundary, body }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }
}

/// Parser for multipart `$batch` responses
pub struct BatchResponseParser;

impl BatchResponseParser {
    /// Extract the boundary parameter from a multipart Content-Type header
    pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
        content_type.split(';').find_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            if key.eq_ignore_ascii_case("boundary") {
                Some(value.trim_matches('"').to_string())
            } else {
                None
            }
        })
    }

    /// Parse a batch response into one result per submitted operation, in index order
    ///
    /// Parts are matched to operations positionally. Operations without a
    /// corresponding part (the service stopped early) are reported as failures.
    pub fn parse(body: &str, boundary: &str, operations: &[Operation]) -> Vec<BatchOperationResult> {
        let delimiter = format!("--{}", boundary);
        let parts: Vec<&str> = body
            .split(delimiter.as_str())
            .skip(1)
            .filter(|part| !part.starts_with("--"))
            .collect();

        let mut results = Vec::with_capacity(operations.len());
        for (index, operation) in operations.iter().enumerate() {
            let result = match parts.get(index) {
                Some(part) => parse_part(index, part, operation),
                None => BatchOperationResult::error(index, "No response returned for batch item"),
            };
            results.push(result);
        }
        results
    }
}

/// Extract the record id from an `OData-EntityId` style URL, e.g. `.../contoso_budgetlines(<guid>)`
pub fn parse_entity_id(url: &str) -> Option<Uuid> {
    let caps = ENTITY_ID_RE.captures(url.trim())?;
    Uuid::parse_str(caps.get(1)?.as_str()).ok()
}

fn parse_part(index: usize, part: &str, operation: &Operation) -> BatchOperationResult {
    let mut lines = part.lines();

    // Skip the part's MIME headers up to the embedded HTTP status line
    let status = loop {
        match lines.next() {
            Some(line) if line.starts_with("HTTP/") => {
                break line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|code| code.parse::<u16>().ok());
            }
            Some(_) => continue,
            None => break None,
        }
    };

    let Some(status) = status else {
        return BatchOperationResult::error(index, "Malformed batch response part");
    };

    let mut entity_id = None;
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("OData-EntityId") {
                entity_id = parse_entity_id(value);
            }
        }
    }
    let payload = lines.collect::<Vec<_>>().join("\n");
    let payload = payload.trim();

    if !(200..300).contains(&status) {
        return BatchOperationResult::error(index, error_message(status, payload));
    }

    let id = entity_id.or(match operation {
        Operation::Update { id, .. } => Some(*id),
        Operation::Create { .. } => None,
    });

    match id {
        Some(id) => BatchOperationResult::success(index, id),
        None => BatchOperationResult::error(index, "Batch response did not include an entity id"),
    }
}

fn error_message(status: u16, payload: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string));

    match message {
        Some(message) => format!("HTTP {}: {}", status, message),
        None if payload.is_empty() => format!("HTTP {}", status),
        None => format!("HTTP {}: {}", status, payload),
    }
}
