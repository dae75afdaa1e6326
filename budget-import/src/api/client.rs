//! Dataverse Web API client
//!
//! Implements [`RemoteStore`] over HTTPS. Every request goes through the retry
//! policy; throttling (429), server errors (5xx) and transport failures are
//! retried, everything else is surfaced to the caller.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use super::auth::{AuthManager, Credentials};
use super::constants::primary_id_field;
use super::operations::{
    BatchOperation, BatchOperationResult, BatchRequest, BatchResponseParser, parse_entity_id,
};
use super::query::{ListQuery, Page, PageToken};
use super::resilience::{RetryConfig, RetryPolicy, RetryableError};
use super::store::RemoteStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct DataverseClient {
    http: reqwest::Client,
    auth: AuthManager,
    /// Service root, always ending with `/`
    base_url: String,
    retry: RetryPolicy,
}

impl DataverseClient {
    pub fn new(
        url: &str,
        api_version: &str,
        credentials: Credentials,
        retry: RetryConfig,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("OData-MaxVersion", HeaderValue::from_static("4.0"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let url = url.trim_end_matches('/');
        Ok(Self {
            auth: AuthManager::new(http.clone(), credentials, url),
            http,
            base_url: service_root(url, api_version),
            retry: RetryPolicy::new(retry),
        })
    }

    fn record_url(&self, entity: &str, id: Uuid) -> String {
        format!("{}{}({})", self.base_url, entity, id)
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// Returns the response for any status that is not retryable; callers decide
    /// what the remaining statuses mean.
    async fn send<F>(&self, description: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Sync,
    {
        let build = &build;
        self.retry
            .execute(description, move || async move {
                let token = self.auth.access_token().await?;
                let response = build(&self.http)
                    .bearer_auth(token)
                    .send()
                    .await
                    .map_err(|e| RetryableError::Transport(e.to_string()))?;

                if response.status() == StatusCode::UNAUTHORIZED {
                    self.auth.invalidate();
                }
                classify(response).await
            })
            .await
    }
}

/// `{url}/api/data/{version}/`
pub fn service_root(url: &str, api_version: &str) -> String {
    format!("{}/api/data/{}/", url.trim_end_matches('/'), api_version)
}

/// Turn retryable statuses into `RetryableError`, pass everything else through
async fn classify(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(RetryableError::Throttled { retry_after }.into());
    }
    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(RetryableError::Server {
            status: status.as_u16(),
            message: error_message(&body),
        }
        .into());
    }
    Ok(response)
}

/// Fail with the Dataverse error message unless the response is a success
async fn ensure_success(response: reqwest::Response, description: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!(
        "{} failed (HTTP {}): {}",
        description,
        status.as_u16(),
        error_message(&body)
    )
}

/// Extract `error.message` from a Dataverse error body, falling back to the raw body
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Split an OData collection response into records and the next-page link
pub fn parse_page(body: Value) -> Result<Page> {
    let next = body["@odata.nextLink"]
        .as_str()
        .map(|link| PageToken(link.to_string()));
    let records = match body {
        Value::Object(mut map) => match map.remove("value") {
            Some(Value::Array(records)) => records,
            _ => bail!("Collection response has no 'value' array"),
        },
        _ => bail!("Collection response is not a JSON object"),
    };
    Ok(Page { records, next })
}

/// Body of a write response; when the service returned no representation,
/// synthesize one holding the primary key from `OData-EntityId`
async fn representation(response: reqwest::Response, entity: &str) -> Result<Value> {
    let entity_id = response
        .headers()
        .get("OData-EntityId")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_entity_id);
    let body = response.text().await.context("Failed to read response body")?;

    if body.trim().is_empty() {
        let id = entity_id.context("Write response carried neither a body nor OData-EntityId")?;
        let mut record = serde_json::Map::new();
        record.insert(primary_id_field(entity), Value::String(id.to_string()));
        return Ok(Value::Object(record));
    }
    serde_json::from_str(&body).context("Failed to parse write response")
}

#[async_trait]
impl RemoteStore for DataverseClient {
    async fn list(&self, entity: &str, query: &ListQuery, page: Option<&PageToken>) -> Result<Page> {
        let url = match page {
            Some(token) => token.0.clone(),
            None => format!("{}{}", self.base_url, entity),
        };
        let params = match page {
            // nextLink already encodes the original query
            Some(_) => Vec::new(),
            None => query.to_params(),
        };
        debug!("GET {} {:?}", url, params);

        let response = self
            .send(&format!("List {}", entity), |http| {
                http.get(&url)
                    .query(&params)
                    .header("Prefer", "odata.include-annotations=\"*\"")
            })
            .await?;
        let response = ensure_success(response, &format!("List {}", entity)).await?;
        let body: Value = response.json().await.context("Failed to parse list response")?;
        parse_page(body)
    }

    async fn retrieve(&self, entity: &str, id: Uuid) -> Result<Option<Value>> {
        let url = self.record_url(entity, id);
        let description = format!("Retrieve {}({})", entity, id);
        let response = self.send(&description, |http| http.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, &description).await?;
        Ok(Some(response.json().await.context("Failed to parse record")?))
    }

    async fn create(&self, entity: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, entity);
        let description = format!("Create {}", entity);
        let response = self
            .send(&description, |http| {
                http.post(&url)
                    .header("Prefer", "return=representation")
                    .json(&body)
            })
            .await?;
        let response = ensure_success(response, &description).await?;
        representation(response, entity).await
    }

    async fn update(&self, entity: &str, id: Uuid, body: Value) -> Result<Value> {
        let url = self.record_url(entity, id);
        let description = format!("Update {}({})", entity, id);
        let response = self
            .send(&description, |http| {
                http.patch(&url)
                    .header("Prefer", "return=representation")
                    .header("If-Match", "*")
                    .json(&body)
            })
            .await?;
        let response = ensure_success(response, &description).await?;
        representation(response, entity).await
    }

    async fn process_batch(&self, batch: BatchOperation) -> Result<Vec<BatchOperationResult>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let request = BatchRequest::build(batch.operations(), &self.base_url);
        let url = format!("{}$batch", self.base_url);
        let description = format!("Batch of {} operations", batch.len());
        debug!("POST {} ({} operations)", url, batch.len());

        let response = self
            .send(&description, |http| {
                http.post(&url)
                    .header(CONTENT_TYPE, request.content_type())
                    .header("Prefer", "odata.continue-on-error")
                    .body(request.body.clone())
            })
            .await?;
        let response = ensure_success(response, &description).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let boundary = BatchResponseParser::boundary_from_content_type(&content_type)
            .with_context(|| format!("Batch response has no boundary: '{}'", content_type))?;
        let body = response.text().await.context("Failed to read batch response")?;

        let results = BatchResponseParser::parse(&body, &boundary, batch.operations());
        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!("{} of {} batch operations failed", failed, results.len());
        }
        Ok(results)
    }

    async fn download_file(&self, entity: &str, id: Uuid, column: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/{}/$value", self.record_url(entity, id), column);
        let description = format!("Download {} of {}({})", column, entity, id);
        let response = self.send(&description, |http| http.get(&url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            _ => {
                let response = ensure_success(response, &description).await?;
                let bytes = response.bytes().await.context("Failed to read file content")?;
                Ok(Some(bytes.to_vec()))
            }
        }
    }

    async fn upload_file(
        &self,
        entity: &str,
        id: Uuid,
        column: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        let url = format!("{}/{}", self.record_url(entity, id), column);
        let description = format!("Upload {} to {}({})", file_name, entity, id);
        let response = self
            .send(&description, |http| {
                http.patch(&url)
                    .query(&[("x-ms-file-name", file_name)])
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(content.clone())
            })
            .await?;
        ensure_success(response, &description).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_root() {
        assert_eq!(
            service_root("https://org.crm4.dynamics.com/", "v9.2"),
            "https://org.crm4.dynamics.com/api/data/v9.2/"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"code":"0x80040217","message":"Record does not exist"}}"#;
        assert_eq!(error_message(body), "Record does not exist");
        assert_eq!(error_message("  gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn test_parse_page_with_next_link() {
        let body = json!({
            "value": [{ "contoso_departmentname": "Sales" }],
            "@odata.nextLink": "https://org/api/data/v9.2/contoso_departments?$skiptoken=abc"
        });
        let page = parse_page(body).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(
            page.next,
            Some(PageToken(
                "https://org/api/data/v9.2/contoso_departments?$skiptoken=abc".into()
            ))
        );
    }

    #[test]
    fn test_parse_page_last_page() {
        let page = parse_page(json!({ "value": [] })).unwrap();
        assert!(page.records.is_empty());
        assert!(page.next.is_none());

        assert!(parse_page(json!({ "error": {} })).is_err());
    }

    #[test]
    fn test_client_construction() {
        let client = DataverseClient::new(
            "https://org.crm.dynamics.com",
            "v9.2",
            Credentials {
                tenant_id: "t".into(),
                client_id: "c".into(),
                client_secret: "s".into(),
            },
            RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://org.crm.dynamics.com/api/data/v9.2/");
        assert_eq!(
            client.record_url("contoso_budgetheaders", Uuid::nil()),
            "https://org.crm.dynamics.com/api/data/v9.2/contoso_budgetheaders(00000000-0000-0000-0000-000000000000)"
        );
    }
}
