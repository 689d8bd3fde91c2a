//! HTTP client for the Airtable gateway service.

use super::{RecordStore, StoreError};
use crate::types::{DeletedRecord, Fields, NewTable, Record, RecordPage, RecordQuery, TableSchema};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Header carrying the forwarded gateway credential.
const API_KEY_HEADER: &str = "X-API-Key";

/// Per-request timeout enforced by the HTTP client itself.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway API client.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

// -- Response types ----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    #[serde(default)]
    tables: Vec<TableSchema>,
}

impl GatewayClient {
    /// Create a new gateway client keeping up to `max_idle` idle connections.
    pub fn new(base_url: &str, api_key: &str, max_idle: usize) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .pool_max_idle_per_host(max_idle)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    /// URL of a table's record collection.
    fn records_url(&self, base_id: &str, table_id: &str) -> String {
        format!(
            "{}/bases/{}/tables/{}/records",
            self.base_url, base_id, table_id
        )
    }

    fn record_url(&self, base_id: &str, table_id: &str, record_id: &str) -> String {
        format!("{}/{}", self.records_url(base_id, table_id), record_id)
    }

    /// Attach credentials, send, and decode a successful JSON body.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, op: &str) -> Result<T, StoreError> {
        let resp = req.header(API_KEY_HEADER, &self.api_key).send().await?;
        let resp = check_status(resp, op).await?;
        resp.json().await.map_err(|e| StoreError::Decode(format!("{op}: {e}")))
    }
}

async fn check_status(resp: Response, op: &str) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!("Gateway {} failed ({}): {}", op, status, body);
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Query-string pairs for a record listing.
fn query_params(query: &RecordQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(max) = query.max_records {
        params.push(("max_records", max.to_string()));
    }
    if let Some(view) = &query.view {
        params.push(("view", view.clone()));
    }
    if let Some(formula) = &query.filter_by_formula {
        params.push(("filter_by_formula", formula.clone()));
    }
    if let Some(offset) = &query.offset {
        params.push(("offset", offset.clone()));
    }
    params
}

#[async_trait]
impl RecordStore for GatewayClient {
    async fn list_tables(&self, base_id: &str) -> Result<Vec<TableSchema>, StoreError> {
        debug!("Gateway schema: {}", base_id);
        let req = self
            .http
            .get(format!("{}/bases/{}/schema", self.base_url, base_id));
        let body: SchemaResponse = self.send(req, "list_tables").await?;
        Ok(body.tables)
    }

    async fn get_records(
        &self,
        base_id: &str,
        table_id: &str,
        query: &RecordQuery,
    ) -> Result<RecordPage, StoreError> {
        debug!("Gateway get_records: {}/{}", base_id, table_id);
        let req = self
            .http
            .get(self.records_url(base_id, table_id))
            .query(&query_params(query));
        self.send(req, "get_records").await
    }

    async fn create_record(
        &self,
        base_id: &str,
        table_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError> {
        let req = self.http.post(self.records_url(base_id, table_id)).json(fields);
        self.send(req, "create_record").await
    }

    async fn update_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError> {
        let req = self
            .http
            .patch(self.record_url(base_id, table_id, record_id))
            .json(fields);
        self.send(req, "update_record").await
    }

    async fn delete_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
    ) -> Result<DeletedRecord, StoreError> {
        let req = self.http.delete(self.record_url(base_id, table_id, record_id));
        self.send(req, "delete_record").await
    }

    async fn create_table(
        &self,
        base_id: &str,
        table: &NewTable,
    ) -> Result<TableSchema, StoreError> {
        let req = self
            .http
            .post(format!("{}/api/web/bases/{}/tables", self.base_url, base_id))
            .json(table);
        self.send(req, "create_table").await
    }
}
