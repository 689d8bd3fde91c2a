#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use airtable_mcp::gateway::{RecordStore, RetryPolicy, StoreError, StorePool};
use airtable_mcp::metrics::Metrics;
use airtable_mcp::tools::{ToolDispatcher, ToolRegistry, ToolResult};
use airtable_mcp::types::{
    DeletedRecord, FieldSchema, Fields, NewTable, Record, RecordPage, RecordQuery, TableSchema,
};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const BASE: &str = "appTest";

/// In-memory record store that counts every call.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Vec<TableSchema>>,
    records: Mutex<HashMap<String, Vec<Record>>>,
    calls: Mutex<Vec<String>>,
    queries: Mutex<Vec<RecordQuery>>,
    next_id: AtomicUsize,
    page_size: AtomicUsize,
    delay_ms: AtomicUsize,
    failing_reads: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_table(&self, table: TableSchema, records: Vec<Record>) {
        self.records.lock().unwrap().insert(table.id.clone(), records);
        self.tables.lock().unwrap().push(table);
    }

    /// Serve at most `size` records per page.
    pub fn set_page_size(&self, size: usize) {
        self.page_size.store(size, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Make the next `n` reads fail with a 503.
    pub fn fail_next_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_of(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    pub fn last_query(&self) -> Option<RecordQuery> {
        self.queries.lock().unwrap().last().cloned()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn records_of(&self, table_id: &str) -> Vec<Record> {
        self.records
            .lock()
            .unwrap()
            .get(table_id)
            .cloned()
            .unwrap_or_default()
    }

    fn table_key(&self, table: &str) -> Result<String, StoreError> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.matches(table))
            .map(|t| t.id.clone())
            .ok_or_else(|| StoreError::Status {
                status: 404,
                body: format!("table {table} not found"),
            })
    }

    async fn enter(&self, op: &str) {
        self.calls.lock().unwrap().push(op.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn take_read_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn write_failure(fields: &Fields) -> Option<StoreError> {
        let status = fields.get("fail_with")?.as_u64()? as u16;
        Some(StoreError::Status {
            status,
            body: format!("rejected with {status}"),
        })
    }
}

/// Decrements the in-flight gauge when a call ends, even if it is dropped.
struct Leave<'a>(&'a MemoryStore);

impl Drop for Leave<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_tables(&self, _base_id: &str) -> Result<Vec<TableSchema>, StoreError> {
        let _leave = Leave(self);
        self.enter("list_tables").await;
        if self.take_read_failure() {
            return Err(StoreError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self.tables.lock().unwrap().clone())
    }

    async fn get_records(
        &self,
        _base_id: &str,
        table_id: &str,
        query: &RecordQuery,
    ) -> Result<RecordPage, StoreError> {
        let _leave = Leave(self);
        self.enter("get_records").await;
        self.queries.lock().unwrap().push(query.clone());
        if self.take_read_failure() {
            return Err(StoreError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }

        let key = self.table_key(table_id)?;
        let all = self.records_of(&key);
        let start: usize = query.offset.as_deref().map_or(0, |o| o.parse().unwrap_or(0));
        let mut take = query.max_records.unwrap_or(100);
        let page_size = self.page_size.load(Ordering::SeqCst);
        if page_size > 0 {
            take = take.min(page_size);
        }
        let end = (start + take).min(all.len());
        let records = all.get(start..end).map(<[Record]>::to_vec).unwrap_or_default();
        let offset = (end < all.len() && page_size > 0).then(|| end.to_string());
        Ok(RecordPage { records, offset })
    }

    async fn create_record(
        &self,
        _base_id: &str,
        table_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError> {
        let _leave = Leave(self);
        self.enter("create_record").await;
        if let Some(err) = Self::write_failure(fields) {
            return Err(err);
        }
        let key = self.table_key(table_id)?;
        let id = format!("rec{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = Record {
            id,
            fields: fields.clone(),
            created_time: Some("2024-01-01T00:00:00.000Z".into()),
        };
        self.records
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        _base_id: &str,
        table_id: &str,
        record_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError> {
        let _leave = Leave(self);
        self.enter("update_record").await;
        if let Some(err) = Self::write_failure(fields) {
            return Err(err);
        }
        let key = self.table_key(table_id)?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(key)
            .or_default()
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| StoreError::Status {
                status: 404,
                body: format!("record {record_id} not found"),
            })?;
        for (k, v) in fields {
            record.fields.insert(k.clone(), v.clone());
        }
        Ok(record.clone())
    }

    async fn delete_record(
        &self,
        _base_id: &str,
        table_id: &str,
        record_id: &str,
    ) -> Result<DeletedRecord, StoreError> {
        let _leave = Leave(self);
        self.enter("delete_record").await;
        let key = self.table_key(table_id)?;
        let mut records = self.records.lock().unwrap();
        let list = records.entry(key).or_default();
        let before = list.len();
        list.retain(|r| r.id != record_id);
        if list.len() == before {
            return Err(StoreError::Status {
                status: 404,
                body: format!("record {record_id} not found"),
            });
        }
        Ok(DeletedRecord {
            id: record_id.to_string(),
            deleted: true,
        })
    }

    async fn create_table(
        &self,
        _base_id: &str,
        table: &NewTable,
    ) -> Result<TableSchema, StoreError> {
        let _leave = Leave(self);
        self.enter("create_table").await;
        let fields = table
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| FieldSchema {
                id: format!("fldMeta{i}"),
                name: f["name"].as_str().unwrap_or_default().to_string(),
                field_type: f["type"].as_str().unwrap_or_default().to_string(),
                description: None,
                options: f.get("options").cloned(),
            })
            .collect();
        let schema = TableSchema {
            id: format!("tblMeta{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            name: table.name.clone(),
            description: Some(table.description.clone()),
            fields,
            ..TableSchema::default()
        };
        self.add_table(schema.clone(), Vec::new());
        Ok(schema)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn field(name: &str, ty: &str) -> FieldSchema {
    FieldSchema {
        id: format!("fld{}", name.replace(' ', "")),
        name: name.to_string(),
        field_type: ty.to_string(),
        description: None,
        options: None,
    }
}

pub fn field_with(name: &str, ty: &str, options: Value) -> FieldSchema {
    FieldSchema {
        options: Some(options),
        ..field(name, ty)
    }
}

pub fn table(id: &str, name: &str, fields: Vec<FieldSchema>) -> TableSchema {
    TableSchema {
        id: id.to_string(),
        name: name.to_string(),
        primary_field_id: fields.first().map(|f| f.id.clone()),
        fields,
        ..TableSchema::default()
    }
}

pub fn record(id: &str, fields: Value) -> Record {
    serde_json::from_value(json!({
        "id": id,
        "createdTime": "2024-01-01T00:00:00.000Z",
        "fields": fields,
    }))
    .unwrap()
}

/// A "People" table with a handful of records.
pub fn people_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.add_table(
        table(
            "tblPeople",
            "People",
            vec![
                field("Name", "singleLineText"),
                field("Email", "email"),
                field("Age", "number"),
            ],
        ),
        vec![
            record("rec1", json!({"Name": "Ada", "Email": "ada@example.com", "Age": 36})),
            record("rec2", json!({"Name": "Grace", "Email": "", "Age": 45})),
            record("rec3", json!({"Name": "ada ", "Email": "ADA@example.com"})),
            record("rec4", json!({"Name": "Linus"})),
        ],
    );
    store
}

// ---------------------------------------------------------------------------
// Engine wiring
// ---------------------------------------------------------------------------

pub struct Engine {
    pub dispatcher: ToolDispatcher,
    pub pool: Arc<StorePool>,
    pub metrics: Arc<Metrics>,
}

pub fn engine_with(store: Arc<MemoryStore>, max_connections: usize, timeout: Duration) -> Engine {
    let metrics = Metrics::new();
    let retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    };
    let pool = Arc::new(StorePool::new(store, max_connections, retry, metrics.clone()));
    let registry = Arc::new(ToolRegistry::with_catalog().unwrap());
    let dispatcher = ToolDispatcher::new(registry, pool.clone(), metrics.clone(), timeout);
    Engine {
        dispatcher,
        pool,
        metrics,
    }
}

pub fn engine(store: Arc<MemoryStore>) -> Engine {
    engine_with(store, 4, Duration::from_secs(5))
}

/// Parsed JSON body of a tool result.
pub fn body(result: &ToolResult) -> Value {
    result.body()
}

pub fn error_kind(result: &ToolResult) -> String {
    result
        .error_kind()
        .map(|kind| kind.as_str().to_string())
        .unwrap_or_default()
}
