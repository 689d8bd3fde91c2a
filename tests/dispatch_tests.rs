mod common;

use std::time::Duration;

use common::*;
use serde_json::json;

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine.dispatcher.invoke("drop_base", json!({})).await;
    assert!(result.is_error());
    assert_eq!(error_kind(&result), "NotFound");
    assert_eq!(store.call_count(), 0);
    assert_eq!(engine.metrics.snapshot().not_found, 1);
}

#[tokio::test]
async fn schema_violations_name_the_field_and_skip_the_store() {
    let store = people_store();
    let engine = engine(store.clone());

    let missing = engine
        .dispatcher
        .invoke("get_records", json!({"base_id": BASE}))
        .await;
    assert_eq!(error_kind(&missing), "InvalidArgs");
    assert_eq!(body(&missing)["error"]["detail"]["field"], json!("table_id"));

    let out_of_range = engine
        .dispatcher
        .invoke(
            "get_records",
            json!({"base_id": BASE, "table_id": "People", "max_records": 5000}),
        )
        .await;
    assert_eq!(body(&out_of_range)["error"]["detail"]["field"], json!("max_records"));

    let unknown_arg = engine
        .dispatcher
        .invoke("list_tables", json!({"base_id": BASE, "verbose": true}))
        .await;
    assert_eq!(body(&unknown_arg)["error"]["detail"]["field"], json!("verbose"));

    assert_eq!(store.call_count(), 0);
    assert_eq!(engine.metrics.snapshot().invalid_args, 3);
}

#[tokio::test]
async fn list_tables_summarizes_schema() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke("list_tables", json!({"base_id": BASE}))
        .await;
    assert!(!result.is_error());
    let out = body(&result);
    assert_eq!(out["table_count"], json!(1));
    assert_eq!(out["tables"][0]["name"], json!("People"));
    assert_eq!(out["tables"][0]["field_count"], json!(3));
}

#[tokio::test]
async fn get_records_forwards_sanitized_formula() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "get_records",
            json!({
                "base_id": BASE,
                "table_id": "tblPeople",
                "max_records": 2,
                "filter_by_formula": "AND({Age} > 30, {Name} = 'Ada')",
            }),
        )
        .await;
    assert!(!result.is_error(), "{:?}", body(&result));
    assert_eq!(body(&result)["records"].as_array().unwrap().len(), 2);

    let query = store.last_query().unwrap();
    assert_eq!(query.max_records, Some(2));
    assert_eq!(
        query.filter_by_formula.as_deref(),
        Some("AND({Age} > 30, {Name} = \"Ada\")")
    );
}

#[tokio::test]
async fn disallowed_function_never_reaches_the_store() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "get_records",
            json!({
                "base_id": BASE,
                "table_id": "tblPeople",
                "filter_by_formula": "DELETE_ALL({Name})",
            }),
        )
        .await;
    assert_eq!(error_kind(&result), "SecurityError");
    assert_eq!(store.call_count(), 0);
    assert_eq!(engine.metrics.snapshot().security_rejections, 1);
}

#[tokio::test]
async fn unknown_field_costs_one_schema_read_and_no_record_read() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "get_records",
            json!({
                "base_id": BASE,
                "table_id": "tblPeople",
                "filter_by_formula": "{Salary} > 100",
            }),
        )
        .await;
    assert_eq!(error_kind(&result), "SecurityError");
    assert_eq!(store.calls_of("list_tables"), 1);
    assert_eq!(store.calls_of("get_records"), 0);
}

#[tokio::test]
async fn search_with_formula_tokens_is_rejected_before_any_call() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "search_records",
            json!({
                "base_id": BASE,
                "table_id": "tblPeople",
                "query": "x\") , DELETE_RECORDS(",
            }),
        )
        .await;
    assert_eq!(error_kind(&result), "SecurityError");
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn search_escapes_query_as_literal() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "search_records",
            json!({
                "base_id": BASE,
                "table_id": "People",
                "query": "O\"Brien",
                "fields": ["Name"],
            }),
        )
        .await;
    assert!(!result.is_error(), "{:?}", body(&result));
    let formula = store.last_query().unwrap().filter_by_formula.unwrap();
    assert!(formula.contains("\\\""), "quote not escaped: {formula}");
    assert!(formula.contains("{Name}"));
    assert_eq!(body(&result)["fields_searched"], json!(["Name"]));
}

#[tokio::test]
async fn missing_table_is_not_found() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke("get_field_info", json!({"base_id": BASE, "table_id": "Ghosts"}))
        .await;
    assert_eq!(error_kind(&result), "NotFound");

    let result = engine
        .dispatcher
        .invoke("get_records", json!({"base_id": BASE, "table_id": "Ghosts"}))
        .await;
    assert_eq!(error_kind(&result), "NotFound");
}

#[tokio::test]
async fn field_info_reports_formula_and_links_verbatim() {
    let store = MemoryStore::new();
    store.add_table(
        table(
            "tblOrders",
            "Orders",
            vec![
                field("Order", "singleLineText"),
                field_with("Total", "formula", json!({"formula": "{Qty} * {Unit Price}"})),
                field_with("Customer", "multipleRecordLinks", json!({"linkedTableId": "tblCustomers"})),
                field_with(
                    "Customer Email",
                    "lookup",
                    json!({"relationshipTableId": "tblCustomers", "fieldIdInLinkedTable": "fldEmail"}),
                ),
                field_with(
                    "Status",
                    "singleSelect",
                    json!({"choices": [{"name": "Open"}, {"name": "Shipped"}]}),
                ),
            ],
        ),
        vec![],
    );
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke("get_field_info", json!({"base_id": BASE, "table_id": "Orders"}))
        .await;
    assert!(!result.is_error());
    let out = body(&result);
    assert_eq!(out["total_fields"], json!(5));
    assert_eq!(out["fields"][0]["is_primary"], json!(true));
    assert_eq!(out["fields"][1]["formula"], json!("{Qty} * {Unit Price}"));
    assert_eq!(out["fields"][2]["linked_table"], json!("tblCustomers"));
    assert_eq!(out["fields"][3]["lookup_field"], json!("fldEmail"));
    assert_eq!(out["fields"][4]["choices"], json!(["Open", "Shipped"]));
    assert_eq!(out["field_types"]["formula"], json!(1));
    assert_eq!(store.call_count(), 1);
}

#[tokio::test]
async fn single_record_writes() {
    let store = people_store();
    let engine = engine(store.clone());

    let created = engine
        .dispatcher
        .invoke(
            "create_record",
            json!({"base_id": BASE, "table_id": "tblPeople", "fields": {"Name": "Barbara"}}),
        )
        .await;
    assert!(!created.is_error());
    let id = body(&created)["id"].as_str().unwrap().to_string();

    let updated = engine
        .dispatcher
        .invoke(
            "update_record",
            json!({"base_id": BASE, "table_id": "tblPeople", "record_id": id, "fields": {"Age": 70}}),
        )
        .await;
    assert_eq!(body(&updated)["fields"]["Age"], json!(70));
    assert_eq!(body(&updated)["fields"]["Name"], json!("Barbara"));

    let deleted = engine
        .dispatcher
        .invoke(
            "delete_record",
            json!({"base_id": BASE, "table_id": "tblPeople", "record_id": id}),
        )
        .await;
    assert_eq!(body(&deleted)["deleted"], json!(true));
    assert_eq!(store.records_of("tblPeople").len(), 4);
}

#[tokio::test]
async fn writes_are_not_retried() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "create_record",
            json!({"base_id": BASE, "table_id": "tblPeople", "fields": {"fail_with": 503}}),
        )
        .await;
    assert_eq!(error_kind(&result), "UpstreamError");
    assert_eq!(body(&result)["error"]["detail"]["retryable"], json!(true));
    assert_eq!(store.calls_of("create_record"), 1);
}

#[tokio::test]
async fn reads_retry_transient_failures() {
    let store = people_store();
    let engine = engine(store.clone());
    store.fail_next_reads(2);

    let result = engine
        .dispatcher
        .invoke("list_tables", json!({"base_id": BASE}))
        .await;
    assert!(!result.is_error(), "{:?}", body(&result));
    assert_eq!(store.calls_of("list_tables"), 3);
    assert_eq!(engine.metrics.snapshot().upstream_retries, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_and_releases_permits() {
    let store = people_store();
    store.set_delay(Duration::from_secs(30));
    let engine = engine_with(store.clone(), 2, Duration::from_secs(1));

    let result = engine
        .dispatcher
        .invoke("list_tables", json!({"base_id": BASE}))
        .await;
    assert_eq!(error_kind(&result), "Timeout");
    assert_eq!(engine.pool.available_connections(), engine.pool.max_connections());
    assert_eq!(engine.metrics.snapshot().timeouts, 1);
}
