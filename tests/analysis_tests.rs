mod common;

use common::*;
use serde_json::json;

#[tokio::test]
async fn analysis_reports_exact_fill_rates() {
    let store = people_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke("analyze_table_data", json!({"base_id": BASE, "table_id": "People"}))
        .await;
    assert!(!result.is_error(), "{:?}", body(&result));
    let out = body(&result);

    assert_eq!(out["analysis_summary"]["records_analyzed"], json!(4));
    assert_eq!(out["analysis_summary"]["total_fields"], json!(3));

    let fields = out["field_analysis"].as_array().unwrap();
    assert_eq!(fields[0]["field_name"], json!("Name"));
    assert_eq!(fields[0]["fill_rate"], json!(1.0));
    // Empty strings count as empty.
    assert_eq!(fields[1]["field_name"], json!("Email"));
    assert_eq!(fields[1]["filled_count"], json!(2));
    assert_eq!(fields[1]["fill_rate"], json!(0.5));
    assert_eq!(fields[2]["numeric"]["max"], json!(45.0));

    let insights = out["data_quality_insights"].as_array().unwrap();
    assert!(insights.iter().any(|i| i.as_str().unwrap().contains("Complete data: Name")));
}

#[tokio::test]
async fn analysis_samples_at_most_sample_size() {
    let store = people_store();
    store.set_page_size(1);
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "analyze_table_data",
            json!({"base_id": BASE, "table_id": "tblPeople", "sample_size": 2}),
        )
        .await;
    let out = body(&result);
    assert_eq!(out["analysis_summary"]["records_analyzed"], json!(2));
    assert_eq!(out["field_analysis"][0]["sampled"], json!(2));
    assert_eq!(store.calls_of("get_records"), 2);
}

#[tokio::test]
async fn duplicates_are_found_across_pages() {
    let store = people_store();
    store.set_page_size(1);
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "find_duplicates",
            json!({"base_id": BASE, "table_id": "tblPeople", "fields": ["Name", "Email"]}),
        )
        .await;
    assert!(!result.is_error(), "{:?}", body(&result));
    let out = body(&result);

    assert_eq!(out["total_records_checked"], json!(4));
    assert_eq!(out["duplicate_groups_found"], json!(1));
    assert_eq!(out["duplicates"][0]["record_ids"], json!(["rec1", "rec3"]));
    assert_eq!(out["duplicates"][0]["signature"]["Name"], json!("ada"));
    assert_eq!(out["duplicates"][0]["records"][1]["fields"]["Name"], json!("ada "));
    assert_eq!(store.calls_of("get_records"), 4);
}

#[tokio::test]
async fn duplicates_with_empty_values_when_not_ignored() {
    let store = MemoryStore::new();
    store.add_table(
        table("tblTags", "Tags", vec![field("Label", "singleLineText")]),
        vec![
            record("r1", json!({"Label": "x"})),
            record("r2", json!({})),
            record("r3", json!({"Label": "  "})),
            record("r4", json!({"Label": "X"})),
            record("r5", json!({"Label": "x"})),
        ],
    );
    let engine = engine(store.clone());

    let ignored = engine
        .dispatcher
        .invoke("find_duplicates", json!({"base_id": BASE, "table_id": "Tags", "fields": ["Label"]}))
        .await;
    assert_eq!(body(&ignored)["duplicate_groups_found"], json!(1));
    assert_eq!(body(&ignored)["total_duplicate_records"], json!(3));

    let kept = engine
        .dispatcher
        .invoke(
            "find_duplicates",
            json!({"base_id": BASE, "table_id": "Tags", "fields": ["Label"], "ignore_empty": false}),
        )
        .await;
    let out = body(&kept);
    assert_eq!(out["duplicate_groups_found"], json!(2));
    // Largest group first.
    assert_eq!(out["duplicates"][0]["record_ids"], json!(["r1", "r4", "r5"]));
    assert_eq!(out["duplicates"][1]["record_ids"], json!(["r2", "r3"]));
}

#[tokio::test]
async fn duplicates_respect_value_types_and_list_structure() {
    let store = MemoryStore::new();
    store.add_table(
        table("tblMixed", "Mixed", vec![field("Code", "singleLineText"), field("Tags", "multipleSelects")]),
        vec![
            record("r1", json!({"Code": 1, "Tags": ["a,b"]})),
            record("r2", json!({"Code": "1", "Tags": ["a", "b"]})),
            record("r3", json!({"Code": true, "Tags": ["a", "b"]})),
            record("r4", json!({"Code": "true", "Tags": ["a", "b"]})),
            record("r5", json!({"Code": " TRUE", "Tags": ["A", "b "]})),
        ],
    );
    let engine = engine(store.clone());

    let by_code = engine
        .dispatcher
        .invoke("find_duplicates", json!({"base_id": BASE, "table_id": "Mixed", "fields": ["Code"]}))
        .await;
    let out = body(&by_code);
    assert_eq!(out["duplicate_groups_found"], json!(1));
    assert_eq!(out["duplicates"][0]["record_ids"], json!(["r4", "r5"]));

    let by_tags = engine
        .dispatcher
        .invoke("find_duplicates", json!({"base_id": BASE, "table_id": "Mixed", "fields": ["Tags"]}))
        .await;
    let out = body(&by_tags);
    assert_eq!(out["duplicate_groups_found"], json!(1));
    assert_eq!(out["duplicates"][0]["record_ids"], json!(["r2", "r3", "r4", "r5"]));
    assert_eq!(out["duplicates"][0]["signature"]["Tags"], json!(["a", "b"]));
}

fn sync_store() -> std::sync::Arc<MemoryStore> {
    let store = MemoryStore::new();
    let fields = || vec![field("k", "number"), field("v", "singleLineText")];
    store.add_table(
        table("tblSource", "Source", fields()),
        vec![
            record("s1", json!({"k": 1, "v": "a"})),
            record("s2", json!({"k": 2, "v": "b"})),
            record("s3", json!({"k": 3, "v": "new"})),
            record("s4", json!({"v": "no key"})),
        ],
    );
    store.add_table(
        table("tblTarget", "Target", fields()),
        vec![
            record("t1", json!({"k": 1, "v": "a"})),
            record("t3", json!({"k": 3, "v": "old"})),
            record("t9", json!({"k": 9, "v": "orphan"})),
        ],
    );
    store
}

#[tokio::test]
async fn sync_plans_without_writing() {
    let store = sync_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "sync_tables",
            json!({
                "source_base_id": BASE,
                "source_table_id": "tblSource",
                "target_base_id": BASE,
                "target_table_id": "tblTarget",
                "key_field": "k",
            }),
        )
        .await;
    assert!(!result.is_error(), "{:?}", body(&result));
    let out = body(&result);

    assert_eq!(out["dry_run"], json!(true));
    assert_eq!(out["sync_summary"]["records_to_create"], json!(1));
    assert_eq!(out["sync_summary"]["records_to_update"], json!(1));
    assert_eq!(out["sync_summary"]["records_unchanged"], json!(1));
    assert_eq!(out["sync_summary"]["target_only"], json!(1));

    let plan = &out["plan"];
    assert_eq!(plan["to_create"], json!([{"k": 2, "v": "b"}]));
    assert_eq!(plan["unchanged"], json!([{"k": 1}]));
    assert_eq!(plan["to_update"][0]["target_record_id"], json!("t3"));
    assert_eq!(
        plan["to_update"][0]["changes"],
        json!([{"field": "v", "before": "old", "after": "new"}])
    );
    assert_eq!(plan["target_only"][0]["id"], json!("t9"));
    assert_eq!(plan["skipped_without_key"], json!(["s4"]));

    for op in ["create_record", "update_record", "delete_record"] {
        assert_eq!(store.calls_of(op), 0, "{op} was called");
    }
}

#[tokio::test]
async fn sync_never_applies_even_without_dry_run() {
    let store = sync_store();
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "sync_tables",
            json!({
                "source_base_id": BASE,
                "source_table_id": "tblSource",
                "target_base_id": BASE,
                "target_table_id": "tblTarget",
                "key_field": "k",
                "dry_run": false,
            }),
        )
        .await;
    assert_eq!(body(&result)["dry_run"], json!(false));
    assert_eq!(store.records_of("tblTarget").len(), 3);
    assert_eq!(store.calls_of("create_record"), 0);
}

#[tokio::test]
async fn export_renders_csv_with_preview() {
    let store = MemoryStore::new();
    let records = (1..=7)
        .map(|i| record(&format!("rec{i}"), json!({"Name": format!("n{i}"), "Tags": ["a", "b"]})))
        .collect();
    store.add_table(
        table("tblItems", "Items", vec![field("Name", "singleLineText"), field("Tags", "multipleSelects")]),
        records,
    );
    let engine = engine(store.clone());

    let result = engine
        .dispatcher
        .invoke(
            "export_table_csv",
            json!({"base_id": BASE, "table_id": "tblItems", "fields": ["Name", "Tags"]}),
        )
        .await;
    assert!(!result.is_error(), "{:?}", body(&result));
    let out = body(&result);
    assert_eq!(out["record_count"], json!(7));

    let data = out["full_csv_data"].as_str().unwrap();
    let lines: Vec<&str> = data.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "Record ID,Name,Tags,Created Time");
    assert_eq!(lines[1], "rec1,n1,\"a, b\",2024-01-01T00:00:00.000Z");

    let preview = out["csv_preview"].as_str().unwrap();
    assert_eq!(preview.lines().count(), 6);
}

#[tokio::test]
async fn metadata_table_is_created_once_and_filled() {
    let store = people_store();
    store.add_table(
        table(
            "tblProjects",
            "Projects",
            vec![field("Title", "singleLineText"), field("Budget", "currency")],
        ),
        vec![],
    );
    let engine = engine(store.clone());

    let first = engine
        .dispatcher
        .invoke("create_metadata_table", json!({"base_id": BASE}))
        .await;
    assert!(!first.is_error(), "{:?}", body(&first));
    let out = body(&first);
    assert_eq!(out["table_name"], json!("Table Metadata"));
    assert_eq!(out["table_created"], json!(true));
    assert_eq!(out["records_created"], json!(2));
    assert_eq!(out["metadata_summary"]["total_tables_analyzed"], json!(2));

    let meta_id = out["table_id"].as_str().unwrap().to_string();
    let rows = store.records_of(&meta_id);
    assert_eq!(rows.len(), 2);
    let row_for = |name: &str| {
        rows.iter()
            .find(|r| r.fields["Table Name"] == json!(name))
            .unwrap()
            .fields
            .clone()
    };
    assert_eq!(row_for("People")["Purpose"], json!("Contact/People Management"));
    let projects = row_for("Projects");
    assert_eq!(projects["Purpose"], json!("Project/Task Management"));
    assert_eq!(projects["Field Types"], json!("currency: 1, singleLineText: 1"));

    let second = engine
        .dispatcher
        .invoke("create_metadata_table", json!({"base_id": BASE}))
        .await;
    assert_eq!(body(&second)["table_created"], json!(false));
    assert_eq!(body(&second)["table_id"], json!(meta_id));
    assert_eq!(store.calls_of("create_table"), 1);
}
