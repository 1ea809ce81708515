use std::sync::Arc;

use cck_database::{FsDatabaseService, InMemoryDatabaseService};
use cck_domain::{
    AttributeCondition, DatabaseOptions, DatabaseService, DbKey, Primitive, ReturnValues,
};
use cck_memory::InMemoryMemoryService;
use serde_json::json;

const TABLE: &str = "devices";

fn key(id: &str) -> DbKey {
    DbKey::new("DeviceId", id)
}

async fn seed(db: &dyn DatabaseService, id: &str, body: serde_json::Value) {
    db.put_item(TABLE, &key(id), &body, ReturnValues::DoNotReturn, true)
        .await
        .expect("seed put");
}

#[tokio::test]
async fn key_round_trips_for_every_primitive_kind() {
    let db = InMemoryDatabaseService::in_memory();
    let keys = vec![
        DbKey::new("K", Primitive::String("s".into())),
        DbKey::new("K", Primitive::Integer(42)),
        DbKey::new("K", Primitive::Double(4.25)),
        DbKey::new("K", Primitive::Boolean(true)),
        DbKey::new("K", Primitive::Bytes(vec![1, 2, 3])),
    ];
    for k in keys {
        let body = json!({ "Payload": "x" });
        db.put_item("kinds", &k, &body, ReturnValues::DoNotReturn, true).await.unwrap();
        let got = db.get_item("kinds", &k).await.unwrap().expect("item back");
        assert_eq!(got["Payload"], "x");
        assert_eq!(got["K"], k.value.to_json(), "key must be re-injected at its name");
    }
}

#[tokio::test]
async fn put_without_overwrite_conflicts() {
    let db = InMemoryDatabaseService::in_memory();
    seed(&db, "d1", json!({ "Status": "active" })).await;

    let err = db
        .put_item(TABLE, &key("d1"), &json!({ "Status": "new" }), ReturnValues::DoNotReturn, false)
        .await
        .unwrap_err();
    assert_eq!(err.status(), 409);

    // The stored body is untouched.
    let got = db.get_item(TABLE, &key("d1")).await.unwrap().unwrap();
    assert_eq!(got["Status"], "active");
}

#[tokio::test]
async fn conditional_update_respects_value_predicate() {
    let db = InMemoryDatabaseService::in_memory();
    seed(&db, "d1", json!({ "Status": "active", "Value": 100 })).await;

    // Value >= 50 holds: update succeeds.
    let updated = db
        .update_item(
            TABLE,
            &key("d1"),
            &json!({ "Status": "inactive" }),
            ReturnValues::NewValues,
            &[AttributeCondition::ge("Value", Primitive::Integer(50))],
        )
        .await
        .unwrap()
        .expect("new values requested");
    assert_eq!(updated["Status"], "inactive");
    assert_eq!(updated["Value"], 100);

    // With Value at 10 the same call must fail and leave the item alone.
    seed(&db, "d2", json!({ "Status": "active", "Value": 10 })).await;
    let err = db
        .update_item(
            TABLE,
            &key("d2"),
            &json!({ "Status": "inactive" }),
            ReturnValues::DoNotReturn,
            &[AttributeCondition::ge("Value", Primitive::Integer(50))],
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), 412);
    let got = db.get_item(TABLE, &key("d2")).await.unwrap().unwrap();
    assert_eq!(got["Status"], "active");
}

#[tokio::test]
async fn array_element_condition_gates_delete() {
    let db = InMemoryDatabaseService::in_memory();
    seed(&db, "d1", json!({ "Tags": ["production", "db"] })).await;

    db.delete_item(
        TABLE,
        &key("d1"),
        ReturnValues::DoNotReturn,
        &[AttributeCondition::array_element_exists("Tags", Primitive::from("production"))],
    )
    .await
    .expect("delete with matching element");
    assert!(db.get_item(TABLE, &key("d1")).await.unwrap().is_none());

    seed(&db, "d1", json!({ "Tags": ["production", "db"] })).await;
    let err = db
        .delete_item(
            TABLE,
            &key("d1"),
            ReturnValues::DoNotReturn,
            &[AttributeCondition::array_element_not_exists(
                "Tags",
                Primitive::from("production"),
            )],
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), 412);
    assert!(db.get_item(TABLE, &key("d1")).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_of_absent_item_is_a_null_success() {
    let db = InMemoryDatabaseService::in_memory();
    let out = db
        .delete_item(TABLE, &key("ghost"), ReturnValues::OldValues, &[])
        .await
        .unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn item_exists_distinguishes_absence_from_condition_failure() {
    let db = InMemoryDatabaseService::in_memory();
    seed(&db, "d1", json!({ "Value": 5 })).await;

    assert!(db.item_exists(TABLE, &key("d1"), &[]).await.unwrap());

    let absent = db.item_exists(TABLE, &key("nope"), &[]).await.unwrap_err();
    assert_eq!(absent.status(), 404);

    let failed = db
        .item_exists(TABLE, &key("d1"), &[AttributeCondition::ge("Value", Primitive::Integer(50))])
        .await
        .unwrap_err();
    assert_eq!(failed.status(), 412);
}

#[tokio::test]
async fn increments_are_additive_and_create_on_missing() {
    let db = InMemoryDatabaseService::in_memory();

    let first = db.increment_attribute(TABLE, &key("ctr"), "Hits", 2.5, &[]).await.unwrap();
    assert_eq!(first, 2.5);
    let second = db.increment_attribute(TABLE, &key("ctr"), "Hits", 4.0, &[]).await.unwrap();
    assert_eq!(second, 6.5);

    // Non-numeric attributes restart from zero.
    seed(&db, "odd", json!({ "Hits": "not-a-number" })).await;
    let reset = db.increment_attribute(TABLE, &key("odd"), "Hits", 3.0, &[]).await.unwrap();
    assert_eq!(reset, 3.0);
}

#[tokio::test]
async fn array_add_then_remove_restores_the_array() {
    let db = InMemoryDatabaseService::in_memory();
    seed(&db, "d1", json!({ "Tags": ["keep"] })).await;

    let added: Vec<Primitive> = vec![Primitive::from("a"), Primitive::from("b")];
    db.add_elements_to_array(TABLE, &key("d1"), "Tags", &added, ReturnValues::DoNotReturn, &[])
        .await
        .unwrap();
    db.remove_elements_from_array(
        TABLE,
        &key("d1"),
        "Tags",
        &added,
        ReturnValues::DoNotReturn,
        &[],
    )
    .await
    .unwrap();

    let got = db.get_item(TABLE, &key("d1")).await.unwrap().unwrap();
    assert_eq!(got["Tags"], json!(["keep"]));
}

#[tokio::test]
async fn array_ops_reject_empty_or_mixed_input() {
    let db = InMemoryDatabaseService::in_memory();

    let empty: Vec<Primitive> = vec![];
    let err = db
        .add_elements_to_array(TABLE, &key("d1"), "Tags", &empty, ReturnValues::DoNotReturn, &[])
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);

    let mixed = vec![Primitive::from("a"), Primitive::Integer(1)];
    let err = db
        .add_elements_to_array(TABLE, &key("d1"), "Tags", &mixed, ReturnValues::DoNotReturn, &[])
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn return_values_hand_back_the_requested_image() {
    let db = InMemoryDatabaseService::in_memory();
    seed(&db, "d1", json!({ "Value": 1 })).await;

    let old = db
        .put_item(TABLE, &key("d1"), &json!({ "Value": 2 }), ReturnValues::OldValues, true)
        .await
        .unwrap()
        .expect("old image");
    assert_eq!(old["Value"], 1);
    assert_eq!(old["DeviceId"], "d1");

    let new = db
        .update_item(TABLE, &key("d1"), &json!({ "Value": 3 }), ReturnValues::NewValues, &[])
        .await
        .unwrap()
        .expect("new image");
    assert_eq!(new["Value"], 3);
}

#[tokio::test]
async fn options_post_process_returned_items() {
    let db = InMemoryDatabaseService::in_memory();
    db.set_options(DatabaseOptions {
        auto_sort_arrays: true,
        auto_convert_roundable_float_to_int: true,
    });
    seed(&db, "d1", json!({ "Tags": ["z", "a"], "Score": 5.0 })).await;

    let got = db.get_item(TABLE, &key("d1")).await.unwrap().unwrap();
    assert_eq!(got["Tags"], json!(["a", "z"]));
    assert_eq!(got["Score"], json!(5));
}

#[tokio::test]
async fn paginated_scan_walks_the_whole_table_monotonically() {
    let db = InMemoryDatabaseService::in_memory();
    for i in 0..7 {
        seed(&db, &format!("d{i}"), json!({ "N": i })).await;
    }

    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = db.scan_table_paginated(TABLE, 3, token.as_deref()).await.unwrap();
        assert_eq!(page.total_count, Some(7));
        seen.extend(page.items.into_iter().map(|i| i["DeviceId"].as_str().unwrap().to_string()));
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    seen.sort();
    assert_eq!(seen, (0..7).map(|i| format!("d{i}")).collect::<Vec<_>>());
}

#[tokio::test]
async fn filtered_scan_applies_all_conditions() {
    let db = InMemoryDatabaseService::in_memory();
    seed(&db, "d1", json!({ "Kind": "sensor", "Value": 10 })).await;
    seed(&db, "d2", json!({ "Kind": "sensor", "Value": 90 })).await;
    seed(&db, "d3", json!({ "Kind": "relay", "Value": 95 })).await;

    let rows = db
        .scan_table_with_filter(
            TABLE,
            &[
                AttributeCondition::eq("Kind", Primitive::from("sensor")),
                AttributeCondition::ge("Value", Primitive::Integer(50)),
            ],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["DeviceId"], "d2");
}

#[tokio::test]
async fn fs_backend_scans_through_the_key_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let memory = Arc::new(InMemoryMemoryService::new());
    let db = FsDatabaseService::on_disk(dir.path(), memory);

    seed(&db, "d1", json!({ "Value": 1 })).await;
    seed(&db, "d2", json!({ "Value": 2 })).await;

    let rows = db.scan_table(TABLE).await.unwrap();
    assert_eq!(rows.len(), 2);

    db.delete_item(TABLE, &key("d1"), ReturnValues::DoNotReturn, &[]).await.unwrap();
    let rows = db.scan_table(TABLE).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["DeviceId"], "d2");

    db.drop_table(TABLE).await.unwrap();
    assert!(db.scan_table(TABLE).await.unwrap().is_empty());
}

#[tokio::test]
async fn fs_backend_round_trips_items_across_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let memory = Arc::new(InMemoryMemoryService::new());

    {
        let db = FsDatabaseService::on_disk(dir.path(), memory.clone());
        seed(&db, "d1", json!({ "Status": "active" })).await;
    }

    let db = FsDatabaseService::on_disk(dir.path(), memory);
    let got = db.get_item(TABLE, &key("d1")).await.unwrap().unwrap();
    assert_eq!(got["Status"], "active");
    assert_eq!(got["DeviceId"], "d1");
}
