//! RecordStore interface tests.
//!
//! These tests verify the contract of the RecordStore trait.
//! Each storage implementation should run these tests. Partitions are
//! suffixed with a fresh uuid so runs against a shared table never collide.

use serde_json::{json, Value};
use uuid::Uuid;

use fraud_desk::storage::{
    Attributes, ExpectedAttribute, RangeQuery, Record, RecordKey, RecordStore, SortCondition,
    StorageError,
};

/// Unique partition name for one test.
pub fn partition(name: &str) -> String {
    format!("{}-{}", name, Uuid::new_v4())
}

/// Build attributes from a JSON object literal.
pub fn attrs(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

pub fn record(partition: &str, sort_key: &str, value: Value) -> Record {
    Record::new(RecordKey::new(partition, sort_key), attrs(value))
}

async fn seed<S: RecordStore>(store: &S, partition: &str, sort_keys: &[&str]) {
    for (i, sort_key) in sort_keys.iter().enumerate() {
        store
            .put(record(partition, sort_key, json!({ "n": i })))
            .await
            .expect("put should succeed");
    }
}

/// Drain a query page by page with the given page size.
async fn drain<S: RecordStore>(store: &S, query: RangeQuery, limit: usize) -> Vec<String> {
    let mut sort_keys = Vec::new();
    let mut start = None;
    loop {
        let page = store
            .query(query.clone().with_limit(limit).starting_after(start))
            .await
            .expect("query should succeed");
        assert!(page.items.len() <= limit, "page exceeds its limit");
        sort_keys.extend(page.items.into_iter().map(|r| r.key.sort_key));
        match page.continuation {
            Some(next) => start = Some(next),
            None => return sort_keys,
        }
    }
}

// =============================================================================
// get / put tests
// =============================================================================

pub async fn test_get_missing<S: RecordStore>(store: &S) {
    let key = RecordKey::new(partition("TEST_MISSING"), "-");
    let found = store.get(&key).await.expect("get should succeed");
    assert!(found.is_none(), "missing key should return None");
}

pub async fn test_put_and_get<S: RecordStore>(store: &S) {
    let pk = partition("TEST_PUT");
    let stored = record(
        &pk,
        "T1",
        json!({ "status": "OPEN", "assigned_to": { "name": "ana" }, "amount": 12.5, "tags": ["a", "b"] }),
    );
    store.put(stored.clone()).await.expect("put should succeed");

    let found = store
        .get(&stored.key)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(found.get_str("status"), Some("OPEN"));
    assert_eq!(found.get("assigned_to"), Some(&json!({ "name": "ana" })));
    assert_eq!(found.get("amount"), Some(&json!(12.5)));
    assert_eq!(found.get("tags"), Some(&json!(["a", "b"])));
}

pub async fn test_put_overwrites<S: RecordStore>(store: &S) {
    let pk = partition("TEST_OVERWRITE");
    store
        .put(record(&pk, "T1", json!({ "status": "OPEN", "note": "x" })))
        .await
        .expect("first put should succeed");
    store
        .put(record(&pk, "T1", json!({ "status": "CLOSED" })))
        .await
        .expect("second put should succeed");

    let found = store
        .get(&RecordKey::new(pk, "T1"))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(found.get_str("status"), Some("CLOSED"));
    assert!(found.get("note").is_none(), "put replaces the whole record");
}

pub async fn test_put_if_absent_conflicts<S: RecordStore>(store: &S) {
    let pk = partition("TEST_PUT_IF_ABSENT");
    store
        .put_if_absent(record(&pk, "-", json!({ "v": 1 })))
        .await
        .expect("first insert should succeed");

    let err = store
        .put_if_absent(record(&pk, "-", json!({ "v": 2 })))
        .await
        .expect_err("second insert should conflict");
    assert!(matches!(err, StorageError::ConflictExists(_)), "got {:?}", err);

    let found = store
        .get(&RecordKey::new(pk, "-"))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(found.get("v"), Some(&json!(1)), "conflict must not overwrite");
}

// =============================================================================
// update tests
// =============================================================================

pub async fn test_update_merges<S: RecordStore>(store: &S) {
    let pk = partition("TEST_UPDATE");
    store
        .put(record(&pk, "T1", json!({ "status": "OPEN", "title": "a" })))
        .await
        .expect("put should succeed");

    let updated = store
        .update(&RecordKey::new(pk.clone(), "T1"), attrs(json!({ "title": "b", "extra": 1 })))
        .await
        .expect("update should succeed");
    assert_eq!(updated.get_str("status"), Some("OPEN"));
    assert_eq!(updated.get_str("title"), Some("b"));
    assert_eq!(updated.get("extra"), Some(&json!(1)));
}

pub async fn test_update_creates_missing<S: RecordStore>(store: &S) {
    let key = RecordKey::new(partition("TEST_UPDATE_NEW"), "T1");
    store
        .update(&key, attrs(json!({ "title": "new" })))
        .await
        .expect("update should succeed");
    let found = store
        .get(&key)
        .await
        .expect("get should succeed")
        .expect("update should create the record");
    assert_eq!(found.get_str("title"), Some("new"));
}

pub async fn test_update_if_condition<S: RecordStore>(store: &S) {
    let pk = partition("TEST_UPDATE_IF");
    let key = RecordKey::new(pk.clone(), "T1");
    store
        .put(record(&pk, "T1", json!({ "status": "OPEN" })))
        .await
        .expect("put should succeed");

    store
        .update_if(
            &key,
            attrs(json!({ "status": "IN_PROGRESS" })),
            &ExpectedAttribute::new("status", "OPEN"),
        )
        .await
        .expect("matching condition should succeed");

    let err = store
        .update_if(
            &key,
            attrs(json!({ "status": "CLOSED" })),
            &ExpectedAttribute::new("status", "OPEN"),
        )
        .await
        .expect_err("stale condition should fail");
    assert!(matches!(err, StorageError::ConditionFailed { .. }), "got {:?}", err);

    let found = store.get(&key).await.expect("get should succeed").expect("record should exist");
    assert_eq!(found.get_str("status"), Some("IN_PROGRESS"));
}

pub async fn test_update_if_missing_fails<S: RecordStore>(store: &S) {
    let key = RecordKey::new(partition("TEST_UPDATE_IF_MISSING"), "T1");
    let err = store
        .update_if(
            &key,
            attrs(json!({ "status": "CLOSED" })),
            &ExpectedAttribute::new("status", "OPEN"),
        )
        .await
        .expect_err("absent record should fail the condition");
    assert!(matches!(err, StorageError::ConditionFailed { .. }), "got {:?}", err);
    assert!(store.get(&key).await.expect("get should succeed").is_none());
}

// =============================================================================
// delete / replace / batch tests
// =============================================================================

pub async fn test_delete<S: RecordStore>(store: &S) {
    let pk = partition("TEST_DELETE");
    let key = RecordKey::new(pk.clone(), "T1");
    store.put(record(&pk, "T1", json!({}))).await.expect("put should succeed");
    store.delete(&key).await.expect("delete should succeed");
    assert!(store.get(&key).await.expect("get should succeed").is_none());

    store.delete(&key).await.expect("deleting an absent key should succeed");
}

pub async fn test_replace_moves_record<S: RecordStore>(store: &S) {
    let open = partition("TEST_REPLACE_OPEN");
    let closed = partition("TEST_REPLACE_CLOSED");
    store
        .put(record(&open, "T1", json!({ "status": "OPEN" })))
        .await
        .expect("put should succeed");

    store
        .replace(
            &RecordKey::new(open.clone(), "T1"),
            record(&closed, "T1", json!({ "status": "CLOSED" })),
        )
        .await
        .expect("replace should succeed");

    assert!(store
        .get(&RecordKey::new(open, "T1"))
        .await
        .expect("get should succeed")
        .is_none());
    let moved = store
        .get(&RecordKey::new(closed, "T1"))
        .await
        .expect("get should succeed")
        .expect("record should exist under the new key");
    assert_eq!(moved.get_str("status"), Some("CLOSED"));
}

pub async fn test_replace_onto_same_key<S: RecordStore>(store: &S) {
    let pk = partition("TEST_REPLACE_SAME");
    let key = RecordKey::new(pk.clone(), "T1");
    store
        .put(record(&pk, "T1", json!({ "status": "OPEN" })))
        .await
        .expect("put should succeed");

    store
        .replace(&key, record(&pk, "T1", json!({ "status": "CLOSED" })))
        .await
        .expect("replace onto the same key should succeed");

    let found = store
        .get(&key)
        .await
        .expect("get should succeed")
        .expect("record should still exist");
    assert_eq!(found.get_str("status"), Some("CLOSED"));
}

pub async fn test_put_batch<S: RecordStore>(store: &S) {
    let pk = partition("TEST_BATCH");
    // More than one DynamoDB batch-write chunk.
    let records: Vec<Record> = (0..30)
        .map(|i| record(&pk, &format!("M{:03}", i), json!({ "i": i })))
        .collect();
    store.put_batch(records).await.expect("batch should succeed");

    assert_eq!(
        store.count(&pk, SortCondition::All).await.expect("count should succeed"),
        30
    );
}

// =============================================================================
// query tests
// =============================================================================

pub async fn test_query_conditions<S: RecordStore>(store: &S) {
    let pk = partition("TEST_CONDITIONS");
    seed(store, &pk, &["A#1", "A#2", "B#1", "C#1"]).await;

    let keys = |page: fraud_desk::storage::QueryPage| {
        page.items.into_iter().map(|r| r.key.sort_key).collect::<Vec<_>>()
    };

    let all = store.query(RangeQuery::new(&pk)).await.expect("query should succeed");
    assert_eq!(keys(all), vec!["A#1", "A#2", "B#1", "C#1"]);

    let prefix = store
        .query(RangeQuery::new(&pk).with_condition(SortCondition::BeginsWith("A#".into())))
        .await
        .expect("query should succeed");
    assert_eq!(keys(prefix), vec!["A#1", "A#2"]);

    let exact = store
        .query(RangeQuery::new(&pk).with_condition(SortCondition::Equals("B#1".into())))
        .await
        .expect("query should succeed");
    assert_eq!(keys(exact), vec!["B#1"]);

    let between = store
        .query(
            RangeQuery::new(&pk)
                .with_condition(SortCondition::Between("A#2".into(), "B#1".into())),
        )
        .await
        .expect("query should succeed");
    assert_eq!(keys(between), vec!["A#2", "B#1"], "bounds are inclusive");
}

pub async fn test_query_descending<S: RecordStore>(store: &S) {
    let pk = partition("TEST_DESCENDING");
    seed(store, &pk, &["1", "2", "3"]).await;

    let page = store
        .query(RangeQuery::new(&pk).descending())
        .await
        .expect("query should succeed");
    let sort_keys: Vec<_> = page.items.iter().map(|r| r.key.sort_key.as_str()).collect();
    assert_eq!(sort_keys, vec!["3", "2", "1"]);
}

pub async fn test_query_partition_isolation<S: RecordStore>(store: &S) {
    let a = partition("TEST_ISOLATION");
    let b = format!("{}-B", a);
    seed(store, &a, &["1"]).await;
    seed(store, &b, &["1", "2"]).await;

    let page = store.query(RangeQuery::new(&a)).await.expect("query should succeed");
    assert_eq!(page.items.len(), 1, "query must not leak into a neighbouring partition");
}

pub async fn test_query_continuation<S: RecordStore>(store: &S) {
    let pk = partition("TEST_CONTINUATION");
    let sort_keys: Vec<String> = (0..7).map(|i| format!("{:03}", i)).collect();
    let refs: Vec<&str> = sort_keys.iter().map(String::as_str).collect();
    seed(store, &pk, &refs).await;

    let ascending = drain(store, RangeQuery::new(&pk), 3).await;
    assert_eq!(ascending, sort_keys, "ascending pages cover every record once");

    let mut expected = sort_keys.clone();
    expected.reverse();
    let descending = drain(store, RangeQuery::new(&pk).descending(), 2).await;
    assert_eq!(descending, expected, "descending pages cover every record once");
}

pub async fn test_count<S: RecordStore>(store: &S) {
    let pk = partition("TEST_COUNT");
    seed(store, &pk, &["A#1", "A#2", "B#1"]).await;

    assert_eq!(
        store.count(&pk, SortCondition::All).await.expect("count should succeed"),
        3
    );
    assert_eq!(
        store
            .count(&pk, SortCondition::BeginsWith("A#".into()))
            .await
            .expect("count should succeed"),
        2
    );
    assert_eq!(
        store
            .count(&partition("TEST_COUNT_EMPTY"), SortCondition::All)
            .await
            .expect("count should succeed"),
        0
    );
}

/// Run all RecordStore tests against a store implementation.
#[macro_export]
macro_rules! run_record_store_tests {
    ($store:expr) => {
        use $crate::storage::record_store_tests::*;

        // get / put tests
        test_get_missing($store).await;
        println!("  test_get_missing: PASSED");

        test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");

        test_put_overwrites($store).await;
        println!("  test_put_overwrites: PASSED");

        test_put_if_absent_conflicts($store).await;
        println!("  test_put_if_absent_conflicts: PASSED");

        // update tests
        test_update_merges($store).await;
        println!("  test_update_merges: PASSED");

        test_update_creates_missing($store).await;
        println!("  test_update_creates_missing: PASSED");

        test_update_if_condition($store).await;
        println!("  test_update_if_condition: PASSED");

        test_update_if_missing_fails($store).await;
        println!("  test_update_if_missing_fails: PASSED");

        // delete / replace / batch tests
        test_delete($store).await;
        println!("  test_delete: PASSED");

        test_replace_moves_record($store).await;
        println!("  test_replace_moves_record: PASSED");

        test_replace_onto_same_key($store).await;
        println!("  test_replace_onto_same_key: PASSED");

        test_put_batch($store).await;
        println!("  test_put_batch: PASSED");

        // query tests
        test_query_conditions($store).await;
        println!("  test_query_conditions: PASSED");

        test_query_descending($store).await;
        println!("  test_query_descending: PASSED");

        test_query_partition_isolation($store).await;
        println!("  test_query_partition_isolation: PASSED");

        test_query_continuation($store).await;
        println!("  test_query_continuation: PASSED");

        test_count($store).await;
        println!("  test_count: PASSED");
    };
}
