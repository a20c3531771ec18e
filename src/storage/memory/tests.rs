//! Unit tests for the in-memory store.
//!
//! Behaviour shared with every backend lives in `tests/storage/`; these
//! cover paging details and failure injection.

use serde_json::json;

use super::*;

fn record(pk: &str, sk: &str) -> Record {
    let mut attributes = Attributes::new();
    attributes.insert("sk".to_string(), json!(sk));
    Record::new(RecordKey::new(pk, sk), attributes)
}

async fn seeded(pk: &str, count: usize) -> MemoryStore {
    let store = MemoryStore::new();
    for i in 0..count {
        store.put(record(pk, &format!("{:02}", i))).await.unwrap();
    }
    store
}

mod paging_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_page_returns_continuation_even_at_end() {
        let store = seeded("P", 3).await;
        let page = store
            .query(RangeQuery::new("P").with_limit(3))
            .await
            .unwrap();

        assert_eq!(page.items.len(), 3);
        assert_eq!(page.continuation, Some(RecordKey::new("P", "02")));

        let next = store
            .query(RangeQuery::new("P").with_limit(3).starting_after(page.continuation))
            .await
            .unwrap();
        assert!(next.items.is_empty());
        assert!(next.continuation.is_none());
    }

    #[tokio::test]
    async fn test_short_page_has_no_continuation() {
        let store = seeded("P", 2).await;
        let page = store
            .query(RangeQuery::new("P").with_limit(5))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.continuation.is_none());
    }

    #[tokio::test]
    async fn test_descending_resumes_below_start() {
        let store = seeded("P", 5).await;
        let page = store
            .query(
                RangeQuery::new("P")
                    .descending()
                    .with_limit(2)
                    .starting_after(Some(RecordKey::new("P", "03"))),
            )
            .await
            .unwrap();

        let keys: Vec<_> = page.items.iter().map(|r| r.key.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["02", "01"]);
    }

    #[tokio::test]
    async fn test_partitions_do_not_bleed() {
        let store = seeded("P", 2).await;
        store.put(record("P2", "00")).await.unwrap();
        store.put(record("O", "99")).await.unwrap();

        let page = store.query(RangeQuery::new("P")).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|r| r.key.partition_key == "P"));
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_on_read() {
        let store = seeded("P", 1).await;
        store.set_fail_on_read(true).await;

        let err = store.query(RangeQuery::new("P")).await.unwrap_err();
        assert!(matches!(err, StorageError::BackendUnavailable(_)));

        store.set_fail_on_read(false).await;
        assert_eq!(store.query(RangeQuery::new("P")).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_write_leaves_table_untouched() {
        let store = MemoryStore::new();
        store.set_fail_on_write(true).await;

        assert!(store.put(record("P", "00")).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_fail_on_count_only_affects_count() {
        let store = seeded("P", 3).await;
        store.set_fail_on_count(true).await;

        assert!(store.count("P", SortCondition::All).await.is_err());
        assert_eq!(store.query(RangeQuery::new("P")).await.unwrap().items.len(), 3);
    }
}
