//! Cursor pagination integration tests.
//!
//! Run with: cargo test --test pagination
//!
//! Drives the paginator and the services through the public API against the
//! in-memory store.

use std::sync::Arc;

use serde_json::json;

use fraud_desk::keys::{
    build_list_partition_key, list_sort_key, time_range_sort_bounds, EntityIds, HierarchyLevel,
};
use fraud_desk::pagination::{PageRequest, Paginator};
use fraud_desk::services::{ListScope, ListService};
use fraud_desk::storage::{Attributes, MemoryStore, Record, RecordKey, RecordStore, SortCondition};
use fraud_desk::Error;

const BASE_TS: i64 = 1_700_000_000;

/// `count` records under EVALUATED, one second apart; odd ones are flagged.
async fn seeded(count: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..count {
        let mut attributes = Attributes::new();
        attributes.insert("flagged".to_string(), json!(i % 2 == 1));
        store
            .put(Record::new(
                RecordKey::new("EVALUATED", sort_key(i)),
                attributes,
            ))
            .await
            .unwrap();
    }
    store
}

fn sort_key(i: usize) -> String {
    format!("{}_T{:03}", BASE_TS + i as i64, i)
}

fn flagged(record: &Record) -> bool {
    record.get("flagged") == Some(&json!(true))
}

/// Follow tokens to the end, returning every page's sort keys.
async fn walk(
    paginator: &Paginator,
    per_page: usize,
    filter: Option<fn(&Record) -> bool>,
) -> Vec<Vec<String>> {
    let mut pages = Vec::new();
    let mut token = None;
    loop {
        let request = PageRequest::new("EVALUATED", SortCondition::All)
            .with_per_page(per_page)
            .with_token(token.take());
        let page = match filter {
            Some(f) => paginator.fetch_page(&request, f).await.unwrap(),
            None => paginator.fetch_unfiltered(&request).await.unwrap(),
        };
        pages.push(page.items.iter().map(|r| r.key.sort_key.clone()).collect());
        match page.next_token {
            Some(next) => token = Some(next),
            None => return pages,
        }
    }
}

mod exhaustiveness_tests {
    use super::*;

    #[tokio::test]
    async fn test_every_record_once_newest_first() {
        const N: usize = 12;
        let store = seeded(N).await;
        let paginator = Paginator::new(store);
        let expected: Vec<String> = (0..N).rev().map(sort_key).collect();

        for per_page in [1, 5, N, N + 1] {
            let pages = walk(&paginator, per_page, None).await;
            assert_eq!(pages.len(), N.div_ceil(per_page), "per_page {}", per_page);
            assert!(pages.iter().all(|p| p.len() <= per_page));
            assert_eq!(pages.concat(), expected, "per_page {}", per_page);
        }
    }

    #[tokio::test]
    async fn test_filtered_pages_are_never_empty() {
        const N: usize = 25;
        let store = seeded(N).await;
        let paginator = Paginator::new(store);
        let expected: Vec<String> = (0..N).rev().filter(|i| i % 2 == 1).map(sort_key).collect();

        for per_page in [1, 3, 5, expected.len(), expected.len() + 1] {
            let pages = walk(&paginator, per_page, Some(flagged)).await;
            assert!(pages.iter().all(|p| !p.is_empty()), "per_page {}", per_page);
            assert_eq!(pages.concat(), expected, "per_page {}", per_page);
        }
    }

    #[tokio::test]
    async fn test_empty_partition_is_one_empty_page() {
        let paginator = Paginator::new(Arc::new(MemoryStore::new()));
        let pages = walk(&paginator, 5, None).await;
        assert_eq!(pages, vec![Vec::<String>::new()]);
    }
}

mod replay_tests {
    use super::*;

    #[tokio::test]
    async fn test_same_token_same_page() {
        let store = seeded(10).await;
        let paginator = Paginator::new(store.clone());
        let first = paginator
            .fetch_unfiltered(&PageRequest::new("EVALUATED", SortCondition::All).with_per_page(4))
            .await
            .unwrap();
        let request = PageRequest::new("EVALUATED", SortCondition::All).with_token(first.next_token);

        let a = paginator.fetch_unfiltered(&request).await.unwrap();
        let b = paginator.fetch_unfiltered(&request).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.current_page, 2);
        assert_eq!(a.total_records, Some(10));
    }

    #[tokio::test]
    async fn test_retry_after_backend_failure() {
        let store = seeded(10).await;
        let paginator = Paginator::new(store.clone());
        let first = paginator
            .fetch_unfiltered(&PageRequest::new("EVALUATED", SortCondition::All).with_per_page(4))
            .await
            .unwrap();
        let request = PageRequest::new("EVALUATED", SortCondition::All).with_token(first.next_token);

        store.set_fail_on_read(true).await;
        let err = paginator.fetch_unfiltered(&request).await.unwrap_err();
        assert!(err.is_retryable());

        store.set_fail_on_read(false).await;
        let retried = paginator.fetch_unfiltered(&request).await.unwrap();
        let keys: Vec<_> = retried.items.iter().map(|r| r.key.sort_key.clone()).collect();
        assert_eq!(keys, (2..6).rev().map(sort_key).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_garbage_token_is_a_client_error() {
        let paginator = Paginator::new(seeded(3).await);
        let request = PageRequest::new("EVALUATED", SortCondition::All)
            .with_token(Some("not-a-token".to_string()));
        let err = paginator.fetch_unfiltered(&request).await.unwrap_err();
        assert!(matches!(err, Error::Token(_)));
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
    }
}

mod key_scenario_tests {
    use super::*;

    async fn range(store: &MemoryStore, lower: String, upper: String) -> Vec<String> {
        store
            .query(
                fraud_desk::storage::RangeQuery::new("EVALUATED")
                    .with_condition(SortCondition::Between(lower, upper)),
            )
            .await
            .unwrap()
            .items
            .into_iter()
            .map(|r| r.key.sort_key)
            .collect()
    }

    #[tokio::test]
    async fn test_evaluated_time_range() {
        let store = MemoryStore::new();
        for sort_key in ["1700000000_a", "1700000050_b", "1700000100_c"] {
            store
                .put(Record::new(RecordKey::new("EVALUATED", sort_key), Attributes::new()))
                .await
                .unwrap();
        }

        let (lower, upper) = time_range_sort_bounds(1_700_000_000, 1_700_000_100).unwrap();
        assert_eq!((lower.as_str(), upper.as_str()), ("1700000000_", "1700000100_z"));
        assert_eq!(
            range(&store, lower, upper).await,
            vec!["1700000000_a", "1700000050_b", "1700000100_c"]
        );

        let (lower, upper) = time_range_sort_bounds(1_700_000_000, 1_700_000_050).unwrap();
        assert_eq!(
            range(&store, lower, upper).await,
            vec!["1700000000_a", "1700000050_b"]
        );
    }

    #[tokio::test]
    async fn test_blacklisted_merchant() {
        let ids = EntityIds::account("A1")
            .with_processor("P1")
            .with_merchant("M1");
        assert_eq!(
            build_list_partition_key("BLACKLIST", "Web", HierarchyLevel::Merchant),
            "BLACKLIST-web-MERCHANT"
        );
        assert_eq!(list_sort_key(HierarchyLevel::Merchant, &ids).unwrap(), "P1__M1");

        let store = Arc::new(MemoryStore::new());
        let lists = ListService::new(store.clone());
        let scope = ListScope::new("BLACKLIST", "Web", HierarchyLevel::Merchant).unwrap();
        lists.add_member(&scope, &ids).await.unwrap();

        let stored = store
            .get(&RecordKey::new("BLACKLIST-web-MERCHANT", "P1__M1"))
            .await
            .unwrap();
        assert!(stored.is_some());
        let members = lists.list_members(&scope).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member_key, "P1__M1");
    }
}
