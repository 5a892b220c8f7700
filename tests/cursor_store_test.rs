//! Cursor flush boundaries against a real SQLite repository.

use std::sync::Arc;

use proptest::prelude::*;
use questline::adapters::sqlite::{create_migrated_test_pool, SqliteCursorRepository};
use questline::domain::ports::CursorRepository;
use questline::services::CursorStore;

async fn repo() -> Arc<SqliteCursorRepository> {
    Arc::new(SqliteCursorRepository::new(create_migrated_test_pool().await.unwrap()))
}

#[tokio::test]
async fn test_finalize_persists_exact_last_position() {
    let repo = repo().await;
    let mut cursor = CursorStore::new(repo.clone(), "firehose", 100);
    for seq in 1_000..1_042 {
        cursor.advance(seq, false).await.unwrap();
    }
    assert!(repo.load("firehose").await.unwrap().is_none());

    cursor.finalize().await.unwrap();
    let record = repo.load("firehose").await.unwrap().unwrap();
    assert_eq!(record.position, 1_041);
    assert_eq!(record.events_processed, 42);
}

#[tokio::test]
async fn test_services_are_independent() {
    let repo = repo().await;
    let mut firehose = CursorStore::new(repo.clone(), "firehose", 1);
    let mut jetstream = CursorStore::new(repo.clone(), "jetstream", 1);
    firehose.advance(7, false).await.unwrap();
    jetstream.advance(1_700_000_000_000_000, false).await.unwrap();

    assert_eq!(repo.load("firehose").await.unwrap().unwrap().position, 7);
    assert_eq!(repo.load("jetstream").await.unwrap().unwrap().position, 1_700_000_000_000_000);
    assert_eq!(repo.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_recorded_error_keeps_position() {
    let repo = repo().await;
    let mut cursor = CursorStore::new(repo.clone(), "jetstream", 1);
    cursor.advance(55, false).await.unwrap();
    cursor.record_error("connection reset").await.unwrap();

    let record = repo.load("jetstream").await.unwrap().unwrap();
    assert_eq!(record.position, 55);
    assert_eq!(record.last_error.as_deref(), Some("connection reset"));
    assert!(record.last_error_at.is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After n advances with flush interval k, the stored position is the
    /// position of advance floor(n/k)*k; finalize stores the last one.
    #[test]
    fn prop_flush_boundaries(n in 1usize..40, k in 1u64..8) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (stored, finalized) = rt.block_on(async {
            let repo = repo().await;
            let mut cursor = CursorStore::new(repo.clone(), "firehose", k);
            for i in 1..=n {
                cursor.advance(i as i64 * 10, false).await.unwrap();
            }
            let stored = repo.load("firehose").await.unwrap().map(|r| r.position);
            cursor.finalize().await.unwrap();
            let finalized = repo.load("firehose").await.unwrap().map(|r| (r.position, r.events_processed));
            (stored, finalized)
        });

        let flushed = (n as u64 / k) * k;
        let expected = (flushed > 0).then(|| flushed as i64 * 10);
        prop_assert_eq!(stored, expected);
        prop_assert_eq!(finalized, Some((n as i64 * 10, n as i64)));
    }
}
