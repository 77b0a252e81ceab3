// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;

use rowjournal_kernel::{router_for, AtomicWrite, JournalEntry, PartitionStrategy};
use rowjournal_node::storage::{JournalStorage, MemoryStorage, PageQuery, PageSource, SqliteStorage};
use rowjournal_node::{Journal, JournalConfig, ReplayRequest};
use tempfile::tempdir;

const NESTED: PartitionStrategy = PartitionStrategy::NestedPartitions {
    partitions: 3,
    bucket_size: 4,
};

fn batch(pid: &str, seqs: std::ops::RangeInclusive<i64>) -> AtomicWrite {
    AtomicWrite::new(seqs.map(|s| JournalEntry::new(pid, s, vec![s as u8; 8])).collect()).unwrap()
}

async fn collect(journal: &Journal, request: ReplayRequest) -> (Vec<i64>, u64) {
    let mut cursor = journal.replay(request).unwrap();
    let mut seqs = Vec::new();
    while let Some(item) = cursor.next().await {
        seqs.push(item.unwrap().entry.sequence_nr);
    }
    (seqs, cursor.pages_fetched())
}

#[tokio::test]
async fn test_nested_replay_crosses_buckets() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::open(dir.path().join("nested.db"), 2).await.unwrap());
    let config = JournalConfig {
        partitioning: NESTED,
        ..JournalConfig::default()
    };
    let journal = Journal::with_storage(config, Arc::clone(&storage) as Arc<dyn JournalStorage>).unwrap();

    // 3..=6 straddles buckets 0 and 1 but is still one unit.
    let results = journal.write(vec![batch("acct-9", 1..=2), batch("acct-9", 3..=6), batch("acct-9", 7..=10)]).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let (seqs, pages) = collect(&journal, ReplayRequest::new("acct-9", 1, 10).with_page_size(3)).await;
    assert_eq!(seqs, (1..=10).collect::<Vec<_>>());
    // bucket 0: [1,2,3] [4]; bucket 1: [5,6,7] [8]; bucket 2: [9,10]
    assert_eq!(pages, 5);

    let (seqs, _) = collect(&journal, ReplayRequest::new("acct-9", 6, 9).with_page_size(100)).await;
    assert_eq!(seqs, vec![6, 7, 8, 9]);

    // Rows really live in their own bucket table.
    let router = router_for(&NESTED).unwrap();
    let target = router.locate("acct-9", 5);
    assert_eq!(target.bucket, Some(1));
    let rows = storage
        .fetch_page(PageQuery {
            target,
            persistence_id: "acct-9".into(),
            after_sequence_nr: 0,
            to_sequence_nr: 100,
            limit: 100,
        })
        .await
        .unwrap();
    assert_eq!(rows.iter().map(|r| r.sequence_nr).collect::<Vec<_>>(), vec![5, 6, 7, 8]);

    assert_eq!(journal.highest_sequence_nr("acct-9").await.unwrap(), 10);
    journal.shutdown().await;
}

#[tokio::test]
async fn test_nested_delete_touches_every_bucket() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::open(dir.path().join("nested.db"), 2).await.unwrap());
    let config = JournalConfig {
        partitioning: NESTED,
        ..JournalConfig::default()
    };
    let journal = Journal::with_storage(config, storage as Arc<dyn JournalStorage>).unwrap();
    journal.write(vec![batch("acct-1", 1..=9)]).await[0].as_ref().unwrap();

    assert_eq!(journal.delete_to("acct-1", 6).await.unwrap(), 6);
    let (seqs, _) = collect(&journal, ReplayRequest::new("acct-1", 1, 9).with_page_size(2)).await;
    assert_eq!(seqs, vec![7, 8, 9]);
    journal.shutdown().await;
}

#[tokio::test]
async fn test_partitioned_ids_spread_and_read_back() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::open(dir.path().join("hashed.db"), 4).await.unwrap());
    let strategy = PartitionStrategy::Partitioned { partitions: 8 };
    let config = JournalConfig {
        partitioning: strategy.clone(),
        ..JournalConfig::default()
    };
    let journal = Journal::with_storage(config, storage as Arc<dyn JournalStorage>).unwrap();

    let ids: Vec<String> = (0..32).map(|i| format!("device-{i}")).collect();
    let writes = ids.iter().map(|id| batch(id, 1..=3)).collect();
    assert!(journal.write(writes).await.iter().all(|r| r.is_ok()));

    let router = router_for(&strategy).unwrap();
    let used: std::collections::BTreeSet<_> = ids.iter().map(|id| router.locate(id, 1).table).collect();
    assert!(used.len() > 1);

    for id in &ids {
        let (seqs, _) = collect(&journal, ReplayRequest::new(id.clone(), 1, 3)).await;
        assert_eq!(seqs, vec![1, 2, 3], "replay of {id}");
    }
    journal.shutdown().await;
}

#[test]
fn test_locate_is_identical_across_router_instances() {
    let a = router_for(&NESTED).unwrap();
    let b = router_for(&NESTED).unwrap();
    for seq in [1, 4, 5, 9_999, 10_000] {
        assert_eq!(a.locate("user-42", seq), b.locate("user-42", seq));
    }
}

/// p: 1..=5 then 15..=20, q: 11..=12 only. With buckets of 4 that leaves an
/// empty bucket 9..=12 for p and empty leading buckets for q.
async fn write_with_holes(journal: &Journal) {
    let results = journal
        .write(vec![batch("p", 1..=5), batch("p", 15..=20), batch("q", 11..=12)])
        .await;
    assert!(results.iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn test_nested_replay_skips_sequence_holes() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::open(dir.path().join("holes.db"), 2).await.unwrap());
    let config = JournalConfig {
        partitioning: NESTED,
        ..JournalConfig::default()
    };
    let journal = Journal::with_storage(config, storage as Arc<dyn JournalStorage>).unwrap();
    write_with_holes(&journal).await;

    let (seqs, _) = collect(&journal, ReplayRequest::new("p", 1, 20).with_page_size(100)).await;
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 15, 16, 17, 18, 19, 20]);

    let (seqs, _) = collect(&journal, ReplayRequest::new("p", 1, 20).with_page_size(2)).await;
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 15, 16, 17, 18, 19, 20]);

    // Empty leading buckets.
    let (seqs, _) = collect(&journal, ReplayRequest::new("q", 1, 20).with_page_size(100)).await;
    assert_eq!(seqs, vec![11, 12]);

    // Starting inside an empty bucket.
    let (seqs, _) = collect(&journal, ReplayRequest::new("p", 10, i64::MAX).with_page_size(100)).await;
    assert_eq!(seqs, vec![15, 16, 17, 18, 19, 20]);
    journal.shutdown().await;
}

#[tokio::test]
async fn test_nested_replay_stops_at_highest_sequence_nr() {
    let storage = Arc::new(MemoryStorage::new());
    let config = JournalConfig {
        backend: "memory".into(),
        partitioning: PartitionStrategy::NestedPartitions {
            partitions: 1,
            bucket_size: 10,
        },
        ..JournalConfig::default()
    };
    let journal = Journal::with_storage(config, Arc::clone(&storage) as Arc<dyn JournalStorage>).unwrap();
    write_with_holes(&journal).await;

    let (seqs, pages) = collect(&journal, ReplayRequest::new("p", 1, i64::MAX).with_page_size(100)).await;
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 15, 16, 17, 18, 19, 20]);
    // bucket 0 (short, clipped) and bucket 1; nothing past 20 is fetched.
    assert_eq!(pages, 2);

    let (seqs, pages) = collect(&journal, ReplayRequest::new("q", 1, i64::MAX).with_page_size(100)).await;
    assert_eq!(seqs, vec![11, 12]);
    assert_eq!(pages, 2);

    let (seqs, pages) = collect(&journal, ReplayRequest::new("nobody", 1, i64::MAX)).await;
    assert!(seqs.is_empty());
    assert_eq!(pages, 0);
    assert_eq!(storage.page_fetches(), 4);
    journal.shutdown().await;
}
