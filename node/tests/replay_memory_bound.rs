// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Replay must hold at most one page whatever the range.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use rowjournal_kernel::{codec, router_for, JournalEntry, JournalRow, PartitionStrategy};
use rowjournal_node::storage::{PageQuery, PageSource};
use rowjournal_node::{ReplayCursor, ReplayRequest, Result};

const TOTAL_ROWS: i64 = 1_000_000;

/// Generates rows on demand; nothing is stored.
struct SyntheticSource {
    template: JournalRow,
    fetches: AtomicU64,
    largest_page: AtomicU64,
}

impl SyntheticSource {
    fn new() -> Self {
        Self {
            template: codec::encode(&JournalEntry::new("sensor", 1, vec![0xAB; 64])).unwrap(),
            fetches: AtomicU64::new(0),
            largest_page: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PageSource for SyntheticSource {
    async fn fetch_page(&self, query: PageQuery) -> Result<Vec<JournalRow>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let upper = query.to_sequence_nr.min(TOTAL_ROWS);
        let rows: Vec<_> = (query.after_sequence_nr + 1..=upper)
            .take(query.limit)
            .map(|seq| {
                let mut row = self.template.clone();
                row.sequence_nr = seq;
                row.ordering = seq;
                row
            })
            .collect();
        self.largest_page.fetch_max(rows.len() as u64, Ordering::Relaxed);
        Ok(rows)
    }
}

#[tokio::test]
async fn test_million_row_replay_buffers_one_page() {
    let source = Arc::new(SyntheticSource::new());
    let router = router_for(&PartitionStrategy::Plain).unwrap();
    let mut cursor = ReplayCursor::new(
        Arc::clone(&source),
        router,
        ReplayRequest::new("sensor", 1, i64::MAX).with_page_size(100),
    )
    .unwrap();

    let mut expected = 1;
    while let Some(item) = cursor.next().await {
        let item = item.unwrap();
        assert_eq!(item.entry.sequence_nr, expected);
        expected += 1;
        assert!(cursor.high_water_mark() <= 100);
    }

    assert_eq!(expected - 1, TOTAL_ROWS);
    assert_eq!(cursor.delivered(), TOTAL_ROWS as u64);
    assert!(cursor.high_water_mark() <= 100);
    // 10_000 full pages, then one empty page ends the stream.
    assert_eq!(cursor.pages_fetched(), 10_001);
    assert_eq!(source.fetches.load(Ordering::Relaxed), 10_001);
    assert!(source.largest_page.load(Ordering::Relaxed) <= 100);
}

#[tokio::test]
async fn test_dropped_stream_stops_fetching() {
    let source = Arc::new(SyntheticSource::new());
    let router = router_for(&PartitionStrategy::Plain).unwrap();
    let cursor = ReplayCursor::new(
        Arc::clone(&source),
        router,
        ReplayRequest::new("sensor", 1, TOTAL_ROWS).with_page_size(50),
    )
    .unwrap();

    let taken: Vec<_> = cursor.into_stream().take(120).collect().await;
    assert_eq!(taken.len(), 120);
    // 120 elements need three pages of 50; the consumer stopped before a fourth.
    assert_eq!(source.fetches.load(Ordering::Relaxed), 3);
}
