// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Storage boundary
//!
//! The engine never talks to a driver directly. Replay needs pages, the
//! tracker needs the committed offset set, the write path needs a
//! transactional commit. Each concern is its own narrow trait so a component
//! can be driven by anything that satisfies just its part.
//!
//! # Contract every backend honours
//! - One [`RoutedWrite`] is one transaction: all rows visible or none.
//! - `(persistence_id, sequence_nr)` is unique; a duplicate is a
//!   [`JournalError::Conflict`](crate::errors::JournalError::Conflict).
//! - Offsets are assigned by storage at commit, globally unique and
//!   increasing in allocation order.
//! - Readers never observe part of a transaction.

pub mod memory;
pub mod pool;
pub mod sqlite;

use async_trait::async_trait;
use rowjournal_kernel::{JournalRow, OrderingOffset, SequenceNr, Target};

use crate::errors::Result;

pub use memory::{MemoryStorage, PendingCommit, StorageFault};
pub use sqlite::SqliteStorage;

/// One bounded page request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    pub target: Target,
    pub persistence_id: String,
    /// Exclusive lower bound.
    pub after_sequence_nr: SequenceNr,
    /// Inclusive upper bound.
    pub to_sequence_nr: SequenceNr,
    pub limit: usize,
}

impl PageQuery {
    pub fn describe(&self) -> String {
        format!(
            "fetch page {} ({}..={}] from {}",
            self.persistence_id, self.after_sequence_nr, self.to_sequence_nr, self.target.table
        )
    }
}

/// An atomic write after routing and encoding, grouped by physical target.
#[derive(Clone, Debug)]
pub struct RoutedWrite {
    pub persistence_id: String,
    pub from_sequence_nr: SequenceNr,
    pub to_sequence_nr: SequenceNr,
    pub groups: Vec<(Target, Vec<JournalRow>)>,
}

impl RoutedWrite {
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn describe(&self) -> String {
        format!(
            "commit {} [{}..={}]",
            self.persistence_id, self.from_sequence_nr, self.to_sequence_nr
        )
    }
}

#[async_trait]
pub trait PageSource: Send + Sync {
    /// Rows of `query.persistence_id` in `(after, to]`, ascending, at most
    /// `limit`. Logically deleted rows are returned with `deleted = true`.
    async fn fetch_page(&self, query: PageQuery) -> Result<Vec<JournalRow>>;

    /// Highest sequence number stored for `persistence_id`, if the source
    /// knows it. Replay over bucketed layouts stops walking buckets there.
    async fn stream_upper_bound(&self, persistence_id: &str) -> Result<Option<SequenceNr>> {
        let _ = persistence_id;
        Ok(None)
    }
}

#[async_trait]
pub trait OrderingSource: Send + Sync {
    /// Highest committed offset, 0 when the journal is empty.
    async fn max_ordering(&self) -> Result<OrderingOffset>;

    /// Lowest offset in `(after, up_to]` with no committed row.
    async fn first_gap(&self, after: OrderingOffset, up_to: OrderingOffset) -> Result<Option<OrderingOffset>>;
}

#[async_trait]
pub trait JournalStorage: PageSource + OrderingSource {
    fn backend(&self) -> &'static str;

    /// Commits one atomic write. Returns the assigned offsets in row order.
    async fn commit_atomic(&self, write: RoutedWrite) -> Result<Vec<OrderingOffset>>;

    /// Highest sequence number ever written, deleted rows included. 0 if none.
    async fn highest_sequence_nr(&self, persistence_id: &str) -> Result<SequenceNr>;

    /// Marks rows `<= to_sequence_nr` as deleted in `targets`. Returns rows touched.
    async fn mark_deleted(&self, persistence_id: &str, to_sequence_nr: SequenceNr, targets: Vec<Target>) -> Result<u64>;
}
