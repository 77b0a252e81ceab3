// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process backend.
//!
//! Offsets come from an atomic counter taken *before* the commit applies,
//! the way a database sequence hands out values to open transactions. Two
//! writers that commit out of allocation order therefore leave a temporary
//! gap; a writer that fails or aborts leaves a permanent one. That makes this
//! backend the reference for exercising the ordering tracker.
//!
//! [`MemoryStorage::reserve`] exposes the in-flight window explicitly.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rowjournal_kernel::{JournalRow, OrderingOffset, SequenceNr, Target};

use crate::errors::{JournalError, Result};
use crate::storage::{JournalStorage, OrderingSource, PageQuery, PageSource, RoutedWrite};

/// Failure injected into the next storage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    Transient,
    Fatal,
}

type Table = HashMap<String, BTreeMap<SequenceNr, JournalRow>>;

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Table>,
    committed: BTreeSet<OrderingOffset>,
    highest: HashMap<String, SequenceNr>,
}

#[derive(Default)]
pub struct MemoryStorage {
    last_offset: AtomicI64,
    state: RwLock<MemoryState>,
    faults: Mutex<VecDeque<StorageFault>>,
    page_fetches: AtomicU64,
}

/// An atomic write whose offsets are allocated but not yet visible.
///
/// Dropping it without [`commit`](PendingCommit::commit) aborts, leaving the
/// offsets permanently unused.
pub struct PendingCommit {
    storage: Arc<MemoryStorage>,
    write: Option<RoutedWrite>,
    offsets: Vec<OrderingOffset>,
}

impl PendingCommit {
    pub fn offsets(&self) -> &[OrderingOffset] {
        &self.offsets
    }

    pub fn commit(mut self) -> Result<Vec<OrderingOffset>> {
        let write = self
            .write
            .take()
            .ok_or_else(|| JournalError::storage("commit", "pending write already consumed"))?;
        let offsets = std::mem::take(&mut self.offsets);
        self.storage.apply(write, offsets)
    }

    pub fn abort(mut self) {
        if let Some(write) = self.write.take() {
            tracing::debug!("Aborted {} leaving offsets {:?} unused", write.describe(), self.offsets);
        }
    }
}

impl Drop for PendingCommit {
    fn drop(&mut self) {
        if let Some(write) = self.write.take() {
            tracing::debug!("Dropped uncommitted {}", write.describe());
        }
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next storage call fail with `fault`. Faults queue up.
    pub fn fail_next(&self, fault: StorageFault) {
        self.faults.lock().push_back(fault);
    }

    pub fn page_fetches(&self) -> u64 {
        self.page_fetches.load(Ordering::Relaxed)
    }

    pub fn committed_offsets(&self) -> Vec<OrderingOffset> {
        self.state.read().committed.iter().copied().collect()
    }

    /// Allocates offsets for `write` without making it visible.
    pub fn reserve(self: &Arc<Self>, write: RoutedWrite) -> Result<PendingCommit> {
        self.take_fault(&write.describe())?;
        let offsets = self.allocate(write.row_count());
        Ok(PendingCommit {
            storage: Arc::clone(self),
            write: Some(write),
            offsets,
        })
    }

    fn take_fault(&self, context: &str) -> Result<()> {
        match self.faults.lock().pop_front() {
            None => Ok(()),
            Some(StorageFault::Transient) => Err(JournalError::transient(context, "injected transient fault")),
            Some(StorageFault::Fatal) => Err(JournalError::storage(context, "injected fault")),
        }
    }

    fn allocate(&self, count: usize) -> Vec<OrderingOffset> {
        let count = count as i64;
        let last = self.last_offset.fetch_add(count, Ordering::SeqCst) + count;
        (last - count + 1..=last).collect()
    }

    fn apply(&self, write: RoutedWrite, offsets: Vec<OrderingOffset>) -> Result<Vec<OrderingOffset>> {
        let mut state = self.state.write();

        for (target, rows) in &write.groups {
            let existing = state
                .tables
                .get(&target.table)
                .and_then(|t| t.get(&write.persistence_id));
            if let Some(existing) = existing {
                if rows.iter().any(|r| existing.contains_key(&r.sequence_nr)) {
                    return Err(JournalError::Conflict {
                        persistence_id: write.persistence_id.clone(),
                        from: write.from_sequence_nr,
                        to: write.to_sequence_nr,
                    });
                }
            }
        }

        let mut next = offsets.iter().copied();
        for (target, rows) in write.groups {
            let stream = state
                .tables
                .entry(target.table)
                .or_default()
                .entry(write.persistence_id.clone())
                .or_default();
            for mut row in rows {
                row.ordering = next
                    .next()
                    .ok_or_else(|| JournalError::storage("commit", "offset count mismatch"))?;
                stream.insert(row.sequence_nr, row);
            }
        }
        state.committed.extend(offsets.iter().copied());
        let highest = state.highest.entry(write.persistence_id).or_insert(0);
        *highest = (*highest).max(write.to_sequence_nr);

        Ok(offsets)
    }
}

#[async_trait]
impl PageSource for MemoryStorage {
    async fn fetch_page(&self, query: PageQuery) -> Result<Vec<JournalRow>> {
        self.take_fault(&query.describe())?;
        self.page_fetches.fetch_add(1, Ordering::Relaxed);
        if query.to_sequence_nr <= query.after_sequence_nr {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let rows = state
            .tables
            .get(&query.target.table)
            .and_then(|t| t.get(&query.persistence_id))
            .map(|stream| {
                stream
                    .range(query.after_sequence_nr + 1..=query.to_sequence_nr)
                    .take(query.limit)
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn stream_upper_bound(&self, persistence_id: &str) -> Result<Option<SequenceNr>> {
        Ok(Some(self.state.read().highest.get(persistence_id).copied().unwrap_or(0)))
    }
}

#[async_trait]
impl OrderingSource for MemoryStorage {
    async fn max_ordering(&self) -> Result<OrderingOffset> {
        self.take_fault("max ordering")?;
        Ok(self.state.read().committed.last().copied().unwrap_or(0))
    }

    async fn first_gap(&self, after: OrderingOffset, up_to: OrderingOffset) -> Result<Option<OrderingOffset>> {
        self.take_fault("gap probe")?;
        if up_to <= after {
            return Ok(None);
        }
        let state = self.state.read();
        let mut expected = after + 1;
        for &offset in state.committed.range(after + 1..=up_to) {
            if offset != expected {
                return Ok(Some(expected));
            }
            expected += 1;
        }
        Ok((expected <= up_to).then_some(expected))
    }
}

#[async_trait]
impl JournalStorage for MemoryStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn commit_atomic(&self, write: RoutedWrite) -> Result<Vec<OrderingOffset>> {
        self.take_fault(&write.describe())?;
        let offsets = self.allocate(write.row_count());
        self.apply(write, offsets)
    }

    async fn highest_sequence_nr(&self, persistence_id: &str) -> Result<SequenceNr> {
        self.take_fault("highest sequence_nr")?;
        Ok(self.state.read().highest.get(persistence_id).copied().unwrap_or(0))
    }

    async fn mark_deleted(&self, persistence_id: &str, to_sequence_nr: SequenceNr, targets: Vec<Target>) -> Result<u64> {
        self.take_fault("mark deleted")?;
        let mut state = self.state.write();
        let mut touched = 0;
        for target in targets {
            let stream = state
                .tables
                .get_mut(&target.table)
                .and_then(|t| t.get_mut(persistence_id));
            if let Some(stream) = stream {
                for (_, row) in stream.range_mut(..=to_sequence_nr) {
                    if !row.deleted {
                        row.deleted = true;
                        touched += 1;
                    }
                }
            }
        }
        Ok(touched)
    }
}
