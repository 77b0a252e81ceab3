// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Write Path
//!
//! Each [`AtomicWrite`] is routed row by row, encoded, and handed to storage
//! as one transaction. A call carrying several units reports one outcome per
//! unit:
//!
//! ```text
//! write([u1(p1), u2(p2), u3(p1)])
//!   ├─ p1: u1 ─▶ u3   (sequential, input order)
//!   └─ p2: u2         (concurrent with p1)
//! => [r1, r2, r3]
//! ```
//!
//! A failed unit does not stop later units, even of the same persistence id.
//! Nothing here retries; [`JournalError::is_retryable`] tells the caller
//! whether trying again can help.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rowjournal_kernel::{codec, AtomicWrite, OrderingOffset, PartitionRouter, SequenceNr, Target};

use crate::errors::{JournalError, Result};
use crate::storage::{JournalStorage, RoutedWrite};
use crate::telemetry::{ATOMIC_WRITES_TOTAL, WRITE_DURATION_SECONDS, WRITE_FAILURES_TOTAL};

/// Per-unit success value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub persistence_id: String,
    pub from_sequence_nr: SequenceNr,
    pub to_sequence_nr: SequenceNr,
    pub orderings: Vec<OrderingOffset>,
}

pub struct WritePath<S: JournalStorage + ?Sized> {
    router: Arc<dyn PartitionRouter>,
    storage: Arc<S>,
}

impl<S: JournalStorage + ?Sized> Clone for WritePath<S> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: JournalStorage + ?Sized> WritePath<S> {
    pub fn new(router: Arc<dyn PartitionRouter>, storage: Arc<S>) -> Self {
        Self { router, storage }
    }

    /// Routes and encodes a unit. Consecutive rows with the same target share a group.
    pub fn route(&self, write: AtomicWrite) -> Result<RoutedWrite> {
        let persistence_id = write.persistence_id().to_string();
        let from_sequence_nr = write.lowest_sequence_nr();
        let to_sequence_nr = write.highest_sequence_nr();

        let mut groups: Vec<(Target, Vec<_>)> = Vec::new();
        for entry in write.into_entries() {
            let target = self.router.locate(&entry.persistence_id, entry.sequence_nr);
            let row = codec::encode_owned(entry)?;
            match groups.last_mut() {
                Some((last, rows)) if *last == target => rows.push(row),
                _ => groups.push((target, vec![row])),
            }
        }

        Ok(RoutedWrite {
            persistence_id,
            from_sequence_nr,
            to_sequence_nr,
            groups,
        })
    }

    /// Commits a single unit.
    pub async fn write_one(&self, write: AtomicWrite) -> Result<WriteReceipt> {
        let started = Instant::now();
        let routed = self.route(write)?;
        let persistence_id = routed.persistence_id.clone();
        let (from, to) = (routed.from_sequence_nr, routed.to_sequence_nr);

        match self.storage.commit_atomic(routed).await {
            Ok(orderings) => {
                metrics::counter!(ATOMIC_WRITES_TOTAL, 1);
                metrics::histogram!(WRITE_DURATION_SECONDS, started.elapsed().as_secs_f64());
                tracing::trace!("Committed {} [{}..={}] at {:?}", persistence_id, from, to, orderings);
                Ok(WriteReceipt {
                    persistence_id,
                    from_sequence_nr: from,
                    to_sequence_nr: to,
                    orderings,
                })
            }
            Err(e) => {
                metrics::counter!(WRITE_FAILURES_TOTAL, 1, "kind" => e.kind());
                if e.is_conflict() {
                    tracing::warn!("Write conflict for {} [{}..={}]", persistence_id, from, to);
                } else {
                    tracing::error!("Write failed for {} [{}..={}]: {}", persistence_id, from, to, e);
                }
                Err(e)
            }
        }
    }

    /// Commits every unit independently; outcomes are in input order.
    pub async fn write(&self, writes: Vec<AtomicWrite>) -> Vec<Result<WriteReceipt>> {
        let total = writes.len();
        let mut groups: Vec<Vec<(usize, AtomicWrite)>> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();
        for (idx, write) in writes.into_iter().enumerate() {
            let slot = *group_of
                .entry(write.persistence_id().to_string())
                .or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
            groups[slot].push((idx, write));
        }

        let runs = groups.into_iter().map(|units| {
            let this = self.clone();
            async move {
                let mut outcomes = Vec::with_capacity(units.len());
                for (idx, unit) in units {
                    outcomes.push((idx, this.write_one(unit).await));
                }
                outcomes
            }
        });

        let mut results: Vec<Option<Result<WriteReceipt>>> = (0..total).map(|_| None).collect();
        for (idx, outcome) in join_all(runs).await.into_iter().flatten() {
            results[idx] = Some(outcome);
        }
        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(JournalError::storage("write", "unit produced no outcome"))))
            .collect()
    }
}
