// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::{KernelError, Result};

use super::{JournalEntry, SequenceNr};

/// Transactional unit of the write path.
///
/// Only constructed through [`AtomicWrite::new`], so every value holds a
/// non-empty run of entries for a single persistence id whose sequence
/// numbers increase by exactly one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtomicWrite {
    entries: Vec<JournalEntry>,
}

impl AtomicWrite {
    pub fn new(entries: Vec<JournalEntry>) -> Result<Self> {
        let first = entries.first().ok_or(KernelError::EmptyAtomicWrite)?;
        if first.persistence_id.is_empty() {
            return Err(KernelError::EmptyPersistenceId);
        }
        if first.sequence_nr < 1 {
            return Err(KernelError::InvalidSequenceNr(first.sequence_nr));
        }

        for pair in entries.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.persistence_id != first.persistence_id {
                return Err(KernelError::MixedPersistenceIds {
                    expected: first.persistence_id.clone(),
                    found: next.persistence_id.clone(),
                });
            }
            if prev.sequence_nr.checked_add(1) != Some(next.sequence_nr) {
                return Err(KernelError::NonContiguous {
                    persistence_id: first.persistence_id.clone(),
                    expected: prev.sequence_nr.saturating_add(1),
                    found: next.sequence_nr,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Single-entry unit, the common case for actors persisting one event.
    pub fn single(entry: JournalEntry) -> Result<Self> {
        Self::new(vec![entry])
    }

    pub fn persistence_id(&self) -> &str {
        &self.entries[0].persistence_id
    }

    pub fn lowest_sequence_nr(&self) -> SequenceNr {
        self.entries[0].sequence_nr
    }

    pub fn highest_sequence_nr(&self) -> SequenceNr {
        self.entries[self.entries.len() - 1].sequence_nr
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<JournalEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed value.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
