// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelError;
use crate::types::{AtomicWrite, JournalEntry};

fn entry(pid: &str, seq: i64) -> JournalEntry {
    JournalEntry::new(pid, seq, vec![seq as u8])
}

#[test]
fn test_atomic_write_accepts_contiguous_run() {
    let write = AtomicWrite::new(vec![entry("p1", 4), entry("p1", 5), entry("p1", 6)]).unwrap();
    assert_eq!(write.persistence_id(), "p1");
    assert_eq!(write.lowest_sequence_nr(), 4);
    assert_eq!(write.highest_sequence_nr(), 6);
    assert_eq!(write.len(), 3);
}

#[test]
fn test_atomic_write_rejects_empty() {
    assert_eq!(AtomicWrite::new(Vec::new()), Err(KernelError::EmptyAtomicWrite));
}

#[test]
fn test_atomic_write_rejects_gap() {
    let res = AtomicWrite::new(vec![entry("p1", 1), entry("p1", 3)]);
    match res {
        Err(KernelError::NonContiguous { expected, found, .. }) => {
            assert_eq!(expected, 2);
            assert_eq!(found, 3);
        }
        other => panic!("Expected NonContiguous, got {:?}", other),
    }
}

#[test]
fn test_atomic_write_rejects_mixed_ids() {
    let res = AtomicWrite::new(vec![entry("p1", 1), entry("p2", 2)]);
    assert!(matches!(res, Err(KernelError::MixedPersistenceIds { .. })));
}

#[test]
fn test_atomic_write_rejects_non_positive_sequence() {
    assert_eq!(
        AtomicWrite::single(entry("p1", 0)),
        Err(KernelError::InvalidSequenceNr(0))
    );
    assert_eq!(
        AtomicWrite::single(entry("", 1)),
        Err(KernelError::EmptyPersistenceId)
    );
}

#[test]
fn test_atomic_write_at_sequence_ceiling() {
    let single = AtomicWrite::single(entry("p1", i64::MAX)).unwrap();
    assert_eq!(single.highest_sequence_nr(), i64::MAX);

    let pair = AtomicWrite::new(vec![entry("p1", i64::MAX - 1), entry("p1", i64::MAX)]).unwrap();
    assert_eq!(pair.lowest_sequence_nr(), i64::MAX - 1);

    let repeated = AtomicWrite::new(vec![entry("p1", i64::MAX), entry("p1", i64::MAX)]);
    assert!(matches!(repeated, Err(KernelError::NonContiguous { .. })));
}
