// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Journal data model.

pub mod entry;
pub mod atomic;

pub use entry::JournalEntry;
pub use atomic::AtomicWrite;

/// Per-persistence-id position of an entry, starting at 1.
pub type SequenceNr = i64;

/// Globally unique, storage-assigned commit order. 0 means "not assigned".
pub type OrderingOffset = i64;
