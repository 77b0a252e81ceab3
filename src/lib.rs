// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! rowjournal-kernel: runtime-free core of the row journal.
//!
//! Holds the journal data model, the row codec that maps entries to storage
//! rows, and the partition routers that decide where a persistence id lives.
//! Nothing in here performs I/O; the async host lives in `rowjournal-node`.

pub mod config;
pub mod error;
pub mod types;
pub mod codec;
pub mod partition;

pub use error::{DecodeError, KernelError, Result};
pub use types::{AtomicWrite, JournalEntry, OrderingOffset, SequenceNr};
pub use codec::JournalRow;
pub use partition::{router_for, PartitionRouter, PartitionStrategy, Target};

#[cfg(test)]
mod tests;
