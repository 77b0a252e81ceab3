// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("Atomic write contains no entries")]
    EmptyAtomicWrite,

    #[error("Atomic write mixes persistence ids: expected {expected}, found {found}")]
    MixedPersistenceIds { expected: String, found: String },

    #[error("Sequence numbers not contiguous in {persistence_id}: expected {expected}, found {found}")]
    NonContiguous {
        persistence_id: String,
        expected: i64,
        found: i64,
    },

    #[error("Invalid sequence number {0}: must be >= 1")]
    InvalidSequenceNr(i64),

    #[error("Persistence id must not be empty")]
    EmptyPersistenceId,

    #[error("Invalid partitioning: {0}")]
    InvalidPartitioning(String),

    #[error("Tag encoding failed: {0}")]
    TagEncoding(String),
}

/// Failure to turn a stored row back into a journal entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Checksum mismatch: expected {expected:#018x}, found {found:#018x}")]
    ChecksumMismatch { expected: u64, found: u64 },

    #[error("Invalid tags column: {0}")]
    InvalidTags(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
