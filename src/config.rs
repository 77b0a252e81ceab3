// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Rows fetched per replay page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Tracker polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Poll cycles a gap may stay open before it is declared permanently skipped.
pub const DEFAULT_MAX_GAP_WAIT_CYCLES: u32 = 50;

/// First backoff after a failed tracker query, in milliseconds.
pub const DEFAULT_FAILURE_BACKOFF_MS: u64 = 500;

/// Upper bound for the doubling tracker backoff, in milliseconds.
pub const DEFAULT_MAX_FAILURE_BACKOFF_MS: u64 = 10_000;

/// Connections kept by the SQLite pool.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Sequence numbers per inner bucket for nested partitions.
pub const DEFAULT_BUCKET_SIZE: i64 = 10_000;

/// Base name of every physical journal table.
pub const JOURNAL_TABLE: &str = "journal";
