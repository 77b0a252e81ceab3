// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! rowjournal-node: async host for the row journal.
//!
//! Storage backends, the write path, paged replay and the gapless ordering
//! tracker, tied together by [`Journal`].
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod storage;
pub mod write_path;
pub mod replay;
pub mod tracker;
pub mod registry;
pub mod journal;

pub use config::{JournalConfig, ReplayConfig, TrackerConfig};
pub use errors::{JournalError, Result};
pub use journal::Journal;
pub use registry::StorageRegistry;
pub use replay::{ReplayCursor, ReplayRequest, ReplayedEntry};
pub use tracker::{TrackerHandle, TrackerState, TrackerSupervisor, Watermark};
pub use write_path::{WritePath, WriteReceipt};
