// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Journal facade.
//!
//! Wires one router, one storage backend and one tracker together. All three
//! are fixed for the lifetime of the value.

use std::sync::Arc;

use futures::Stream;
use rowjournal_kernel::{router_for, AtomicWrite, OrderingOffset, PartitionRouter, SequenceNr};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::config::JournalConfig;
use crate::errors::{JournalError, Result};
use crate::registry::StorageRegistry;
use crate::replay::{ReplayCursor, ReplayRequest, ReplayedEntry};
use crate::storage::JournalStorage;
use crate::tracker::{TrackerHandle, TrackerSupervisor};
use crate::write_path::{WritePath, WriteReceipt};

pub struct Journal {
    config: JournalConfig,
    router: Arc<dyn PartitionRouter>,
    storage: Arc<dyn JournalStorage>,
    writer: WritePath<dyn JournalStorage>,
    tracker: TrackerHandle,
}

impl Journal {
    /// Validates `config`, builds the configured backend and starts the tracker.
    pub async fn open(config: JournalConfig, registry: &StorageRegistry) -> Result<Self> {
        config.validate()?;
        let storage = registry.build(&config).await?;
        Self::with_storage(config, storage)
    }

    /// Uses an already constructed backend. Must be called inside a tokio runtime.
    pub fn with_storage(config: JournalConfig, storage: Arc<dyn JournalStorage>) -> Result<Self> {
        config.validate()?;
        let router = router_for(&config.partitioning).map_err(|e| JournalError::Config(e.to_string()))?;
        let writer = WritePath::new(Arc::clone(&router), Arc::clone(&storage));
        let tracker = TrackerSupervisor::spawn(Arc::clone(&storage), config.tracker.clone());

        tracing::info!(
            "Journal open: backend={} partitioning={:?} page_size={}",
            storage.backend(),
            router.strategy(),
            config.replay.page_size
        );
        Ok(Self {
            config,
            router,
            storage,
            writer,
            tracker,
        })
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<dyn PartitionRouter> {
        &self.router
    }

    pub fn storage(&self) -> &Arc<dyn JournalStorage> {
        &self.storage
    }

    pub async fn write(&self, writes: Vec<AtomicWrite>) -> Vec<Result<WriteReceipt>> {
        self.writer.write(writes).await
    }

    /// A request over `[from, to]` using the configured page size.
    pub fn replay_request(&self, persistence_id: impl Into<String>, from: SequenceNr, to: SequenceNr) -> ReplayRequest {
        ReplayRequest::new(persistence_id, from, to).with_page_size(self.config.replay.page_size)
    }

    pub fn replay(&self, request: ReplayRequest) -> Result<ReplayCursor<dyn JournalStorage>> {
        ReplayCursor::new(Arc::clone(&self.storage), Arc::clone(&self.router), request)
    }

    pub fn replay_stream(&self, request: ReplayRequest) -> Result<impl Stream<Item = Result<ReplayedEntry>> + Send> {
        Ok(self.replay(request)?.into_stream())
    }

    pub async fn highest_sequence_nr(&self, persistence_id: &str) -> Result<SequenceNr> {
        self.storage.highest_sequence_nr(persistence_id).await
    }

    /// Logically deletes every entry up to `to_sequence_nr`. The highest
    /// sequence number is kept, so new writes continue after it.
    pub async fn delete_to(&self, persistence_id: &str, to_sequence_nr: SequenceNr) -> Result<u64> {
        let highest = self.storage.highest_sequence_nr(persistence_id).await?;
        let to = to_sequence_nr.min(highest);
        if to < 1 {
            return Ok(0);
        }
        let targets = self.router.targets_between(persistence_id, 1, to);
        let touched = self.storage.mark_deleted(persistence_id, to, targets).await?;
        tracing::info!("Deleted {} entries of {} up to {}", touched, persistence_id, to);
        Ok(touched)
    }

    pub fn current_watermark(&self) -> OrderingOffset {
        self.tracker.current_watermark()
    }

    pub fn subscribe_watermark(&self) -> watch::Receiver<OrderingOffset> {
        self.tracker.subscribe()
    }

    pub fn watermark_stream(&self) -> WatchStream<OrderingOffset> {
        self.tracker.watermark_stream()
    }

    /// Stops the tracker. In-flight writes and replays owned by callers are unaffected.
    pub async fn shutdown(self) {
        let watermark = self.tracker.current_watermark();
        self.tracker.shutdown().await;
        tracing::info!("Journal closed at watermark {}", watermark);
    }
}
