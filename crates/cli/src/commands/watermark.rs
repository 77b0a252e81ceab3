// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;
use std::sync::Arc;

use rowjournal_kernel::OrderingOffset;
use rowjournal_node::storage::OrderingSource;
use rowjournal_node::tracker::OrderingTracker;
use rowjournal_node::{TrackerState, Watermark};

use super::open_storage;

/// One tracker pass over the database, starting from nothing.
///
/// With `skip_gaps` a gap is treated as permanent right away.
pub async fn run(db: &Path, skip_gaps: bool) -> anyhow::Result<OrderingOffset> {
    let storage = open_storage(db).await?;
    let max = storage.max_ordering().await?;

    let wait_cycles = if skip_gaps { 0 } else { u32::MAX };
    let mut tracker = OrderingTracker::new(storage, Arc::new(Watermark::new()), wait_cycles);
    let state = tracker.poll_once().await?;
    let watermark = tracker.watermark().current();

    println!("max committed offset: {max}");
    println!("watermark:            {watermark}");
    if let TrackerState::GapWait { gap, horizon, .. } = state {
        println!("first gap at {gap} (horizon {horizon}); rerun with --skip-gaps to treat it as rolled back");
    }
    Ok(watermark)
}
