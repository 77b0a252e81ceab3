// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod append;
pub mod highest;
pub mod locate;
pub mod replay;
pub mod watermark;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rowjournal_kernel::PartitionStrategy;
use rowjournal_node::storage::{JournalStorage, SqliteStorage};
use rowjournal_node::{Journal, JournalConfig};

/// Strategy from the `--partitions` / `--bucket-size` flags.
pub fn strategy(partitions: Option<u32>, bucket_size: Option<i64>) -> PartitionStrategy {
    match (partitions, bucket_size) {
        (None, None) => PartitionStrategy::Plain,
        (Some(partitions), None) => PartitionStrategy::Partitioned { partitions },
        (partitions, Some(bucket_size)) => PartitionStrategy::NestedPartitions {
            partitions: partitions.unwrap_or(1),
            bucket_size,
        },
    }
}

pub(crate) async fn open_storage(db: &Path) -> anyhow::Result<Arc<SqliteStorage>> {
    if !db.exists() {
        anyhow::bail!("journal database {} does not exist", db.display());
    }
    let storage = SqliteStorage::open(db, 2)
        .await
        .with_context(|| format!("Failed to open journal at {}", db.display()))?;
    Ok(Arc::new(storage))
}

pub(crate) async fn open_journal(db: &Path, partitioning: PartitionStrategy, create: bool) -> anyhow::Result<Journal> {
    let storage = if create {
        Arc::new(
            SqliteStorage::open(db, 2)
                .await
                .with_context(|| format!("Failed to open journal at {}", db.display()))?,
        )
    } else {
        open_storage(db).await?
    };
    let config = JournalConfig {
        database_path: db.to_path_buf(),
        partitioning,
        ..JournalConfig::default()
    };
    Journal::with_storage(config, storage as Arc<dyn JournalStorage>).context("Invalid journal configuration")
}
