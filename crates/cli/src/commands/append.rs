// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;

use anyhow::Context;
use rowjournal_kernel::{AtomicWrite, JournalEntry, PartitionStrategy};
use rowjournal_node::WriteReceipt;

use super::open_journal;

pub struct AppendArgs {
    pub persistence_id: String,
    pub payload: String,
    pub manifest: String,
    pub tags: Vec<String>,
    pub partitioning: PartitionStrategy,
}

/// Appends one entry after the current highest sequence number.
pub async fn run(db: &Path, args: AppendArgs) -> anyhow::Result<WriteReceipt> {
    let journal = open_journal(db, args.partitioning, true).await?;
    let next = journal.highest_sequence_nr(&args.persistence_id).await? + 1;

    let mut entry = JournalEntry::new(args.persistence_id.clone(), next, args.payload.into_bytes())
        .with_manifest(args.manifest)
        .with_writer("rowjournal-cli");
    for tag in args.tags {
        entry = entry.with_tag(tag);
    }
    let write = AtomicWrite::single(entry)?;

    let outcome = journal.write(vec![write]).await.pop().context("write returned no outcome")?;
    journal.shutdown().await;
    let receipt = outcome.with_context(|| format!("Failed to append to {}", args.persistence_id))?;

    println!(
        "Appended {} #{} at ordering {:?}",
        receipt.persistence_id, receipt.to_sequence_nr, receipt.orderings
    );
    Ok(receipt)
}
