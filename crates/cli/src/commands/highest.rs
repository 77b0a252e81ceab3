// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;

use rowjournal_kernel::SequenceNr;
use rowjournal_node::storage::JournalStorage;

use super::open_storage;

pub async fn run(db: &Path, persistence_id: &str) -> anyhow::Result<SequenceNr> {
    let storage = open_storage(db).await?;
    let highest = storage.highest_sequence_nr(persistence_id).await?;
    println!("{persistence_id}: highest sequence_nr {highest}");
    Ok(highest)
}
