// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use rowjournal_kernel::{PartitionStrategy, SequenceNr};
use rowjournal_node::{JournalError, ReplayRequest};

use super::open_journal;

pub struct ReplayArgs {
    pub persistence_id: String,
    pub from: SequenceNr,
    pub to: SequenceNr,
    pub page_size: usize,
    pub max_items: Option<u64>,
    pub partitioning: PartitionStrategy,
}

/// Prints the entries and returns how many were shown. Undecodable rows are
/// listed as errors and do not stop the listing.
pub async fn run(db: &Path, args: ReplayArgs) -> anyhow::Result<usize> {
    let journal = open_journal(db, args.partitioning, false).await?;

    let mut request = ReplayRequest::new(args.persistence_id.clone(), args.from, args.to).with_page_size(args.page_size);
    if let Some(max) = args.max_items {
        request = request.with_max_items(max);
    }
    let mut cursor = journal.replay(request)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Seq", "Ordering", "Manifest", "Writer", "Tags", "Payload"]);

    let mut shown = 0;
    let mut corrupt = 0;
    while let Some(item) = cursor.next().await {
        match item {
            Ok(replayed) => {
                let entry = replayed.entry;
                let tags: Vec<_> = entry.tags.into_iter().collect();
                table.add_row(vec![
                    replayed.delivery_seq_nr.to_string(),
                    entry.sequence_nr.to_string(),
                    entry.ordering.to_string(),
                    entry.manifest,
                    entry.writer_id,
                    tags.join(","),
                    preview(&entry.payload),
                ]);
                shown += 1;
            }
            Err(JournalError::Decode {
                sequence_nr, source, ..
            }) => {
                corrupt += 1;
                table.add_row(vec![
                    "-".to_string(),
                    sequence_nr.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    format!("<corrupt: {source}>"),
                ]);
            }
            Err(e) => {
                journal.shutdown().await;
                return Err(e.into());
            }
        }
    }

    println!("\nJournal of {}\n", args.persistence_id);
    println!("{table}\n");
    println!(
        "{} entries, {} corrupt, {} pages fetched",
        shown,
        corrupt,
        cursor.pages_fetched()
    );
    journal.shutdown().await;
    Ok(shown)
}

fn preview(payload: &[u8]) -> String {
    const MAX: usize = 48;
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().count() <= MAX => text.to_string(),
        Ok(text) => format!("{}…", text.chars().take(MAX).collect::<String>()),
        Err(_) => format!("<{} bytes>", payload.len()),
    }
}
