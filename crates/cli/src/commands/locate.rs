// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use rowjournal_kernel::{router_for, PartitionStrategy, SequenceNr, Target};

pub fn run(persistence_id: &str, sequence_nr: SequenceNr, strategy: &PartitionStrategy) -> anyhow::Result<Target> {
    let router = router_for(strategy)?;
    let target = router.locate(persistence_id, sequence_nr);
    let (start, end) = router.span(sequence_nr);
    println!("{persistence_id} #{sequence_nr} -> {}", target.table);
    if end != SequenceNr::MAX {
        println!("  shares the table with sequence_nr {start}..={end}");
    }
    Ok(target)
}
