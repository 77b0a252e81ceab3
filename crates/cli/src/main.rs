// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use rowjournal_cli::commands::{self, append, highest, locate, replay, watermark};

#[derive(Parser)]
#[command(name = "rowjournal")]
#[command(about = "Inspect and poke at a rowjournal SQLite database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Physical layout the journal was written with.
#[derive(Args, Clone, Copy)]
struct Layout {
    /// Number of hash partitions
    #[arg(long)]
    partitions: Option<u32>,

    /// Sequence numbers per bucket (enables nested partitions)
    #[arg(long)]
    bucket_size: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the entries of one persistence id
    Replay {
        /// Path to the journal database
        #[arg(long, short)]
        db: PathBuf,

        /// Persistence id to replay
        id: String,

        /// First sequence number (inclusive)
        #[arg(long, default_value_t = 1)]
        from: i64,

        /// Last sequence number (inclusive)
        #[arg(long, default_value_t = i64::MAX)]
        to: i64,

        #[arg(long, default_value_t = 500)]
        page_size: usize,

        /// Stop after this many entries
        #[arg(long)]
        limit: Option<u64>,

        #[command(flatten)]
        layout: Layout,
    },
    /// Show the highest sequence number of a persistence id
    Highest {
        #[arg(long, short)]
        db: PathBuf,
        id: String,
    },
    /// Compute the gap-free watermark once
    Watermark {
        #[arg(long, short)]
        db: PathBuf,

        /// Treat any gap as a rolled-back write
        #[arg(long)]
        skip_gaps: bool,
    },
    /// Show which table holds a row
    Locate {
        id: String,

        #[arg(long, default_value_t = 1)]
        seq: i64,

        #[command(flatten)]
        layout: Layout,
    },
    /// Append one entry after the highest sequence number
    Append {
        #[arg(long, short)]
        db: PathBuf,
        id: String,
        payload: String,

        #[arg(long, default_value = "")]
        manifest: String,

        /// Tag to attach, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[command(flatten)]
        layout: Layout,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            db,
            id,
            from,
            to,
            page_size,
            limit,
            layout,
        } => {
            let args = replay::ReplayArgs {
                persistence_id: id,
                from,
                to,
                page_size,
                max_items: limit,
                partitioning: commands::strategy(layout.partitions, layout.bucket_size),
            };
            replay::run(&db, args).await.map(|_| ())
        }
        Commands::Highest { db, id } => highest::run(&db, &id).await.map(|_| ()),
        Commands::Watermark { db, skip_gaps } => watermark::run(&db, skip_gaps).await.map(|_| ()),
        Commands::Locate { id, seq, layout } => {
            locate::run(&id, seq, &commands::strategy(layout.partitions, layout.bucket_size)).map(|_| ())
        }
        Commands::Append {
            db,
            id,
            payload,
            manifest,
            tags,
            layout,
        } => {
            let args = append::AppendArgs {
                persistence_id: id,
                payload,
                manifest,
                tags,
                partitioning: commands::strategy(layout.partitions, layout.bucket_size),
            };
            append::run(&db, args).await.map(|_| ())
        }
    }
}
