// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use rowjournal_node::telemetry::init_telemetry;
use rowjournal_node::{Journal, JournalConfig, StorageRegistry};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("rowjournal-node: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> rowjournal_node::Result<()> {
    // Config file as the only argument, ROWJOURNAL_* variables on top.
    let cfg = match std::env::args().nth(1) {
        Some(path) => JournalConfig::from_json_file(path)?,
        None => JournalConfig::default(),
    }
    .from_env_overrides()?;

    init_telemetry(cfg.metrics_addr)?;
    tracing::info!("Starting rowjournal node with config: {:?}", cfg);

    let journal = Journal::open(cfg, &StorageRegistry::with_defaults()).await?;

    let mut watermarks = journal.watermark_stream();
    let reporter = tokio::spawn(async move {
        while let Some(watermark) = watermarks.next().await {
            tracing::debug!("Watermark now {}", watermark);
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");

    journal.shutdown().await;
    reporter.abort();
    Ok(())
}
