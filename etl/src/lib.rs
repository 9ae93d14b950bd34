pub mod models;
pub mod processor;
pub mod storage;
pub mod utils;


use common::Result;
use common::config::Settings;
use processor::EtlProcessor;
use tracing::info;

/// Runs the complete pipeline: song catalog first, activity logs second.
/// The order is the one hard constraint in the system — the fact-table
/// stage re-reads the persisted songs table instead of reusing the
/// in-memory frame, so the catalog write must be durable before it runs.
///
/// Multi-table output is not atomic: a failure partway through leaves the
/// tables written so far overwritten and the remainder stale. Concurrent
/// runs against the same output root are not supported.
pub async fn run_etl_pipeline(config_path: &str) -> Result<()> {
    let settings = Settings::new(config_path)?;
    let processor = EtlProcessor::new(&settings)?;

    processor.process_song_data().await?;
    processor.process_log_data().await?;

    info!("ETL run complete");
    Ok(())
}
