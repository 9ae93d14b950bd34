use super::register_view;
use crate::storage::json::load_json_records;
use crate::storage::StorageManager;
use crate::utils::paths::{SONG_DATA_DIR, table_dataset_path};
use common::Result;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Derives the `songs` and `artists` dimension tables from the song
/// catalog. Every catalog record contributes to both projections; no
/// filtering is applied.
pub struct CatalogProcessor {
    ctx: Arc<SessionContext>,
    storage: Arc<StorageManager>,
}

impl CatalogProcessor {
    pub fn new(ctx: Arc<SessionContext>, storage: Arc<StorageManager>) -> Self {
        Self { ctx, storage }
    }

    pub async fn run(&self) -> Result<()> {
        let input = self.storage.input_location(SONG_DATA_DIR)?;
        let song_df = load_json_records(&self.ctx, &input).await?;

        let songs = Self::songs_table(&song_df)?;
        register_view(&self.ctx, "songs", &songs)?;
        let songs_out = self.storage.output_location(&table_dataset_path("songs"))?;
        self.storage
            .write_table(songs, &songs_out, &["s_year", "s_artist_id"])
            .await?;

        let artists = Self::artists_table(&song_df)?;
        register_view(&self.ctx, "artists", &artists)?;
        let artists_out = self
            .storage
            .output_location(&table_dataset_path("artists"))?;
        self.storage.write_table(artists, &artists_out, &[]).await?;

        info!("Catalog pipeline complete");
        Ok(())
    }

    /// Projects catalog records into the songs schema. Deduplication is on
    /// the full row, not just the song id.
    pub fn songs_table(song_df: &DataFrame) -> Result<DataFrame> {
        Ok(song_df
            .clone()
            .select(vec![
                col("song_id").alias("s_song_id"),
                col("title").alias("s_title"),
                col("artist_id").alias("s_artist_id"),
                col("year").alias("s_year"),
                col("duration").alias("s_duration"),
            ])?
            .distinct()?)
    }

    /// Projects catalog records into the artists schema, full-row
    /// deduplicated.
    pub fn artists_table(song_df: &DataFrame) -> Result<DataFrame> {
        Ok(song_df
            .clone()
            .select(vec![
                col("artist_id").alias("a_artist_id"),
                col("artist_name").alias("a_name"),
                col("artist_location").alias("a_location"),
                col("artist_latitude").alias("a_latitude"),
                col("artist_longitude").alias("a_longitude"),
            ])?
            .distinct()?)
    }
}
