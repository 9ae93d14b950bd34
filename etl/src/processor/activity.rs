use super::register_view;
use super::udf::TimeUdfs;
use crate::models::schema::{songplays_schema, songs_partition_cols};
use crate::storage::StorageManager;
use crate::storage::json::load_json_records;
use crate::utils::arrow::attach_row_ids;
use crate::utils::paths::{LOG_DATA_DIR, table_dataset_path};
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::common::JoinType;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Derives the `users` and `time` dimension tables and the `songplays`
/// fact table from the activity logs. Only `page == "NextSong"` records
/// represent plays; everything downstream starts from that filter.
pub struct ActivityProcessor {
    ctx: Arc<SessionContext>,
    storage: Arc<StorageManager>,
    udfs: Arc<TimeUdfs>,
}

impl ActivityProcessor {
    pub fn new(
        ctx: Arc<SessionContext>,
        storage: Arc<StorageManager>,
        udfs: Arc<TimeUdfs>,
    ) -> Self {
        Self { ctx, storage, udfs }
    }

    pub async fn run(&self) -> Result<()> {
        let input = self.storage.input_location(LOG_DATA_DIR)?;
        let log_df = load_json_records(&self.ctx, &input).await?;
        let log_df = Self::filter_song_plays(log_df)?;

        let users = Self::users_table(&log_df)?;
        register_view(&self.ctx, "users", &users)?;
        let users_out = self.storage.output_location(&table_dataset_path("users"))?;
        self.storage.write_table(users, &users_out, &[]).await?;

        let time = Self::time_table(&self.udfs, &log_df)?;
        register_view(&self.ctx, "time", &time)?;
        let time_out = self.storage.output_location(&table_dataset_path("time"))?;
        self.storage
            .write_table(time, &time_out, &["t_year", "t_month"])
            .await?;

        let songplays = self.songplays_table(&log_df).await?;
        register_view(&self.ctx, "songplays", &songplays)?;
        let songplays_out = self
            .storage
            .output_location(&table_dataset_path("songplays"))?;
        self.storage
            .write_table(songplays, &songplays_out, &["sp_year", "sp_month"])
            .await?;

        info!("Activity pipeline complete");
        Ok(())
    }

    /// Keeps only the activity records that represent song plays.
    pub fn filter_song_plays(log_df: DataFrame) -> Result<DataFrame> {
        Ok(log_df.filter(col("page").eq(lit("NextSong")))?)
    }

    /// Projects play records into the users schema, full-row deduplicated.
    /// A user whose subscription level changed keeps one row per distinct
    /// level observed; that is the value-based dedup contract, not a bug.
    pub fn users_table(log_df: &DataFrame) -> Result<DataFrame> {
        Ok(log_df
            .clone()
            .select(vec![
                col("userId").alias("u_userId"),
                col("firstName").alias("u_firstName"),
                col("lastName").alias("u_lastName"),
                col("gender").alias("u_gender"),
                col("level").alias("u_level"),
            ])?
            .distinct()?)
    }

    /// Decomposes the event timestamp into the time dimension, full-row
    /// deduplicated.
    pub fn time_table(udfs: &TimeUdfs, log_df: &DataFrame) -> Result<DataFrame> {
        Ok(log_df
            .clone()
            .select(vec![
                udfs.to_timestamp_ms
                    .call(vec![col("ts")])
                    .alias("t_start_time"),
                udfs.event_hour.call(vec![col("ts")]).alias("t_hour"),
                udfs.event_day.call(vec![col("ts")]).alias("t_day"),
                udfs.event_week.call(vec![col("ts")]).alias("t_week"),
                udfs.event_month.call(vec![col("ts")]).alias("t_month"),
                udfs.event_year.call(vec![col("ts")]).alias("t_year"),
                udfs.event_weekday.call(vec![col("ts")]).alias("t_weekday"),
            ])?
            .distinct()?)
    }

    /// Joins play records against the songs catalog on title equality and
    /// projects the match into the songplays schema, without the synthetic
    /// row id. The join is inner: records with no catalog match drop out
    /// silently, and a title shared by several catalog entries fans one
    /// play out into one row per entry.
    pub fn fact_table(
        udfs: &TimeUdfs,
        log_df: &DataFrame,
        song_df: DataFrame,
    ) -> Result<DataFrame> {
        let enriched = log_df
            .clone()
            .with_column("start_time", udfs.to_timestamp_ms.call(vec![col("ts")]))?
            .with_column("sp_year", udfs.event_year.call(vec![col("ts")]))?
            .with_column("sp_month", udfs.event_month.call(vec![col("ts")]))?;

        let joined = enriched.join(song_df, JoinType::Inner, &["song"], &["s_title"], None)?;

        Ok(joined.select(vec![
            col("start_time").alias("sp_start_time"),
            col("userId").alias("sp_user_id"),
            col("level").alias("sp_level"),
            col("s_song_id").alias("sp_song_id"),
            col("s_artist_id").alias("sp_artist_id"),
            col("sessionId").alias("sp_session_id"),
            col("location").alias("sp_location"),
            col("userAgent").alias("sp_user_agent"),
            col("sp_year"),
            col("sp_month"),
        ])?)
    }

    /// Builds the songplays fact table. The songs table is read back from
    /// its output location rather than reused in memory, so the two
    /// pipelines can run as separate jobs; if it has not been written yet
    /// the read fails and the error propagates.
    async fn songplays_table(&self, log_df: &DataFrame) -> Result<DataFrame> {
        let songs_location = self.storage.output_location(&table_dataset_path("songs"))?;
        let read_options = ParquetReadOptions::default().table_partition_cols(songs_partition_cols());
        let song_df = self
            .ctx
            .read_parquet(format!("{}/", songs_location.url()), read_options)
            .await?;

        let projected = Self::fact_table(&self.udfs, log_df, song_df)?;

        let batches = projected.collect().await?;
        let batches = attach_row_ids(&batches, "sp_songplay_id")?;
        if batches.is_empty() {
            let empty = RecordBatch::new_empty(Arc::new(songplays_schema()));
            return Ok(self.ctx.read_batch(empty)?);
        }

        Ok(self.ctx.read_batches(batches)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schema::{time_schema, users_schema};
    use arrow::array::{
        Array, Float64Array, Int32Array, Int64Array, StringArray, TimestampMillisecondArray,
    };
    use arrow::compute::cast;
    use arrow::datatypes::{DataType, Field, Schema};

    // 2018-11-01T20:55:32.796Z
    const TS_1: i64 = 1_541_105_732_796;

    fn log_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("page", DataType::Utf8, false),
            Field::new("userId", DataType::Utf8, false),
            Field::new("firstName", DataType::Utf8, false),
            Field::new("lastName", DataType::Utf8, false),
            Field::new("gender", DataType::Utf8, false),
            Field::new("level", DataType::Utf8, false),
            Field::new("song", DataType::Utf8, false),
            Field::new("ts", DataType::Int64, false),
            Field::new("sessionId", DataType::Int64, false),
            Field::new("location", DataType::Utf8, false),
            Field::new("userAgent", DataType::Utf8, false),
        ]));

        // One play of a shared title, one page view, one play with no
        // catalog match after a level change.
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["NextSong", "Home", "NextSong"])),
                Arc::new(StringArray::from(vec!["1", "1", "1"])),
                Arc::new(StringArray::from(vec!["Ada", "Ada", "Ada"])),
                Arc::new(StringArray::from(vec!["Lovelace", "Lovelace", "Lovelace"])),
                Arc::new(StringArray::from(vec!["F", "F", "F"])),
                Arc::new(StringArray::from(vec!["free", "free", "paid"])),
                Arc::new(StringArray::from(vec!["Shared Title", "", "No Match"])),
                Arc::new(Int64Array::from(vec![TS_1, TS_1, TS_1 + 1000])),
                Arc::new(Int64Array::from(vec![100, 100, 101])),
                Arc::new(StringArray::from(vec!["NY", "NY", "NY"])),
                Arc::new(StringArray::from(vec!["agent", "agent", "agent"])),
            ],
        )
        .unwrap()
    }

    fn songs_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("s_song_id", DataType::Utf8, false),
            Field::new("s_title", DataType::Utf8, false),
            Field::new("s_artist_id", DataType::Utf8, false),
            Field::new("s_year", DataType::Int64, false),
            Field::new("s_duration", DataType::Float64, false),
        ]));

        // Two catalog entries share one title.
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["SOAAA", "SOBBB"])),
                Arc::new(StringArray::from(vec!["Shared Title", "Shared Title"])),
                Arc::new(StringArray::from(vec!["AR1", "AR2"])),
                Arc::new(Int64Array::from(vec![2018, 2017])),
                Arc::new(Float64Array::from(vec![215.5, 210.0])),
            ],
        )
        .unwrap()
    }

    fn string_values(batches: &[RecordBatch], column: &str) -> Vec<String> {
        let mut values = Vec::new();
        for batch in batches {
            let array = cast(batch.column_by_name(column).unwrap(), &DataType::Utf8).unwrap();
            let array = array.as_any().downcast_ref::<StringArray>().unwrap();
            for i in 0..array.len() {
                values.push(array.value(i).to_string());
            }
        }
        values
    }

    fn row_count(batches: &[RecordBatch]) -> usize {
        batches.iter().map(|b| b.num_rows()).sum()
    }

    #[tokio::test]
    async fn test_filter_keeps_only_song_plays() {
        let ctx = SessionContext::new();
        let df = ctx.read_batch(log_batch()).unwrap();

        let filtered = ActivityProcessor::filter_song_plays(df).unwrap();
        let batches = filtered.collect().await.unwrap();
        assert_eq!(row_count(&batches), 2);

        let pages = string_values(&batches, "page");
        assert!(pages.iter().all(|p| p == "NextSong"));
    }

    #[tokio::test]
    async fn test_users_level_change_keeps_both_rows() {
        let ctx = SessionContext::new();
        let df = ctx.read_batch(log_batch()).unwrap();
        let filtered = ActivityProcessor::filter_song_plays(df).unwrap();

        let users = ActivityProcessor::users_table(&filtered).unwrap();
        let names: Vec<String> = users
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let expected: Vec<String> = users_schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, expected);

        // Same user, two subscription levels: dedup is value-based, so
        // both rows survive.
        let batches = users.collect().await.unwrap();
        assert_eq!(row_count(&batches), 2);

        let mut levels = string_values(&batches, "u_level");
        levels.sort();
        assert_eq!(levels, vec!["free", "paid"]);
    }

    #[tokio::test]
    async fn test_time_table_decomposition() {
        let ctx = SessionContext::new();
        let udfs = TimeUdfs::new();
        let df = ctx.read_batch(log_batch()).unwrap();
        let filtered = ActivityProcessor::filter_song_plays(df).unwrap();

        let time = ActivityProcessor::time_table(&udfs, &filtered).unwrap();
        let names: Vec<String> = time
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let expected: Vec<String> = time_schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, expected);

        let time = time.sort(vec![col("t_start_time").sort(true, false)]).unwrap();
        let batches = time.collect().await.unwrap();
        assert_eq!(row_count(&batches), 2);

        let batch = &batches[0];
        let start = batch
            .column_by_name("t_start_time")
            .unwrap()
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .unwrap();
        assert_eq!(start.value(0), TS_1);

        let int_field = |name: &str| -> i32 {
            batch
                .column_by_name(name)
                .unwrap()
                .as_any()
                .downcast_ref::<Int32Array>()
                .unwrap()
                .value(0)
        };
        assert_eq!(int_field("t_hour"), 20);
        assert_eq!(int_field("t_day"), 1);
        assert_eq!(int_field("t_week"), 44);
        assert_eq!(int_field("t_month"), 11);
        assert_eq!(int_field("t_year"), 2018);
        assert_eq!(int_field("t_weekday"), 4);
    }

    #[tokio::test]
    async fn test_fact_table_fans_out_on_duplicate_titles() {
        let ctx = SessionContext::new();
        let udfs = TimeUdfs::new();
        let log_df = ctx.read_batch(log_batch()).unwrap();
        let log_df = ActivityProcessor::filter_song_plays(log_df).unwrap();
        let song_df = ctx.read_batch(songs_batch()).unwrap();

        let fact = ActivityProcessor::fact_table(&udfs, &log_df, song_df).unwrap();
        let batches = fact.collect().await.unwrap();

        // One play of "Shared Title" matches two catalog entries; the play
        // of "No Match" matches none.
        assert_eq!(row_count(&batches), 2);

        let mut song_ids = string_values(&batches, "sp_song_id");
        song_ids.sort();
        assert_eq!(song_ids, vec!["SOAAA", "SOBBB"]);

        let sessions = string_values(&batches, "sp_session_id");
        assert!(sessions.iter().all(|s| s == "100"));
    }

    #[tokio::test]
    async fn test_fact_table_miss_produces_no_rows() {
        let ctx = SessionContext::new();
        let udfs = TimeUdfs::new();
        let log_df = ctx.read_batch(log_batch()).unwrap();
        let log_df = ActivityProcessor::filter_song_plays(log_df).unwrap();

        let schema = songs_batch().schema();
        let empty_songs = ctx
            .read_batch(RecordBatch::new_empty(schema))
            .unwrap();

        let fact = ActivityProcessor::fact_table(&udfs, &log_df, empty_songs).unwrap();
        let batches = fact.collect().await.unwrap();
        assert_eq!(row_count(&batches), 0);
    }
}
