/// Source subtree of song-catalog JSON files under the input root.
pub const SONG_DATA_DIR: &str = "song_data";

/// Source subtree of activity-log JSON files under the input root.
pub const LOG_DATA_DIR: &str = "log_data";

/// Relative location of a table dataset under the output root. Each table
/// is a directory of parquet files; partitioned tables nest col=value
/// subdirectories inside it.
pub fn table_dataset_path(table: &str) -> String {
    format!("{}/{}.parquet", table, table)
}
