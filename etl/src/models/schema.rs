use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

/// Output schema of the `songs` dimension table.
pub fn songs_schema() -> Schema {
    Schema::new(vec![
        Field::new("s_song_id", DataType::Utf8, true),
        Field::new("s_title", DataType::Utf8, true),
        Field::new("s_artist_id", DataType::Utf8, true),
        Field::new("s_year", DataType::Int64, true),
        Field::new("s_duration", DataType::Float64, true),
    ])
}

/// Output schema of the `artists` dimension table.
pub fn artists_schema() -> Schema {
    Schema::new(vec![
        Field::new("a_artist_id", DataType::Utf8, true),
        Field::new("a_name", DataType::Utf8, true),
        Field::new("a_location", DataType::Utf8, true),
        Field::new("a_latitude", DataType::Float64, true),
        Field::new("a_longitude", DataType::Float64, true),
    ])
}

/// Output schema of the `users` dimension table.
pub fn users_schema() -> Schema {
    Schema::new(vec![
        Field::new("u_userId", DataType::Utf8, true),
        Field::new("u_firstName", DataType::Utf8, true),
        Field::new("u_lastName", DataType::Utf8, true),
        Field::new("u_gender", DataType::Utf8, true),
        Field::new("u_level", DataType::Utf8, true),
    ])
}

/// Output schema of the `time` dimension table.
pub fn time_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "t_start_time",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ),
        Field::new("t_hour", DataType::Int32, true),
        Field::new("t_day", DataType::Int32, true),
        Field::new("t_week", DataType::Int32, true),
        Field::new("t_month", DataType::Int32, true),
        Field::new("t_year", DataType::Int32, true),
        Field::new("t_weekday", DataType::Int32, true),
    ])
}

/// Output schema of the `songplays` fact table. `sp_songplay_id` is
/// assigned at write time and is unique within one run only.
pub fn songplays_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "sp_start_time",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ),
        Field::new("sp_user_id", DataType::Utf8, true),
        Field::new("sp_level", DataType::Utf8, true),
        Field::new("sp_song_id", DataType::Utf8, true),
        Field::new("sp_artist_id", DataType::Utf8, true),
        Field::new("sp_session_id", DataType::Int64, true),
        Field::new("sp_location", DataType::Utf8, true),
        Field::new("sp_user_agent", DataType::Utf8, true),
        Field::new("sp_year", DataType::Int32, true),
        Field::new("sp_month", DataType::Int32, true),
        Field::new("sp_songplay_id", DataType::Int64, false),
    ])
}

/// Partition columns of the persisted songs dataset, declared when the
/// fact-table stage reads it back so hive-partition discovery recovers the
/// values stored in the directory names.
pub fn songs_partition_cols() -> Vec<(String, DataType)> {
    vec![
        ("s_year".to_string(), DataType::Int64),
        ("s_artist_id".to_string(), DataType::Utf8),
    ]
}
