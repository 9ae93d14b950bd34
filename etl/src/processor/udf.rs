use arrow::array::{Int32Array, Int64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, Datelike, Timelike, Utc};
use common::Result;
use datafusion::common::DataFusionError;
use datafusion::execution::context::SessionContext;
use datafusion::logical_expr::{ColumnarValue, ScalarUDF, Volatility, create_udf};
use std::sync::Arc;

/// Column-wise conversions for the activity-log `ts` column (integer
/// milliseconds since the Unix epoch). Calendar fields use the UTC
/// interpretation of the epoch value. Weekday is ISO numbered: 1 = Monday
/// through 7 = Sunday. Out-of-range inputs yield null.
pub struct TimeUdfs {
    pub to_unix_seconds: ScalarUDF,
    pub to_timestamp_ms: ScalarUDF,
    pub event_hour: ScalarUDF,
    pub event_day: ScalarUDF,
    pub event_week: ScalarUDF,
    pub event_month: ScalarUDF,
    pub event_year: ScalarUDF,
    pub event_weekday: ScalarUDF,
}

impl TimeUdfs {
    pub fn new() -> Self {
        let to_unix_seconds = create_udf(
            "to_unix_seconds",
            vec![DataType::Int64],
            DataType::Int64,
            Volatility::Immutable,
            Arc::new(|args| {
                epoch_to_seconds(args).map_err(|e| DataFusionError::Internal(e.to_string()))
            }),
        );

        let to_timestamp_ms = create_udf(
            "to_timestamp_ms",
            vec![DataType::Int64],
            DataType::Timestamp(TimeUnit::Millisecond, None),
            Volatility::Immutable,
            Arc::new(|args| {
                epoch_to_timestamp(args).map_err(|e| DataFusionError::Internal(e.to_string()))
            }),
        );

        Self {
            to_unix_seconds,
            to_timestamp_ms,
            event_hour: calendar_udf("event_hour", |dt| dt.hour() as i32),
            event_day: calendar_udf("event_day", |dt| dt.day() as i32),
            event_week: calendar_udf("event_week", |dt| dt.iso_week().week() as i32),
            event_month: calendar_udf("event_month", |dt| dt.month() as i32),
            event_year: calendar_udf("event_year", |dt| dt.year()),
            event_weekday: calendar_udf("event_weekday", |dt| {
                dt.weekday().number_from_monday() as i32
            }),
        }
    }

    /// Registers all conversions with the SessionContext so they are also
    /// usable from SQL.
    pub fn register(&self, ctx: &SessionContext) {
        for udf in [
            &self.to_unix_seconds,
            &self.to_timestamp_ms,
            &self.event_hour,
            &self.event_day,
            &self.event_week,
            &self.event_month,
            &self.event_year,
            &self.event_weekday,
        ] {
            ctx.register_udf(udf.clone());
        }
    }
}

impl Default for TimeUdfs {
    fn default() -> Self {
        Self::new()
    }
}

fn calendar_udf(name: &str, field: fn(DateTime<Utc>) -> i32) -> ScalarUDF {
    create_udf(
        name,
        vec![DataType::Int64],
        DataType::Int32,
        Volatility::Immutable,
        Arc::new(move |args| {
            calendar_field(args, field).map_err(|e| DataFusionError::Internal(e.to_string()))
        }),
    )
}

fn epoch_millis(args: &[ColumnarValue]) -> Result<&Int64Array> {
    match &args[0] {
        ColumnarValue::Array(array) => array
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| DataFusionError::Internal("Expected int64 array".to_string()).into()),
        ColumnarValue::Scalar(_) => {
            Err(DataFusionError::Internal("Scalar inputs not supported".to_string()).into())
        }
    }
}

/// Truncates epoch milliseconds down to whole seconds.
fn epoch_to_seconds(args: &[ColumnarValue]) -> Result<ColumnarValue> {
    let int_array = epoch_millis(args)?;

    let result: Int64Array = int_array
        .iter()
        .map(|opt_ms| opt_ms.map(|ms| ms.div_euclid(1000)))
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}

/// Converts epoch milliseconds to an Arrow millisecond timestamp.
fn epoch_to_timestamp(args: &[ColumnarValue]) -> Result<ColumnarValue> {
    let int_array = epoch_millis(args)?;

    let result: TimestampMillisecondArray = int_array
        .iter()
        .map(|opt_ms| {
            opt_ms
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| dt.timestamp_millis())
        })
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}

fn calendar_field(
    args: &[ColumnarValue],
    field: fn(DateTime<Utc>) -> i32,
) -> Result<ColumnarValue> {
    let int_array = epoch_millis(args)?;

    let result: Int32Array = int_array
        .iter()
        .map(|opt_ms| opt_ms.and_then(DateTime::from_timestamp_millis).map(field))
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}
