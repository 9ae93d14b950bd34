use arrow::datatypes::SchemaRef;
use arrow::json::reader::{ReaderBuilder, infer_json_schema_from_iterator};
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use datafusion::dataframe::DataFrame;
use datafusion::execution::context::SessionContext;
use futures::StreamExt;
use object_store::ObjectStore;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tracing::info;

use super::TableLocation;

/// Loads every JSON record found under the location into a DataFrame with
/// one schema inferred across all records. Source files hold one JSON
/// object per line; a malformed line aborts the load rather than being
/// skipped.
pub async fn load_json_records(
    ctx: &SessionContext,
    location: &TableLocation,
) -> Result<DataFrame> {
    let store = location.store();
    let entries: Vec<_> = store.list(Some(location.prefix())).collect().await;

    let mut keys = Vec::new();
    for entry in entries {
        let meta = entry?;
        if meta.location.as_ref().ends_with(".json") {
            keys.push(meta.location);
        }
    }
    keys.sort_unstable();

    if keys.is_empty() {
        return Err(Error::Storage(format!(
            "No JSON files found under {}",
            location.url()
        )));
    }

    let mut lines: Vec<String> = Vec::new();
    for key in &keys {
        let data = store.get(key).await?.bytes().await?;
        let text = std::str::from_utf8(&data)?;
        for line in text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
    }

    info!(
        files = keys.len(),
        records = lines.len(),
        url = %location.url(),
        "Loaded JSON source"
    );

    let schema = infer_schema(&lines)?;
    let batches = decode_batches(&lines, schema)?;
    Ok(ctx.read_batches(batches)?)
}

fn infer_schema(lines: &[String]) -> Result<SchemaRef> {
    let mut values = Vec::with_capacity(lines.len());
    for line in lines {
        let value: Value = serde_json::from_str(line)?;
        values.push(value);
    }

    let schema = infer_json_schema_from_iterator(
        values.into_iter().map(Ok::<Value, arrow::error::ArrowError>),
    )?;
    Ok(Arc::new(schema))
}

fn decode_batches(lines: &[String], schema: SchemaRef) -> Result<Vec<RecordBatch>> {
    let data = lines.join("\n");
    let mut cursor = Cursor::new(data);
    let mut reader = ReaderBuilder::new(schema)
        .with_batch_size(8192)
        .build(&mut cursor)?;

    let mut batches = Vec::new();
    while let Some(batch) = reader.next() {
        batches.push(batch?);
    }

    Ok(batches)
}
